//! Request and response shapes.
//!
//! Read shapes are built from rows loaded in bulk (one query per related
//! table, never per recipe). Write payloads are validated here and turned
//! into the typed drafts the query layer accepts.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use diesel::QueryResult;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::DbConnection;
use crate::error::{ApiError, FieldErrors};
use crate::image::{self, DecodedImage};
use crate::models::{
    IngredientAmount, Recipe, RecipeDraft, RecipeFlags, RecipeIngredientRow, RecipeUpdate, User,
};
use crate::query;

pub const MIN_AMOUNT: i64 = 1;
pub const MAX_AMOUNT: i64 = 32_000;
pub const RECIPE_NAME_MAX_LEN: usize = 256;
pub const USER_FIELD_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

pub fn media_url(key: &str) -> String {
    format!("/media/{key}")
}

fn push(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.into());
}

/// Reports an out-of-range value against `field`; returns whether it was in range.
fn check_range(errors: &mut FieldErrors, field: &str, value: i64) -> bool {
    if value < MIN_AMOUNT {
        push(
            errors,
            field,
            format!("Ensure this value is greater than or equal to {MIN_AMOUNT}."),
        );
        false
    } else if value > MAX_AMOUNT {
        push(
            errors,
            field,
            format!("Ensure this value is less than or equal to {MAX_AMOUNT}."),
        );
        false
    } else {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserOut {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub is_subscribed: bool,
}

impl UserOut {
    pub fn new(user: &User, is_subscribed: bool) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar: user.avatar.as_deref().map(media_url),
            is_subscribed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeIngredientOut {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipeIngredientRow> for RecipeIngredientOut {
    fn from(row: RecipeIngredientRow) -> Self {
        Self {
            id: row.ingredient_id,
            name: row.name,
            measurement_unit: row.measurement_unit,
            amount: row.amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeOut {
    pub id: i32,
    pub author: UserOut,
    pub ingredients: Vec<RecipeIngredientOut>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeShortOut {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<&Recipe> for RecipeShortOut {
    fn from(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: media_url(&recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOut {
    #[serde(flatten)]
    pub user: UserOut,
    pub recipes: Vec<RecipeShortOut>,
    pub recipes_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvatarOut {
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShortLinkOut {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

/// Builds full recipe representations for `viewer`.
pub fn render_recipes(
    conn: &mut DbConnection,
    viewer: Option<i32>,
    rows: Vec<(Recipe, RecipeFlags)>,
) -> QueryResult<Vec<RecipeOut>> {
    let recipe_ids: Vec<i32> = rows.iter().map(|(recipe, _)| recipe.id).collect();
    let mut author_ids: Vec<i32> = rows.iter().map(|(recipe, _)| recipe.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors: HashMap<i32, User> = query::find_users(conn, &author_ids)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();
    let followed = query::followed_among(conn, viewer, &author_ids)?;
    let mut ingredients = query::ingredients_of(conn, &recipe_ids)?;

    rows.into_iter()
        .map(|(recipe, flags)| -> QueryResult<RecipeOut> {
            let author = authors
                .get(&recipe.author_id)
                .ok_or(diesel::result::Error::NotFound)?;
            Ok(RecipeOut {
                id: recipe.id,
                author: UserOut::new(author, followed.contains(&author.id)),
                ingredients: ingredients
                    .remove(&recipe.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(RecipeIngredientOut::from)
                    .collect(),
                is_favorited: flags.is_favorited,
                is_in_shopping_cart: flags.is_in_shopping_cart,
                name: recipe.name,
                image: media_url(&recipe.image),
                text: recipe.text,
                cooking_time: recipe.cooking_time,
            })
        })
        .collect()
}

/// Builds the follow representation of each author: the user plus their
/// newest recipes, truncated to `recipes_limit` when given.
pub fn render_subscriptions(
    conn: &mut DbConnection,
    viewer: i32,
    authors: Vec<User>,
    recipes_limit: Option<usize>,
) -> QueryResult<Vec<SubscriptionOut>> {
    let author_ids: Vec<i32> = authors.iter().map(|user| user.id).collect();
    let followed = query::followed_among(conn, Some(viewer), &author_ids)?;
    let mut recipes = query::recipes_by_author(conn, &author_ids, recipes_limit)?;

    Ok(authors
        .into_iter()
        .map(|author| {
            let (kept, recipes_count) = recipes.remove(&author.id).unwrap_or_default();
            SubscriptionOut {
                user: UserOut::new(&author, followed.contains(&author.id)),
                recipes: kept.iter().map(RecipeShortOut::from).collect(),
                recipes_count,
            }
        })
        .collect())
}

/// `recipes_limit` only applies when it is a non-negative integer.
pub fn parse_recipes_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|raw| raw.parse().ok())
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientAmountPayload {
    pub id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipePayload {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub cooking_time: Option<i64>,
    pub ingredients: Option<Vec<IngredientAmountPayload>>,
}

/// How strictly an update payload is checked for required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// PUT: every scalar field is required, ingredients are optional.
    Full,
    /// PATCH: scalar fields are optional, ingredients are required.
    Partial,
}

#[derive(Debug, Default)]
struct Checked {
    name: Option<String>,
    text: Option<String>,
    image: Option<DecodedImage>,
    cooking_time: Option<i32>,
    ingredients: Option<Vec<IngredientAmount>>,
}

fn check_text(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    let value = value?.trim().to_string();
    if value.is_empty() {
        push(errors, field, BLANK);
        return None;
    }
    Some(value)
}

fn check_ingredients(
    errors: &mut FieldErrors,
    items: Vec<IngredientAmountPayload>,
) -> Option<Vec<IngredientAmount>> {
    if items.is_empty() {
        push(errors, "ingredients", "This list may not be empty.");
        return None;
    }

    let mut valid = true;
    let mut seen = HashSet::new();
    let mut checked = Vec::with_capacity(items.len());
    for item in items {
        let Ok(ingredient_id) = i32::try_from(item.id) else {
            push(
                errors,
                "ingredients",
                format!("Invalid pk \"{}\" - object does not exist.", item.id),
            );
            valid = false;
            continue;
        };
        if !seen.insert(ingredient_id) {
            push(errors, "ingredients", "Ingredients must be unique.");
            valid = false;
        }
        if !check_range(errors, "ingredients", item.amount) {
            valid = false;
            continue;
        }
        checked.push(IngredientAmount {
            ingredient_id,
            amount: item.amount as i32,
        });
    }
    if let Some(messages) = errors.get_mut("ingredients") {
        messages.dedup();
    }
    valid.then_some(checked)
}

impl RecipePayload {
    fn check(self, required: &[&str]) -> Result<Checked, ApiError> {
        let mut errors = FieldErrors::new();
        for field in required {
            let missing = match *field {
                "name" => self.name.is_none(),
                "text" => self.text.is_none(),
                "image" => self.image.is_none(),
                "cooking_time" => self.cooking_time.is_none(),
                "ingredients" => self.ingredients.is_none(),
                _ => false,
            };
            if missing {
                push(&mut errors, field, REQUIRED);
            }
        }

        let name = check_text(&mut errors, "name", self.name);
        if name
            .as_ref()
            .is_some_and(|name| name.chars().count() > RECIPE_NAME_MAX_LEN)
        {
            push(
                &mut errors,
                "name",
                format!("Ensure this field has no more than {RECIPE_NAME_MAX_LEN} characters."),
            );
        }
        let text = check_text(&mut errors, "text", self.text);

        let cooking_time = self.cooking_time.and_then(|value| {
            check_range(&mut errors, "cooking_time", value);
            i32::try_from(value).ok()
        });

        let image = self.image.and_then(|raw| match image::decode(&raw) {
            Ok(image) => Some(image),
            Err(message) => {
                push(&mut errors, "image", message);
                None
            }
        });

        let ingredients = self
            .ingredients
            .and_then(|items| check_ingredients(&mut errors, items));

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        Ok(Checked {
            name,
            text,
            image,
            cooking_time,
            ingredients,
        })
    }

    pub fn into_draft(self) -> Result<RecipeDraft, ApiError> {
        let checked = self.check(&["ingredients", "image", "name", "text", "cooking_time"])?;
        let (Some(name), Some(text), Some(image), Some(cooking_time), Some(ingredients)) = (
            checked.name,
            checked.text,
            checked.image,
            checked.cooking_time,
            checked.ingredients,
        ) else {
            return Err(ApiError::BadRequest("Incomplete recipe.".to_string()));
        };
        Ok(RecipeDraft {
            name,
            text,
            image,
            cooking_time,
            ingredients,
        })
    }

    pub fn into_update(self, mode: UpdateMode) -> Result<RecipeUpdate, ApiError> {
        let required: &[&str] = match mode {
            UpdateMode::Full => &["image", "name", "text", "cooking_time"],
            UpdateMode::Partial => &["ingredients"],
        };
        let checked = self.check(required)?;
        Ok(RecipeUpdate {
            name: checked.name,
            text: checked.text,
            image: checked.image,
            cooking_time: checked.cooking_time,
            ingredients: checked.ingredients,
        })
    }
}

/// Fails unless every referenced ingredient is in `existing`.
pub fn ensure_ingredients_exist(
    items: &[IngredientAmount],
    existing: &HashSet<i32>,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    for item in items {
        if !existing.contains(&item.ingredient_id) {
            push(
                &mut errors,
                "ingredients",
                format!(
                    "Invalid pk \"{}\" - object does not exist.",
                    item.ingredient_id
                ),
            );
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarPayload {
    pub avatar: Option<String>,
}

impl AvatarPayload {
    pub fn into_image(self) -> Result<DecodedImage, ApiError> {
        let raw = self
            .avatar
            .ok_or_else(|| ApiError::field("avatar", REQUIRED))?;
        image::decode(&raw).map_err(|message| ApiError::field("avatar", message))
    }
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern compiles"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

/// Profile data for a user account created by the auth service.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUserPayload {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUserPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.email.chars().count() > EMAIL_MAX_LEN || !email_pattern().is_match(&self.email) {
            push(&mut errors, "email", "Enter a valid email address.");
        }
        if !username_pattern().is_match(&self.username) {
            push(&mut errors, "username", "Invalid username.");
        }
        for (field, value) in [
            ("username", &self.username),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
        ] {
            if value.trim().is_empty() {
                push(&mut errors, field, BLANK);
            } else if value.chars().count() > USER_FIELD_MAX_LEN {
                push(
                    &mut errors,
                    field,
                    format!("Ensure this field has no more than {USER_FIELD_MAX_LEN} characters."),
                );
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}
