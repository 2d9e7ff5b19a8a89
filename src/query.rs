use std::collections::{HashMap, HashSet};

use chrono::Utc;
use diesel::dsl::{count_star, exists, sum};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Bool;
use diesel::sqlite::Sqlite;

use crate::db::DbConnection;
use crate::image::{self, DecodedImage};
use crate::models::{
    Image, Ingredient, IngredientAmount, NewAuthToken, NewFavorite, NewFollow, NewImage,
    NewIngredient, NewRecipe, NewRecipeIngredient, NewShoppingCartItem, NewUser, Recipe,
    RecipeChanges, RecipeDraft, RecipeFlags, RecipeIngredientRow, RecipeMark, RecipeUpdate,
    ShoppingListItem, User,
};
use crate::schema::{
    auth_tokens, favorites, follows, images, ingredients, recipe_ingredients, recipes,
    shopping_carts, users,
};

type AnnotatedQuery<'a> = recipes::BoxedQuery<'a, Sqlite, (recipes::SqlType, Bool, Bool)>;

/// Narrowing applied to recipe listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<i32>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn is_unique_violation(e: &DieselError) -> bool {
    matches!(
        e,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

pub fn create_user(
    conn: &mut DbConnection,
    email: &str,
    username: &str,
    first_name: &str,
    last_name: &str,
) -> QueryResult<User> {
    diesel::insert_into(users::table)
        .values(&NewUser {
            email,
            username,
            first_name,
            last_name,
            date_joined: Utc::now().naive_utc(),
        })
        .get_result(conn)
}

/// Registers a token issued by the auth service for `user_id`.
pub fn insert_token(conn: &mut DbConnection, user_id: i32, key: &str) -> QueryResult<()> {
    diesel::insert_into(auth_tokens::table)
        .values(&NewAuthToken {
            key,
            user_id,
            created_at: Utc::now().naive_utc(),
        })
        .execute(conn)?;
    Ok(())
}

pub fn find_user_by_token(conn: &mut DbConnection, key: &str) -> QueryResult<Option<User>> {
    auth_tokens::table
        .inner_join(users::table)
        .filter(auth_tokens::key.eq(key))
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn find_user(conn: &mut DbConnection, user_id: i32) -> QueryResult<User> {
    users::table.find(user_id).select(User::as_select()).first(conn)
}

pub fn find_users(conn: &mut DbConnection, user_ids: &[i32]) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::id.eq_any(user_ids.to_vec()))
        .select(User::as_select())
        .load(conn)
}

pub fn list_users(
    conn: &mut DbConnection,
    offset: i64,
    limit: i64,
) -> QueryResult<(i64, Vec<User>)> {
    let count = users::table.count().get_result(conn)?;
    let page = users::table
        .order((users::email.asc(), users::id.asc()))
        .limit(limit)
        .offset(offset)
        .select(User::as_select())
        .load(conn)?;
    Ok((count, page))
}

/// Authors among `author_ids` that `viewer` follows.
pub fn followed_among(
    conn: &mut DbConnection,
    viewer: Option<i32>,
    author_ids: &[i32],
) -> QueryResult<HashSet<i32>> {
    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    let followed = follows::table
        .filter(follows::user_id.eq(viewer))
        .filter(follows::author_id.eq_any(author_ids.to_vec()))
        .select(follows::author_id)
        .load::<i32>(conn)?;
    Ok(followed.into_iter().collect())
}

/// Returns `false` when the follow already existed.
pub fn add_follow(conn: &mut DbConnection, user_id: i32, author_id: i32) -> QueryResult<bool> {
    conn.transaction(|conn| {
        let present = diesel::select(exists(
            follows::table
                .filter(follows::user_id.eq(user_id))
                .filter(follows::author_id.eq(author_id)),
        ))
        .get_result::<bool>(conn)?;
        if present {
            return Ok(false);
        }
        match diesel::insert_into(follows::table)
            .values(&NewFollow { user_id, author_id })
            .execute(conn)
        {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    })
}

/// Returns `false` when there was nothing to remove.
pub fn remove_follow(conn: &mut DbConnection, user_id: i32, author_id: i32) -> QueryResult<bool> {
    let deleted = diesel::delete(
        follows::table
            .filter(follows::user_id.eq(user_id))
            .filter(follows::author_id.eq(author_id)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

/// Authors followed by `user_id`, ordered by username.
pub fn list_subscriptions(
    conn: &mut DbConnection,
    user_id: i32,
    offset: i64,
    limit: i64,
) -> QueryResult<(i64, Vec<User>)> {
    let followed = || {
        follows::table
            .filter(follows::user_id.eq(user_id))
            .select(follows::author_id)
    };
    let count = users::table
        .filter(users::id.eq_any(followed()))
        .count()
        .get_result(conn)?;
    let page = users::table
        .filter(users::id.eq_any(followed()))
        .order((users::username.asc(), users::id.asc()))
        .limit(limit)
        .offset(offset)
        .select(User::as_select())
        .load(conn)?;
    Ok((count, page))
}

/// Recipes of each author, newest first, plus the total number per author.
pub fn recipes_by_author(
    conn: &mut DbConnection,
    author_ids: &[i32],
    per_author: Option<usize>,
) -> QueryResult<HashMap<i32, (Vec<Recipe>, i64)>> {
    let counts = recipes::table
        .filter(recipes::author_id.eq_any(author_ids.to_vec()))
        .group_by(recipes::author_id)
        .select((recipes::author_id, count_star()))
        .load::<(i32, i64)>(conn)?;
    let rows = recipes::table
        .filter(recipes::author_id.eq_any(author_ids.to_vec()))
        .order((recipes::pub_date.desc(), recipes::id.desc()))
        .select(Recipe::as_select())
        .load(conn)?;

    let mut out: HashMap<i32, (Vec<Recipe>, i64)> = author_ids
        .iter()
        .map(|id| (*id, (Vec::new(), 0)))
        .collect();
    for (author_id, count) in counts {
        if let Some(entry) = out.get_mut(&author_id) {
            entry.1 = count;
        }
    }
    for recipe in rows {
        if let Some((kept, _)) = out.get_mut(&recipe.author_id) {
            if per_author.map_or(true, |limit| kept.len() < limit) {
                kept.push(recipe);
            }
        }
    }
    Ok(out)
}

fn insert_image(conn: &mut DbConnection, image: &DecodedImage) -> QueryResult<String> {
    let key = format!(
        "{}.{}",
        uuid::Uuid::new_v4().simple(),
        image::extension(image.content_type)
    );
    diesel::insert_into(images::table)
        .values(&NewImage {
            key: &key,
            content_type: image.content_type,
            data: &image.data,
            created_at: Utc::now().naive_utc(),
        })
        .execute(conn)?;
    Ok(key)
}

fn delete_image(conn: &mut DbConnection, key: &str) -> QueryResult<()> {
    diesel::delete(images::table.find(key)).execute(conn)?;
    Ok(())
}

pub fn find_image(conn: &mut DbConnection, key: &str) -> QueryResult<Image> {
    images::table.find(key).select(Image::as_select()).first(conn)
}

/// Stores a new avatar for the user and drops the previous one.
pub fn set_avatar(
    conn: &mut DbConnection,
    user_id: i32,
    image: &DecodedImage,
) -> QueryResult<String> {
    conn.transaction(|conn| {
        let previous = users::table
            .find(user_id)
            .select(users::avatar)
            .first::<Option<String>>(conn)?;
        let key = insert_image(conn, image)?;
        diesel::update(users::table.find(user_id))
            .set(users::avatar.eq(Some(key.as_str())))
            .execute(conn)?;
        if let Some(previous) = previous {
            delete_image(conn, &previous)?;
        }
        Ok(key)
    })
}

/// Returns `false` when the user had no avatar.
pub fn clear_avatar(conn: &mut DbConnection, user_id: i32) -> QueryResult<bool> {
    conn.transaction(|conn| {
        let previous = users::table
            .find(user_id)
            .select(users::avatar)
            .first::<Option<String>>(conn)?;
        let Some(previous) = previous else {
            return Ok(false);
        };
        diesel::update(users::table.find(user_id))
            .set(users::avatar.eq(None::<String>))
            .execute(conn)?;
        delete_image(conn, &previous)?;
        Ok(true)
    })
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 1);
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Catalog listing, optionally narrowed to names starting with `prefix`.
pub fn list_ingredients(
    conn: &mut DbConnection,
    prefix: Option<&str>,
) -> QueryResult<Vec<Ingredient>> {
    let mut query = ingredients::table
        .order((ingredients::name.asc(), ingredients::id.asc()))
        .select(Ingredient::as_select())
        .into_boxed();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        query = query.filter(
            ingredients::name
                .like(format!("{}%", escape_like(prefix)))
                .escape('\\'),
        );
    }
    query.load(conn)
}

pub fn find_ingredient(conn: &mut DbConnection, ingredient_id: i32) -> QueryResult<Ingredient> {
    ingredients::table
        .find(ingredient_id)
        .select(Ingredient::as_select())
        .first(conn)
}

pub fn insert_ingredients(
    conn: &mut DbConnection,
    rows: &[NewIngredient<'_>],
) -> QueryResult<usize> {
    diesel::insert_into(ingredients::table)
        .values(rows)
        .execute(conn)
}

pub fn existing_ingredient_ids(
    conn: &mut DbConnection,
    ids: &[i32],
) -> QueryResult<HashSet<i32>> {
    let found = ingredients::table
        .filter(ingredients::id.eq_any(ids.to_vec()))
        .select(ingredients::id)
        .load::<i32>(conn)?;
    Ok(found.into_iter().collect())
}

/// Recipes joined with the viewer's favorite and cart flags. For an anonymous
/// viewer both flags are the literal `false` and no sub-query is issued.
fn annotated<'a>(viewer: Option<i32>) -> AnnotatedQuery<'a> {
    match viewer {
        Some(user_id) => recipes::table
            .select((
                recipes::all_columns,
                recipes::id.eq_any(
                    favorites::table
                        .filter(favorites::user_id.eq(user_id))
                        .select(favorites::recipe_id),
                ),
                recipes::id.eq_any(
                    shopping_carts::table
                        .filter(shopping_carts::user_id.eq(user_id))
                        .select(shopping_carts::recipe_id),
                ),
            ))
            .into_boxed(),
        None => recipes::table
            .select((
                recipes::all_columns,
                false.into_sql::<Bool>(),
                false.into_sql::<Bool>(),
            ))
            .into_boxed(),
    }
}

fn apply_filter<'a, ST: 'a>(
    mut query: recipes::BoxedQuery<'a, Sqlite, ST>,
    viewer: Option<i32>,
    filter: &RecipeFilter,
) -> recipes::BoxedQuery<'a, Sqlite, ST> {
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    // both relation filters are no-ops for anonymous viewers
    if let Some(user_id) = viewer {
        if filter.is_favorited {
            query = query.filter(
                recipes::id.eq_any(
                    favorites::table
                        .filter(favorites::user_id.eq(user_id))
                        .select(favorites::recipe_id),
                ),
            );
        }
        if filter.is_in_shopping_cart {
            query = query.filter(
                recipes::id.eq_any(
                    shopping_carts::table
                        .filter(shopping_carts::user_id.eq(user_id))
                        .select(shopping_carts::recipe_id),
                ),
            );
        }
    }
    query
}

fn into_flagged(
    (recipe, is_favorited, is_in_shopping_cart): (Recipe, bool, bool),
) -> (Recipe, RecipeFlags) {
    (
        recipe,
        RecipeFlags {
            is_favorited,
            is_in_shopping_cart,
        },
    )
}

/// One page of recipes, newest first, and the total number matching `filter`.
pub fn list_recipes(
    conn: &mut DbConnection,
    viewer: Option<i32>,
    filter: &RecipeFilter,
    offset: i64,
    limit: i64,
) -> QueryResult<(i64, Vec<(Recipe, RecipeFlags)>)> {
    let count = apply_filter(
        recipes::table.select(count_star()).into_boxed(),
        viewer,
        filter,
    )
    .get_result::<i64>(conn)?;
    let rows = apply_filter(annotated(viewer), viewer, filter)
        .order((recipes::pub_date.desc(), recipes::id.desc()))
        .limit(limit)
        .offset(offset)
        .load::<(Recipe, bool, bool)>(conn)?;
    Ok((count, rows.into_iter().map(into_flagged).collect()))
}

pub fn find_recipe_annotated(
    conn: &mut DbConnection,
    viewer: Option<i32>,
    recipe_id: i32,
) -> QueryResult<(Recipe, RecipeFlags)> {
    annotated(viewer)
        .filter(recipes::id.eq(recipe_id))
        .first::<(Recipe, bool, bool)>(conn)
        .map(into_flagged)
}

pub fn find_recipe(conn: &mut DbConnection, recipe_id: i32) -> QueryResult<Recipe> {
    recipes::table
        .find(recipe_id)
        .select(Recipe::as_select())
        .first(conn)
}

/// Ingredient rows of the given recipes, keyed by recipe id, in insertion order.
pub fn ingredients_of(
    conn: &mut DbConnection,
    recipe_ids: &[i32],
) -> QueryResult<HashMap<i32, Vec<RecipeIngredientRow>>> {
    let rows = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(recipe_ids.to_vec()))
        .order((recipe_ingredients::recipe_id, recipe_ingredients::id))
        .select((
            recipe_ingredients::recipe_id,
            ingredients::id,
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .load::<RecipeIngredientRow>(conn)?;

    let mut grouped: HashMap<i32, Vec<RecipeIngredientRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.recipe_id).or_default().push(row);
    }
    Ok(grouped)
}

fn insert_recipe_ingredients(
    conn: &mut DbConnection,
    recipe_id: i32,
    items: &[IngredientAmount],
) -> QueryResult<()> {
    let rows: Vec<NewRecipeIngredient> = items
        .iter()
        .map(|item| NewRecipeIngredient {
            recipe_id,
            ingredient_id: item.ingredient_id,
            amount: item.amount,
        })
        .collect();
    diesel::insert_into(recipe_ingredients::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

/// Inserts the recipe, its image and its ingredient rows as one unit.
pub fn create_recipe(
    conn: &mut DbConnection,
    author_id: i32,
    draft: &RecipeDraft,
) -> QueryResult<Recipe> {
    conn.transaction(|conn| {
        let image_key = insert_image(conn, &draft.image)?;
        let recipe: Recipe = diesel::insert_into(recipes::table)
            .values(&NewRecipe {
                author_id,
                name: &draft.name,
                text: &draft.text,
                image: &image_key,
                cooking_time: draft.cooking_time,
                pub_date: Utc::now().naive_utc(),
            })
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        insert_recipe_ingredients(conn, recipe.id, &draft.ingredients)?;
        log::debug!(
            "recipe {} created with {} ingredients",
            recipe.id,
            draft.ingredients.len()
        );
        Ok(recipe)
    })
}

/// Applies `changes` to the recipe. A present ingredient list replaces the
/// existing rows wholesale.
pub fn update_recipe(
    conn: &mut DbConnection,
    recipe: &Recipe,
    changes: &RecipeUpdate,
) -> QueryResult<()> {
    conn.transaction(|conn| {
        let image_key = match &changes.image {
            Some(image) => Some(insert_image(conn, image)?),
            None => None,
        };
        let columns = RecipeChanges {
            name: changes.name.as_deref(),
            text: changes.text.as_deref(),
            image: image_key.as_deref(),
            cooking_time: changes.cooking_time,
        };
        let has_column_changes = columns.name.is_some()
            || columns.text.is_some()
            || columns.image.is_some()
            || columns.cooking_time.is_some();
        if has_column_changes {
            diesel::update(recipes::table.find(recipe.id))
                .set(&columns)
                .execute(conn)?;
        }
        if image_key.is_some() {
            delete_image(conn, &recipe.image)?;
        }
        if let Some(items) = &changes.ingredients {
            diesel::delete(
                recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(recipe.id)),
            )
            .execute(conn)?;
            insert_recipe_ingredients(conn, recipe.id, items)?;
        }
        Ok(())
    })
}

/// Removes the recipe; join and relation rows go with it through the foreign
/// key cascades.
pub fn delete_recipe(conn: &mut DbConnection, recipe: &Recipe) -> QueryResult<()> {
    conn.transaction(|conn| {
        diesel::delete(recipes::table.find(recipe.id)).execute(conn)?;
        delete_image(conn, &recipe.image)
    })
}

fn mark_exists(
    conn: &mut DbConnection,
    mark: RecipeMark,
    user_id: i32,
    recipe_id: i32,
) -> QueryResult<bool> {
    match mark {
        RecipeMark::Favorite => diesel::select(exists(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::recipe_id.eq(recipe_id)),
        ))
        .get_result(conn),
        RecipeMark::ShoppingCart => diesel::select(exists(
            shopping_carts::table
                .filter(shopping_carts::user_id.eq(user_id))
                .filter(shopping_carts::recipe_id.eq(recipe_id)),
        ))
        .get_result(conn),
    }
}

/// Returns `false` when the mark was already present.
pub fn add_mark(
    conn: &mut DbConnection,
    mark: RecipeMark,
    user_id: i32,
    recipe_id: i32,
) -> QueryResult<bool> {
    conn.transaction(|conn| {
        if mark_exists(conn, mark, user_id, recipe_id)? {
            return Ok(false);
        }
        let inserted = match mark {
            RecipeMark::Favorite => diesel::insert_into(favorites::table)
                .values(&NewFavorite { user_id, recipe_id })
                .execute(conn),
            RecipeMark::ShoppingCart => diesel::insert_into(shopping_carts::table)
                .values(&NewShoppingCartItem { user_id, recipe_id })
                .execute(conn),
        };
        match inserted {
            Ok(_) => Ok(true),
            // lost a race against an identical request
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    })
}

/// Returns `false` when the mark was not present.
pub fn remove_mark(
    conn: &mut DbConnection,
    mark: RecipeMark,
    user_id: i32,
    recipe_id: i32,
) -> QueryResult<bool> {
    let deleted = match mark {
        RecipeMark::Favorite => diesel::delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
        RecipeMark::ShoppingCart => diesel::delete(
            shopping_carts::table
                .filter(shopping_carts::user_id.eq(user_id))
                .filter(shopping_carts::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
    };
    Ok(deleted > 0)
}

/// Ingredients of every recipe in the user's cart, summed per (name, unit).
pub fn shopping_list(conn: &mut DbConnection, user_id: i32) -> QueryResult<Vec<ShoppingListItem>> {
    let rows = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(
            recipe_ingredients::recipe_id.eq_any(
                shopping_carts::table
                    .filter(shopping_carts::user_id.eq(user_id))
                    .select(shopping_carts::recipe_id),
            ),
        )
        .group_by((ingredients::name, ingredients::measurement_unit))
        .select((
            ingredients::name,
            ingredients::measurement_unit,
            sum(recipe_ingredients::amount),
        ))
        .order((ingredients::name.asc(), ingredients::measurement_unit.asc()))
        .load::<(String, String, Option<i64>)>(conn)?;

    Ok(rows
        .into_iter()
        .map(|(name, measurement_unit, total)| ShoppingListItem {
            name,
            measurement_unit,
            total_amount: total.unwrap_or(0),
        })
        .collect())
}
