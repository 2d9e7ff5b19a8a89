use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image::DecodedImage;
use crate::schema::{
    auth_tokens, favorites, follows, images, ingredients, recipe_ingredients, recipes,
    shopping_carts, users,
};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub date_joined: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub date_joined: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = auth_tokens)]
pub struct NewAuthToken<'a> {
    pub key: &'a str,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = follows)]
pub struct NewFollow {
    pub user_id: i32,
    pub author_id: i32,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable, Identifiable,
)]
#[diesel(table_name = ingredients)]
pub struct Ingredient {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ingredients)]
pub struct NewIngredient<'a> {
    pub name: &'a str,
    pub measurement_unit: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = recipes)]
pub struct Recipe {
    pub id: i32,
    pub author_id: i32,
    pub name: String,
    pub text: String,
    pub image: String,
    pub cooking_time: i32,
    pub pub_date: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = recipes)]
pub struct NewRecipe<'a> {
    pub author_id: i32,
    pub name: &'a str,
    pub text: &'a str,
    pub image: &'a str,
    pub cooking_time: i32,
    pub pub_date: NaiveDateTime,
}

/// Column updates for an existing recipe; `None` leaves the column untouched.
/// `pub_date` is fixed at creation and has no field here.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = recipes)]
pub struct RecipeChanges<'a> {
    pub name: Option<&'a str>,
    pub text: Option<&'a str>,
    pub image: Option<&'a str>,
    pub cooking_time: Option<i32>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = recipe_ingredients)]
pub struct NewRecipeIngredient {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub amount: i32,
}

/// An ingredient row of a recipe, flattened with its catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct RecipeIngredientRow {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = favorites)]
pub struct NewFavorite {
    pub user_id: i32,
    pub recipe_id: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = shopping_carts)]
pub struct NewShoppingCartItem {
    pub user_id: i32,
    pub recipe_id: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = images)]
#[diesel(primary_key(key))]
pub struct Image {
    pub key: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = images)]
pub struct NewImage<'a> {
    pub key: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
    pub created_at: NaiveDateTime,
}

/// One line of the aggregated shopping list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

/// Per-viewer flags attached to a recipe at query time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecipeFlags {
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// Which per-user mark a toggle operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeMark {
    Favorite,
    ShoppingCart,
}

impl RecipeMark {
    pub fn already_present(&self) -> &'static str {
        match self {
            Self::Favorite => "Recipe is already in favorites.",
            Self::ShoppingCart => "Recipe is already in the shopping cart.",
        }
    }

    pub fn not_present(&self) -> &'static str {
        match self {
            Self::Favorite => "Recipe is not in favorites.",
            Self::ShoppingCart => "Recipe is not in the shopping cart.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub ingredient_id: i32,
    pub amount: i32,
}

/// A fully validated recipe ready to be inserted.
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub name: String,
    pub text: String,
    pub image: DecodedImage,
    pub cooking_time: i32,
    pub ingredients: Vec<IngredientAmount>,
}

/// Validated changes to an existing recipe. A present `ingredients` list
/// replaces every ingredient row of the recipe.
#[derive(Debug, Clone, Default)]
pub struct RecipeUpdate {
    pub name: Option<String>,
    pub text: Option<String>,
    pub image: Option<DecodedImage>,
    pub cooking_time: Option<i32>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}
