use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{delete, get, patch, post, put, web, HttpRequest, HttpResponse};
use diesel::Connection;
use serde::Deserialize;

use super::{absolute_url, owned_recipe, Pool};
use crate::auth::{CurrentUser, Viewer};
use crate::config::Config;
use crate::db::DbConnection;
use crate::dto::{self, RecipeOut, RecipePayload, RecipeShortOut, ShortLinkOut, UpdateMode};
use crate::error::ApiError;
use crate::models::{IngredientAmount, RecipeMark, ShoppingListItem};
use crate::pagination::{PageParams, Pagination};
use crate::query::{self, RecipeFilter};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_recipes)
        .service(create_recipe)
        .service(download_shopping_cart)
        .service(get_recipe)
        .service(replace_recipe)
        .service(patch_recipe)
        .service(delete_recipe)
        .service(add_favorite)
        .service(remove_favorite)
        .service(add_to_cart)
        .service(remove_from_cart)
        .service(get_link);
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipeFilterParams {
    pub author: Option<String>,
    pub is_favorited: Option<String>,
    pub is_in_shopping_cart: Option<String>,
}

fn parse_flag(field: &str, raw: Option<&str>) -> Result<bool, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(false),
        Some("1") | Some("true") | Some("True") => Ok(true),
        Some("0") | Some("false") | Some("False") => Ok(false),
        Some(_) => Err(ApiError::field(field, "Enter a valid boolean.")),
    }
}

impl RecipeFilterParams {
    pub fn resolve(&self) -> Result<RecipeFilter, ApiError> {
        let author = match self.author.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<i32>().map_err(|_| {
                ApiError::field(
                    "author",
                    "Select a valid choice. That choice is not one of the available choices.",
                )
            })?),
        };
        Ok(RecipeFilter {
            author,
            is_favorited: parse_flag("is_favorited", self.is_favorited.as_deref())?,
            is_in_shopping_cart: parse_flag(
                "is_in_shopping_cart",
                self.is_in_shopping_cart.as_deref(),
            )?,
        })
    }
}

fn render_one(
    conn: &mut DbConnection,
    viewer: Option<i32>,
    recipe_id: i32,
) -> Result<RecipeOut, ApiError> {
    let row = query::find_recipe_annotated(conn, viewer, recipe_id)?;
    dto::render_recipes(conn, viewer, vec![row])?
        .pop()
        .ok_or(ApiError::NotFound)
}

fn check_ingredients(
    conn: &mut DbConnection,
    items: Option<&[IngredientAmount]>,
) -> Result<(), ApiError> {
    let Some(items) = items else {
        return Ok(());
    };
    let ids: Vec<i32> = items.iter().map(|item| item.ingredient_id).collect();
    let existing = query::existing_ingredient_ids(conn, &ids)?;
    dto::ensure_ingredients_exist(items, &existing)
}

#[get("/recipes")]
async fn list_recipes(
    req: HttpRequest,
    viewer: Viewer,
    pool: Pool,
    config: web::Data<Config>,
    page: web::Query<PageParams>,
    filter: web::Query<RecipeFilterParams>,
) -> Result<HttpResponse, ApiError> {
    let pagination = Pagination::resolve(&page, &config)?;
    let filter = filter.resolve()?;
    let viewer = viewer.id();

    let (count, recipes) = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let (count, rows) = query::list_recipes(
            &mut conn,
            viewer,
            &filter,
            pagination.offset(),
            pagination.limit,
        )?;
        Ok((count, dto::render_recipes(&mut conn, viewer, rows)?))
    })
    .await??;

    Ok(HttpResponse::Ok().json(pagination.into_page(&req, count, recipes)?))
}

#[post("/recipes")]
async fn create_recipe(
    user: CurrentUser,
    pool: Pool,
    payload: web::Json<RecipePayload>,
) -> Result<HttpResponse, ApiError> {
    let draft = payload.into_inner().into_draft()?;
    let author_id = user.0.id;

    let recipe = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        // the catalog check and the insert see the same snapshot
        let recipe = conn.transaction::<_, ApiError, _>(|conn| {
            check_ingredients(conn, Some(draft.ingredients.as_slice()))?;
            Ok(query::create_recipe(conn, author_id, &draft)?)
        })?;
        render_one(&mut conn, Some(author_id), recipe.id)
    })
    .await??;

    log::info!("user {author_id} published recipe {}", recipe.id);
    Ok(HttpResponse::Created().json(recipe))
}

#[get("/recipes/{id:\\d+}")]
async fn get_recipe(
    viewer: Viewer,
    pool: Pool,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    let viewer = viewer.id();
    let recipe = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        render_one(&mut conn, viewer, recipe_id)
    })
    .await??;
    Ok(HttpResponse::Ok().json(recipe))
}

async fn update_recipe(
    user: CurrentUser,
    pool: Pool,
    recipe_id: i32,
    payload: RecipePayload,
    mode: UpdateMode,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.0.id;
    let recipe = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let recipe = owned_recipe(&mut conn, recipe_id, user_id)?;
        let changes = payload.into_update(mode)?;
        conn.transaction::<_, ApiError, _>(|conn| {
            check_ingredients(conn, changes.ingredients.as_deref())?;
            Ok(query::update_recipe(conn, &recipe, &changes)?)
        })?;
        render_one(&mut conn, Some(user_id), recipe_id)
    })
    .await??;

    log::info!("user {user_id} updated recipe {recipe_id}");
    Ok(HttpResponse::Ok().json(recipe))
}

#[put("/recipes/{id:\\d+}")]
async fn replace_recipe(
    user: CurrentUser,
    pool: Pool,
    recipe_id: web::Path<i32>,
    payload: web::Json<RecipePayload>,
) -> Result<HttpResponse, ApiError> {
    update_recipe(
        user,
        pool,
        recipe_id.into_inner(),
        payload.into_inner(),
        UpdateMode::Full,
    )
    .await
}

#[patch("/recipes/{id:\\d+}")]
async fn patch_recipe(
    user: CurrentUser,
    pool: Pool,
    recipe_id: web::Path<i32>,
    payload: web::Json<RecipePayload>,
) -> Result<HttpResponse, ApiError> {
    update_recipe(
        user,
        pool,
        recipe_id.into_inner(),
        payload.into_inner(),
        UpdateMode::Partial,
    )
    .await
}

#[delete("/recipes/{id:\\d+}")]
async fn delete_recipe(
    user: CurrentUser,
    pool: Pool,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    let user_id = user.0.id;
    web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let recipe = owned_recipe(&mut conn, recipe_id, user_id)?;
        query::delete_recipe(&mut conn, &recipe)?;
        Ok(())
    })
    .await??;

    log::info!("user {user_id} deleted recipe {recipe_id}");
    Ok(HttpResponse::NoContent().finish())
}

async fn add_mark(
    user: CurrentUser,
    pool: Pool,
    recipe_id: i32,
    mark: RecipeMark,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.0.id;
    let short = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let recipe = query::find_recipe(&mut conn, recipe_id)?;
        if !query::add_mark(&mut conn, mark, user_id, recipe.id)? {
            return Err(ApiError::Rejected(mark.already_present().to_string()));
        }
        Ok(RecipeShortOut::from(&recipe))
    })
    .await??;

    log::debug!("user {user_id} added {mark:?} on recipe {recipe_id}");
    Ok(HttpResponse::Created().json(short))
}

async fn remove_mark(
    user: CurrentUser,
    pool: Pool,
    recipe_id: i32,
    mark: RecipeMark,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.0.id;
    web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let recipe = query::find_recipe(&mut conn, recipe_id)?;
        if !query::remove_mark(&mut conn, mark, user_id, recipe.id)? {
            return Err(ApiError::Rejected(mark.not_present().to_string()));
        }
        Ok(())
    })
    .await??;

    log::debug!("user {user_id} removed {mark:?} on recipe {recipe_id}");
    Ok(HttpResponse::NoContent().finish())
}

#[post("/recipes/{id:\\d+}/favorite")]
async fn add_favorite(
    user: CurrentUser,
    pool: Pool,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    add_mark(user, pool, recipe_id.into_inner(), RecipeMark::Favorite).await
}

#[delete("/recipes/{id:\\d+}/favorite")]
async fn remove_favorite(
    user: CurrentUser,
    pool: Pool,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    remove_mark(user, pool, recipe_id.into_inner(), RecipeMark::Favorite).await
}

#[post("/recipes/{id:\\d+}/shopping_cart")]
async fn add_to_cart(
    user: CurrentUser,
    pool: Pool,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    add_mark(user, pool, recipe_id.into_inner(), RecipeMark::ShoppingCart).await
}

#[delete("/recipes/{id:\\d+}/shopping_cart")]
async fn remove_from_cart(
    user: CurrentUser,
    pool: Pool,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    remove_mark(user, pool, recipe_id.into_inner(), RecipeMark::ShoppingCart).await
}

#[get("/recipes/{id:\\d+}/get-link")]
async fn get_link(
    req: HttpRequest,
    pool: Pool,
    recipe_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = recipe_id.into_inner();
    let recipe = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        Ok(query::find_recipe(&mut conn, recipe_id)?)
    })
    .await??;

    Ok(HttpResponse::Ok().json(ShortLinkOut {
        short_link: absolute_url(&req, &format!("/api/recipes/{}/", recipe.id)),
    }))
}

/// One `name (unit) — total` line per aggregated ingredient.
pub fn render_shopping_list(items: &[ShoppingListItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "{} ({}) — {}",
                item.name, item.measurement_unit, item.total_amount
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[get("/recipes/download_shopping_cart")]
async fn download_shopping_cart(user: CurrentUser, pool: Pool) -> Result<HttpResponse, ApiError> {
    let user_id = user.0.id;
    let items = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        Ok(query::shopping_list(&mut conn, user_id)?)
    })
    .await??;

    log::debug!("user {user_id} exported {} shopping list lines", items.len());
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename("shopping_cart.txt".to_string())],
        })
        .body(render_shopping_list(&items)))
}
