use actix_web::{error, web, HttpRequest};

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::Recipe;
use crate::query;

pub mod ingredients;
pub mod media;
pub mod recipes;
pub mod users;

/// Registers every endpoint plus the extractor configuration they rely on.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .service(
            web::scope("/api")
                .configure(recipes::configure)
                .configure(ingredients::configure)
                .configure(users::configure),
        )
        .service(media::serve_image);
}

fn json_error(err: error::JsonPayloadError, _: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn query_error(err: error::QueryPayloadError, _: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn path_error(_: error::PathError, _: &HttpRequest) -> actix_web::Error {
    ApiError::NotFound.into()
}

/// Loads a recipe the requester is about to modify, enforcing authorship.
pub(crate) fn owned_recipe(
    conn: &mut crate::db::DbConnection,
    recipe_id: i32,
    user_id: i32,
) -> Result<Recipe, ApiError> {
    let recipe = query::find_recipe(conn, recipe_id)?;
    if recipe.author_id != user_id {
        log::warn!("user {user_id} tried to modify recipe {recipe_id} of another author");
        return Err(ApiError::Forbidden);
    }
    Ok(recipe)
}

/// Absolute URL of `path` as seen by the client that sent `req`.
pub(crate) fn absolute_url(req: &HttpRequest, path: &str) -> String {
    let info = req.connection_info();
    format!("{}://{}{}", info.scheme(), info.host(), path)
}

pub(crate) type Pool = web::Data<DbPool>;
