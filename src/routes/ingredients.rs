use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

use super::Pool;
use crate::error::ApiError;
use crate::query;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_ingredients).service(get_ingredient);
}

#[derive(Debug, Deserialize)]
pub struct IngredientParams {
    /// Matches names starting with this text.
    pub name: Option<String>,
}

#[get("/ingredients")]
async fn list_ingredients(
    pool: Pool,
    params: web::Query<IngredientParams>,
) -> Result<HttpResponse, ApiError> {
    let prefix = params.into_inner().name;
    let ingredients = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        Ok(query::list_ingredients(&mut conn, prefix.as_deref())?)
    })
    .await??;
    Ok(HttpResponse::Ok().json(ingredients))
}

#[get("/ingredients/{id:\\d+}")]
async fn get_ingredient(
    pool: Pool,
    ingredient_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let ingredient_id = ingredient_id.into_inner();
    let ingredient = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        Ok(query::find_ingredient(&mut conn, ingredient_id)?)
    })
    .await??;
    Ok(HttpResponse::Ok().json(ingredient))
}
