use actix_web::http::header::{CacheControl, CacheDirective};
use actix_web::{get, web, HttpResponse};

use super::Pool;
use crate::error::ApiError;
use crate::query;

/// Keys are never reused, so stored images can be cached indefinitely.
#[get("/media/{key}")]
pub async fn serve_image(pool: Pool, key: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let key = key.into_inner();
    let image = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        Ok(query::find_image(&mut conn, &key)?)
    })
    .await??;

    Ok(HttpResponse::Ok()
        .content_type(image.content_type)
        .insert_header(CacheControl(vec![
            CacheDirective::Public,
            CacheDirective::MaxAge(31_536_000),
        ]))
        .body(image.data))
}
