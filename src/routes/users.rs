use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use super::Pool;
use crate::auth::{CurrentUser, Viewer};
use crate::config::Config;
use crate::db::DbConnection;
use crate::dto::{self, AvatarOut, AvatarPayload, NewUserPayload, UserOut};
use crate::error::ApiError;
use crate::models::User;
use crate::pagination::{PageParams, Pagination};
use crate::query;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_users)
        .service(create_user)
        .service(me)
        .service(subscriptions)
        .service(set_avatar)
        .service(delete_avatar)
        .service(get_user)
        .service(subscribe)
        .service(unsubscribe);
}

/// Creates the profile row for an account registered with the auth service.
pub fn provision_user(conn: &mut DbConnection, payload: &NewUserPayload) -> Result<User, ApiError> {
    payload.validate()?;
    let user = query::create_user(
        conn,
        &payload.email,
        &payload.username,
        &payload.first_name,
        &payload.last_name,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::Rejected(_) => ApiError::field(
            "email",
            "A user with that email or username already exists.",
        ),
        other => other,
    })?;
    log::info!("provisioned user {} ({})", user.id, user.username);
    Ok(user)
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionParams {
    pub recipes_limit: Option<String>,
}

#[get("/users")]
async fn list_users(
    req: HttpRequest,
    viewer: Viewer,
    pool: Pool,
    config: web::Data<Config>,
    page: web::Query<PageParams>,
) -> Result<HttpResponse, ApiError> {
    let pagination = Pagination::resolve(&page, &config)?;
    let viewer = viewer.id();

    let (count, users) = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let (count, users) = query::list_users(&mut conn, pagination.offset(), pagination.limit)?;
        let ids: Vec<i32> = users.iter().map(|user| user.id).collect();
        let followed = query::followed_among(&mut conn, viewer, &ids)?;
        let users: Vec<UserOut> = users
            .iter()
            .map(|user| UserOut::new(user, followed.contains(&user.id)))
            .collect();
        Ok((count, users))
    })
    .await??;

    Ok(HttpResponse::Ok().json(pagination.into_page(&req, count, users)?))
}

#[post("/users")]
async fn create_user(
    pool: Pool,
    payload: web::Json<NewUserPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let user = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        provision_user(&mut conn, &payload)
    })
    .await??;
    Ok(HttpResponse::Created().json(UserOut::new(&user, false)))
}

#[get("/users/{id:\\d+}")]
async fn get_user(
    viewer: Viewer,
    pool: Pool,
    user_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    let viewer = viewer.id();
    let user = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let user = query::find_user(&mut conn, user_id)?;
        let followed = query::followed_among(&mut conn, viewer, &[user.id])?;
        Ok(UserOut::new(&user, followed.contains(&user.id)))
    })
    .await??;
    Ok(HttpResponse::Ok().json(user))
}

#[get("/users/me")]
async fn me(user: CurrentUser) -> HttpResponse {
    // nobody follows themselves
    HttpResponse::Ok().json(UserOut::new(&user.0, false))
}

#[get("/users/subscriptions")]
async fn subscriptions(
    req: HttpRequest,
    user: CurrentUser,
    pool: Pool,
    config: web::Data<Config>,
    page: web::Query<PageParams>,
    params: web::Query<SubscriptionParams>,
) -> Result<HttpResponse, ApiError> {
    let pagination = Pagination::resolve(&page, &config)?;
    let recipes_limit = dto::parse_recipes_limit(params.recipes_limit.as_deref());
    let user_id = user.0.id;

    let (count, authors) = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let (count, authors) =
            query::list_subscriptions(&mut conn, user_id, pagination.offset(), pagination.limit)?;
        let authors = dto::render_subscriptions(&mut conn, user_id, authors, recipes_limit)?;
        Ok((count, authors))
    })
    .await??;

    Ok(HttpResponse::Ok().json(pagination.into_page(&req, count, authors)?))
}

#[post("/users/{id:\\d+}/subscribe")]
async fn subscribe(
    user: CurrentUser,
    pool: Pool,
    author_id: web::Path<i32>,
    params: web::Query<SubscriptionParams>,
) -> Result<HttpResponse, ApiError> {
    let author_id = author_id.into_inner();
    let user_id = user.0.id;
    let recipes_limit = dto::parse_recipes_limit(params.recipes_limit.as_deref());

    let subscription = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let author = query::find_user(&mut conn, author_id)?;
        if author.id == user_id {
            return Err(ApiError::Rejected(
                "You cannot subscribe to yourself.".to_string(),
            ));
        }
        if !query::add_follow(&mut conn, user_id, author.id)? {
            return Err(ApiError::Rejected(
                "You are already subscribed to this author.".to_string(),
            ));
        }
        dto::render_subscriptions(&mut conn, user_id, vec![author], recipes_limit)?
            .pop()
            .ok_or(ApiError::NotFound)
    })
    .await??;

    log::info!("user {user_id} subscribed to {author_id}");
    Ok(HttpResponse::Created().json(subscription))
}

#[delete("/users/{id:\\d+}/subscribe")]
async fn unsubscribe(
    user: CurrentUser,
    pool: Pool,
    author_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let author_id = author_id.into_inner();
    let user_id = user.0.id;

    web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        let author = query::find_user(&mut conn, author_id)?;
        if author.id == user_id {
            return Err(ApiError::Rejected(
                "You cannot unsubscribe from yourself.".to_string(),
            ));
        }
        if !query::remove_follow(&mut conn, user_id, author.id)? {
            return Err(ApiError::Rejected(
                "You are not subscribed to this author.".to_string(),
            ));
        }
        Ok(())
    })
    .await??;

    log::info!("user {user_id} unsubscribed from {author_id}");
    Ok(HttpResponse::NoContent().finish())
}

#[put("/users/me/avatar")]
async fn set_avatar(
    user: CurrentUser,
    pool: Pool,
    payload: web::Json<AvatarPayload>,
) -> Result<HttpResponse, ApiError> {
    let image = payload.into_inner().into_image()?;
    let user_id = user.0.id;
    let key = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        Ok(query::set_avatar(&mut conn, user_id, &image)?)
    })
    .await??;

    Ok(HttpResponse::Ok().json(AvatarOut {
        avatar: dto::media_url(&key),
    }))
}

#[delete("/users/me/avatar")]
async fn delete_avatar(user: CurrentUser, pool: Pool) -> Result<HttpResponse, ApiError> {
    let user_id = user.0.id;
    let cleared = web::block(move || -> Result<_, ApiError> {
        let mut conn = pool.get()?;
        Ok(query::clear_avatar(&mut conn, user_id)?)
    })
    .await??;

    if !cleared {
        return Err(ApiError::Rejected("Avatar not set.".to_string()));
    }
    Ok(HttpResponse::NoContent().finish())
}
