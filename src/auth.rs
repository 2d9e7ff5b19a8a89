//! Token authentication.
//!
//! Tokens are issued by a separate auth service that writes them to the
//! `auth_tokens` table; this module only resolves them. Requests carry
//! `Authorization: Token <key>`. A header using another scheme is ignored,
//! an unknown key is rejected even on read-only endpoints.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::db::DbPool;
use crate::error::ApiError;
use crate::models::User;
use crate::query;

const SCHEME: &str = "Token";

/// The requesting user, if the request was authenticated.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    pub fn id(&self) -> Option<i32> {
        self.0.as_ref().map(|user| user.id)
    }
}

/// The requesting user; extraction fails with 401 for anonymous requests.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn token_key(req: &HttpRequest) -> Result<Option<String>, ApiError> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::InvalidToken)?;
    let mut parts = value.split_whitespace();
    match parts.next() {
        Some(scheme) if scheme.eq_ignore_ascii_case(SCHEME) => {}
        _ => return Ok(None),
    }
    match (parts.next(), parts.next()) {
        (Some(key), None) => Ok(Some(key.to_string())),
        _ => Err(ApiError::InvalidToken),
    }
}

impl FromRequest for Viewer {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let key = token_key(req);
        let pool = req.app_data::<web::Data<DbPool>>().cloned();

        Box::pin(async move {
            let Some(key) = key? else {
                return Ok(Viewer(None));
            };
            let pool = pool.ok_or_else(|| ApiError::Internal("database pool missing".into()))?;
            let user = web::block(move || {
                let mut conn = pool.get()?;
                query::find_user_by_token(&mut conn, &key).map_err(ApiError::from)
            })
            .await??;
            match user {
                Some(user) => Ok(Viewer(Some(user))),
                None => {
                    log::debug!("rejected unknown token");
                    Err(ApiError::InvalidToken)
                }
            }
        })
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let viewer = Viewer::from_request(req, payload);
        Box::pin(async move {
            match viewer.await? {
                Viewer(Some(user)) => Ok(CurrentUser(user)),
                Viewer(None) => Err(ApiError::Unauthorized),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn reads_token_scheme_only() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Token abc123"))
            .to_http_request();
        assert_eq!(token_key(&req).unwrap().as_deref(), Some("abc123"));

        let bearer = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc123"))
            .to_http_request();
        assert_eq!(token_key(&bearer).unwrap(), None);

        let anonymous = TestRequest::default().to_http_request();
        assert_eq!(token_key(&anonymous).unwrap(), None);
    }

    #[test]
    fn malformed_token_header_is_rejected() {
        for value in ["Token", "Token a b"] {
            let req = TestRequest::default()
                .insert_header((header::AUTHORIZATION, value))
                .to_http_request();
            assert!(matches!(token_key(&req), Err(ApiError::InvalidToken)));
        }
    }
}
