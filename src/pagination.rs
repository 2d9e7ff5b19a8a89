use actix_web::HttpRequest;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ApiError;

/// `?page=&limit=` as sent by the client. Kept as strings so a malformed
/// `limit` can fall back to the default instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn resolve(params: &PageParams, config: &Config) -> Result<Self, ApiError> {
        let page = match params.page.as_deref() {
            None | Some("") => 1,
            Some(raw) => match raw.parse::<i64>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(ApiError::InvalidPage),
            },
        };
        let limit = params
            .limit
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|limit| *limit > 0)
            .map(|limit| limit.min(config.max_page_size))
            .unwrap_or(config.page_size);
        // an offset that does not fit can never name an existing page
        if page.checked_mul(limit).is_none() {
            return Err(ApiError::InvalidPage);
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    /// Wraps one page of results. A page past the end is an error, except the
    /// first page of an empty result.
    pub fn into_page<T: Serialize>(
        self,
        req: &HttpRequest,
        count: i64,
        results: Vec<T>,
    ) -> Result<Page<T>, ApiError> {
        if self.page > 1 && self.offset() >= count {
            return Err(ApiError::InvalidPage);
        }
        let has_next = self.offset() + self.limit < count;
        Ok(Page {
            count,
            next: has_next.then(|| page_link(req, self.page + 1)),
            previous: (self.page > 1).then(|| page_link(req, self.page - 1)),
            results,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// The current URL with its `page` parameter replaced.
fn page_link(req: &HttpRequest, page: i64) -> String {
    let info = req.connection_info();
    let kept: Vec<(String, String)> = url_pairs(req.query_string())
        .into_iter()
        .filter(|(key, _)| key != "page")
        .collect();

    let mut query = serde_urlencoded::to_string(&kept).unwrap_or_default();
    if !query.is_empty() {
        query.push('&');
    }
    query.push_str(&format!("page={page}"));
    format!(
        "{}://{}{}?{}",
        info.scheme(),
        info.host(),
        req.path(),
        query
    )
}

fn url_pairs(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str(query).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn params(page: Option<&str>, limit: Option<&str>) -> PageParams {
        PageParams {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn defaults_and_caps() {
        let config = Config::default();
        assert_eq!(
            Pagination::resolve(&params(None, None), &config).unwrap(),
            Pagination { page: 1, limit: 6 }
        );
        let capped = Pagination::resolve(&params(Some("2"), Some("5000")), &config).unwrap();
        assert_eq!(capped.limit, config.max_page_size);
        assert_eq!(capped.offset(), config.max_page_size);
        let fallback = Pagination::resolve(&params(None, Some("lots")), &config).unwrap();
        assert_eq!(fallback.limit, config.page_size);
    }

    #[test]
    fn rejects_bad_page_numbers() {
        let config = Config::default();
        assert!(Pagination::resolve(&params(Some("0"), None), &config).is_err());
        assert!(Pagination::resolve(&params(Some("x"), None), &config).is_err());
    }

    #[test]
    fn huge_page_is_invalid_not_overflowing() {
        let config = Config::default();
        let max = i64::MAX.to_string();
        assert!(matches!(
            Pagination::resolve(&params(Some(&max), None), &config),
            Err(ApiError::InvalidPage)
        ));
        let single = Pagination::resolve(&params(Some(&max), Some("1")), &config).unwrap();
        assert_eq!(single.offset(), i64::MAX - 1);
    }

    #[test]
    fn builds_neighbour_links() {
        let req = TestRequest::get()
            .uri("/api/recipes?author=3&page=2&limit=2")
            .insert_header(("host", "example.org"))
            .to_http_request();
        let page = Pagination { page: 2, limit: 2 }
            .into_page(&req, 5, vec![1, 2])
            .unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(
            page.next.as_deref(),
            Some("http://example.org/api/recipes?author=3&limit=2&page=3")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("http://example.org/api/recipes?author=3&limit=2&page=1")
        );
    }

    #[test]
    fn page_past_the_end_is_rejected() {
        let req = TestRequest::get().uri("/api/users").to_http_request();
        let past = Pagination { page: 3, limit: 6 }.into_page::<i32>(&req, 7, vec![]);
        assert!(past.is_err());
        let empty = Pagination { page: 1, limit: 6 }.into_page::<i32>(&req, 0, vec![]);
        assert!(empty.unwrap().next.is_none());
    }
}
