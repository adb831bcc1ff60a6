use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// A standardized response wrapper for the API.
/// This ensures consistent JSON structure across all endpoints.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    /// Indicates if the request was successful.
    pub success: bool,
    /// A message describing the result (mostly for errors or confirmations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The actual data payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    /// Creates a success response with data.
    /// Status code defaults to 200 OK.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// Converts to a response with a custom status code.
    /// Usage: `ApiResponse::success(data).with_status(StatusCode::CREATED)`
    pub fn with_status(self, status: StatusCode) -> ApiResponseWithStatus<T> {
        ApiResponseWithStatus {
            status,
            response: self,
        }
    }

    /// Shorthand for 201 Created response.
    pub fn created(self) -> ApiResponseWithStatus<T> {
        self.with_status(StatusCode::CREATED)
    }
}

/// A wrapper that pairs an ApiResponse with a custom StatusCode.
pub struct ApiResponseWithStatus<T> {
    status: StatusCode,
    response: ApiResponse<T>,
}

impl<T> IntoResponse for ApiResponseWithStatus<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

/// Defaults to 200 OK. For other status codes, use `.with_status()` or `.created()`.
impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Empty 204 acknowledgment for deletions and relation removals.
pub struct NoContent;

impl IntoResponse for NoContent {
    fn into_response(self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

/// `?page=N&limit=M` query parameters shared by paginated listings
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page.unwrap_or(1).max(1) - 1).saturating_mul(self.limit())
    }
}

/// One page of a listing plus the total row count
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: i64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, params: &PageParams) -> Self {
        let has_more = params.offset().saturating_add(params.limit()) < count;
        Self {
            results,
            count,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_params_defaults() {
        let params = PageParams::default();
        assert_eq!(params.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn page_params_clamp_and_offset() {
        let params = PageParams {
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!(params.limit(), MAX_PAGE_SIZE);
        assert_eq!(params.offset(), 200);

        let params = PageParams {
            page: Some(0),
            limit: Some(10),
        };
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn huge_page_number_saturates() {
        let params = PageParams {
            page: Some(i64::MAX),
            limit: Some(100),
        };
        assert_eq!(params.offset(), i64::MAX);

        let page = Page::new(Vec::<i32>::new(), 10, &params);
        assert!(!page.has_more);
    }

    #[test]
    fn page_reports_more_results() {
        let params = PageParams {
            page: Some(1),
            limit: Some(2),
        };
        let page = Page::new(vec![1, 2], 3, &params);
        assert!(page.has_more);

        let params = PageParams {
            page: Some(2),
            limit: Some(2),
        };
        let page = Page::new(vec![3], 3, &params);
        assert!(!page.has_more);
    }
}
