use axum::http::Method;
use uuid::Uuid;

use crate::error::AppError;

/// Per-request access policies for resources that have an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Anyone may read; only the author may modify or delete.
    OwnerOnly,
    /// Anyone may read; nobody may modify or delete through the API.
    ReadOnly,
}

pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

impl Policy {
    /// Decides whether `requester` may apply `method` to a resource owned by `owner`.
    pub fn check(self, method: &Method, requester: Option<Uuid>, owner: Uuid) -> Result<(), AppError> {
        if is_safe_method(method) {
            return Ok(());
        }

        let requester = requester.ok_or(AppError::Unauthorized)?;

        match self {
            Policy::OwnerOnly if requester == owner => Ok(()),
            Policy::OwnerOnly | Policy::ReadOnly => Err(AppError::Forbidden),
        }
    }
}
