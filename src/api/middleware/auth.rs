use crate::AppState;
use crate::api::error::AppError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Decides whether a caller may use the upload routes.
///
/// Identity and sessions live outside this crate; implementations only look
/// at what the request carries.
pub trait UploadAuthorizer: Send + Sync {
    fn authorize(&self, headers: &HeaderMap) -> bool;
}

/// Every caller is allowed. For deployments that authorise upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl UploadAuthorizer for AllowAll {
    fn authorize(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Requires `Authorization: Bearer <token>` with a fixed shared token.
#[derive(Debug, Clone)]
pub struct StaticTokenAuthorizer {
    token: String,
}

impl StaticTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl UploadAuthorizer for StaticTokenAuthorizer {
    fn authorize(&self, headers: &HeaderMap) -> bool {
        headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .is_some_and(|t| t == self.token)
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.authorizer.authorize(req.headers()) {
        return Ok(next.run(req).await);
    }
    Err(AppError::Unauthorized("Authentication required".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_static_token() {
        let auth = StaticTokenAuthorizer::new("s3cret");
        let mut headers = HeaderMap::new();
        assert!(!auth.authorize(&headers));

        headers.insert("Authorization", HeaderValue::from_static("Bearer wrong!"));
        assert!(!auth.authorize(&headers));

        headers.insert("Authorization", HeaderValue::from_static("Bearer s3cret"));
        assert!(auth.authorize(&headers));
        assert!(AllowAll.authorize(&HeaderMap::new()));
    }
}
