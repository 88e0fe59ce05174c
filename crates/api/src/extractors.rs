//! Request extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};

use pipeline_core::ScopeContext;

use crate::response::ApiError;

/// Ingestion scope extracted from gateway-injected headers.
///
/// Authentication happens upstream; by the time a request reaches this
/// service the gateway has validated the caller and stamped
/// `X-Organization-Id` and `X-Project-Id`. Requests without both headers
/// are rejected — there is no ambient default scope.
#[derive(Debug, Clone)]
pub struct Scope(pub ScopeContext);

#[async_trait]
impl<S> FromRequestParts<S> for Scope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let organization_id = header_value(parts, "X-Organization-Id")
            .ok_or_else(|| ApiError::bad_request("missing X-Organization-Id header"))?;
        let project_id = header_value(parts, "X-Project-Id")
            .ok_or_else(|| ApiError::bad_request("missing X-Project-Id header"))?;

        Ok(Scope(ScopeContext::new(organization_id, project_id)))
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
