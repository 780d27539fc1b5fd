use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use roost_model::Peer;

use crate::{PEER_HEADER, config::ApiConfig, error::ApiError};

/// The peer behind an HTTP request.
///
/// Identity comes from [`PEER_HEADER`]; the permission level from the bearer token, if
/// any. An unknown token is refused rather than downgraded.
#[derive(Debug, Clone)]
pub struct Caller(pub Peer);

impl Caller {
    pub fn from_headers(headers: &HeaderMap, cfg: &ApiConfig) -> Result<Self, ApiError> {
        let id = headers
            .get(PEER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest(format!("missing {PEER_HEADER} header")))?;

        let token = match headers.get(AUTHORIZATION) {
            None => None,
            Some(v) => Some(
                v.to_str()
                    .ok()
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .map(str::trim)
                    .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".into()))?,
            ),
        };
        let permission = cfg
            .permission_for(token)
            .ok_or_else(|| ApiError::Unauthorized("unknown access token".into()))?;

        Ok(Caller(Peer::new(id, permission)))
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    Arc<ApiConfig>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cfg = Arc::<ApiConfig>::from_ref(state);
        Caller::from_headers(&parts.headers, &cfg)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn cfg() -> ApiConfig {
        let mut cfg = ApiConfig::default();
        cfg.access_tokens.insert("admin-token".into(), 100);
        cfg
    }

    #[test]
    fn anonymous_caller_gets_level_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(PEER_HEADER, HeaderValue::from_static("client-1"));
        let Caller(peer) = Caller::from_headers(&headers, &cfg()).unwrap();
        assert_eq!(peer.id.as_str(), "client-1");
        assert_eq!(peer.permission, 0);
    }

    #[test]
    fn bearer_token_sets_permission() {
        let mut headers = HeaderMap::new();
        headers.insert(PEER_HEADER, HeaderValue::from_static("ops"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer admin-token"));
        let Caller(peer) = Caller::from_headers(&headers, &cfg()).unwrap();
        assert_eq!(peer.permission, 100);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(matches!(
            Caller::from_headers(&headers, &cfg()),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn missing_peer_header_is_invalid() {
        assert!(matches!(
            Caller::from_headers(&HeaderMap::new(), &cfg()),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
