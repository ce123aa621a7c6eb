use crate::AppState;
use crate::api::error::AppError;
use crate::models::RequestContext;
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, Path},
    http::{header, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;

const MAX_USER_AGENT_LEN: usize = 512;

/// Whether `x-forwarded-for` comes from a proxy we control.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustProxy(pub bool);

impl FromRef<AppState> for TrustProxy {
    fn from_ref(state: &AppState) -> Self {
        TrustProxy(state.config.trust_proxy)
    }
}

/// Client address and user agent for audit entries. The first
/// `x-forwarded-for` hop is used only when the proxy is trusted; otherwise
/// the socket peer.
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
    TrustProxy: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TrustProxy(trust_proxy) = TrustProxy::from_ref(state);
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .filter(|_| trust_proxy)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let source_ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(MAX_USER_AGENT_LEN).collect());

        Ok(RequestContext {
            source_ip,
            user_agent,
        })
    }
}

/// Numeric document id from the path. A malformed id is a validation error
/// with the usual JSON body.
#[derive(Debug, Clone, Copy)]
pub struct DocumentId(pub i64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for DocumentId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Validation("Invalid document id".to_string()))?;
        Ok(DocumentId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn forwarded_parts() -> Parts {
        let (mut parts, _) = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header(header::USER_AGENT, "curl/8.0")
            .body(())
            .unwrap()
            .into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));
        parts
    }

    #[tokio::test]
    async fn test_forwarded_for_wins_behind_trusted_proxy() {
        let mut parts = forwarded_parts();
        let ctx = RequestContext::from_request_parts(&mut parts, &TrustProxy(true))
            .await
            .unwrap();
        assert_eq!(ctx.source_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_forwarded_for_ignored_by_default() {
        let mut parts = forwarded_parts();
        let ctx = RequestContext::from_request_parts(&mut parts, &TrustProxy::default())
            .await
            .unwrap();
        assert_eq!(ctx.source_ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_falls_back_to_peer_address() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 9000))));

        let ctx = RequestContext::from_request_parts(&mut parts, &TrustProxy(true))
            .await
            .unwrap();
        assert_eq!(ctx.source_ip.as_deref(), Some("192.0.2.1"));
        assert!(ctx.user_agent.is_none());
    }
}
