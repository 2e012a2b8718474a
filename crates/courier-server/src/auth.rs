//! Caller identity.
//!
//! Authentication happens in front of this server. The gateway forwards the
//! authenticated user id in the `X-User-Id` header; browsers opening a
//! WebSocket cannot set headers, so the upgrade request may carry it as a
//! `userId` query parameter instead.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use courier_shared::types::UserId;

use crate::error::ServerError;

pub const USER_ID_HEADER: &str = "x-user-id";
const USER_ID_QUERY: &str = "userId";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| query_user_id(parts.uri.query()));

        let Some(raw) = raw else {
            return Err(ServerError::Unauthorized("missing caller identity".into()));
        };

        UserId::from_hex(raw.trim())
            .map(Caller)
            .map_err(|_| ServerError::Unauthorized("malformed caller identity".into()))
    }
}

fn query_user_id(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == USER_ID_QUERY).then(|| value.to_string())
    })
}
