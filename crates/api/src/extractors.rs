//! Request extractors.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use mozo_common::AppError;
use mozo_core::{CallOrigin, Staff};
use mozo_db::entities::user;

use crate::middleware::AppState;

/// Authenticated user extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by auth middleware
        parts
            .extensions
            .get::<user::Model>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Authenticated user with a resolved staff profile.
///
/// Users without a usable profile are rejected with Forbidden.
#[derive(Debug, Clone)]
pub struct StaffProfile(pub Staff);

impl FromRequestParts<AppState> for StaffProfile {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(staff) = parts.extensions.get::<Staff>() {
            return Ok(Self(staff.clone()));
        }

        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        let staff = state.profile_service.staff(user).await?;
        staff.ensure_profile()?;

        parts.extensions.insert(staff.clone());
        Ok(Self(staff))
    }
}

/// Client address and user agent of the request.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    #[must_use]
    pub fn into_origin(self) -> CallOrigin {
        CallOrigin {
            client_ip: self.ip.map(|ip| ip.to_string()),
            user_agent: self.user_agent,
        }
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Self {
            ip: forwarded_ip(&parts.headers).or(peer),
            user_agent: parts
                .headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .map(|ua| ua.chars().take(512).collect()),
        })
    }
}

/// Client IP from proxy headers: first `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(ip) = xff
            .split(',')
            .next()
            .and_then(|first| first.trim().parse().ok())
    {
        return Some(ip);
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_forwarded_ip_prefers_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(forwarded_ip(&headers), "203.0.113.7".parse().ok());
    }

    #[test]
    fn test_forwarded_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(forwarded_ip(&headers), "10.0.0.2".parse().ok());
        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_client_info_into_origin() {
        let origin = ClientInfo {
            ip: "203.0.113.7".parse().ok(),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
        .into_origin();

        assert_eq!(origin.client_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(origin.user_agent.as_deref(), Some("Mozilla/5.0"));
    }
}
