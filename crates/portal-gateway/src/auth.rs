use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, StatusCode, request::Parts},
};
use portal_core::Role;
use uuid::Uuid;

pub const USER_HEADER: &str = "x-portal-user";
pub const ROLE_HEADER: &str = "x-portal-role";

/// Identity forwarded by the session layer in front of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn require(&self, allowed: &[Role]) -> Result<(), (StatusCode, String)> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        Err((
            StatusCode::FORBIDDEN,
            format!("role {} may not perform this action", self.role.as_str()),
        ))
    }

    pub fn require_back_office(&self) -> Result<(), (StatusCode, String)> {
        self.require(&[Role::Admin, Role::Staff])
    }

    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let unauthenticated = |message: &str| (StatusCode::UNAUTHORIZED, message.to_string());

        let user = header(&parts.headers, USER_HEADER)
            .ok_or_else(|| unauthenticated("missing caller identity"))?;
        let user = Uuid::parse_str(user).map_err(|_| unauthenticated("malformed caller identity"))?;
        let role = header(&parts.headers, ROLE_HEADER)
            .ok_or_else(|| unauthenticated("missing caller role"))?;
        let role = Role::parse(role).ok_or_else(|| unauthenticated("unknown caller role"))?;

        Ok(Self { user, role })
    }
}

/// Address recorded with a signature: the first `x-forwarded-for` hop, else
/// the socket peer, else `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    fn resolve(parts: &Parts) -> Self {
        let forwarded = header(&parts.headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return Self(hop.to_string());
        }

        match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(peer)) => Self(peer.ip().to_string()),
            None => Self("unknown".to_string()),
        }
    }
}

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::resolve(parts))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/agreement");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn caller_requires_both_headers() {
        let user = Uuid::new_v4().to_string();
        let mut missing_role = parts(&[(USER_HEADER, user.as_str())]);
        let err = Caller::from_request_parts(&mut missing_role, &()).await.unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        let mut complete = parts(&[(USER_HEADER, user.as_str()), (ROLE_HEADER, "Staff")]);
        let caller = Caller::from_request_parts(&mut complete, &()).await.unwrap();
        assert_eq!(caller.role, Role::Staff);
        assert!(caller.require_back_office().is_ok());
        assert_eq!(
            caller.require(&[Role::Admin]).unwrap_err().0,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn client_addr_prefers_first_forwarded_hop() {
        let forwarded = parts(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(ClientAddr::resolve(&forwarded).0, "203.0.113.7");

        let mut peer = parts(&[]);
        peer.extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 5120))));
        assert_eq!(ClientAddr::resolve(&peer).0, "192.0.2.4");

        assert_eq!(ClientAddr::resolve(&parts(&[])).0, "unknown");
    }
}
