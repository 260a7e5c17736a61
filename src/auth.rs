//! Caller identity as asserted by the upstream authentication gateway.
//!
//! The gateway authenticates the user and forwards identity in headers:
//! `x-user-id`, `x-user-role`, `x-institution-id` and optionally
//! `x-user-name`. These are trusted as given; per-institution ownership is
//! checked here before anything is read or written.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ApiError, CertError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const INSTITUTION_HEADER: &str = "x-institution-id";
pub const NAME_HEADER: &str = "x-user-name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Institution,
    User,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "institution" => Ok(Role::Institution),
            "user" => Ok(Role::User),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
    pub institution_id: Option<Uuid>,
    pub display_name: String,
}

impl Caller {
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            institution_id: None,
            display_name: "Administrator".to_string(),
        }
    }

    pub fn institution(user_id: Uuid, institution_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            role: Role::Institution,
            institution_id: Some(institution_id),
            display_name: display_name.into(),
        }
    }

    pub fn user(user_id: Uuid, institution_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::User,
            institution_id: Some(institution_id),
            display_name: "User".to_string(),
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, CertError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(CertError::Unauthenticated)?;
        let role: Role = header(ROLE_HEADER)
            .and_then(|v| v.parse().ok())
            .ok_or(CertError::Unauthenticated)?;
        let institution_id = match header(INSTITUTION_HEADER) {
            Some(v) => Some(Uuid::parse_str(v).map_err(|_| CertError::Unauthenticated)?),
            None => None,
        };
        if role != Role::Admin && institution_id.is_none() {
            return Err(CertError::Unauthenticated);
        }

        Ok(Self {
            user_id,
            role,
            institution_id,
            display_name: header(NAME_HEADER).unwrap_or("Issuer").to_string(),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Issue and update rights over `institution_id`.
    pub fn can_manage(&self, institution_id: Uuid) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Institution => self.institution_id == Some(institution_id),
            Role::User => false,
        }
    }

    /// Read rights over `institution_id`.
    pub fn can_read(&self, institution_id: Uuid) -> bool {
        self.is_admin() || self.institution_id == Some(institution_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers).map_err(ApiError::from)
    }
}
