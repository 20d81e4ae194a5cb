//! Identidad del llamante
//!
//! La autenticación es externa: la capa que la resuelve deja el usuario en
//! las cabeceras `x-user-id` y `x-user-role`. Sin rol se asume cliente.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::models::{Actor, UserRole};
use crate::utils::errors::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?;
        let user_id = Uuid::parse_str(user_id.trim())
            .map_err(|_| AppError::Unauthorized("Invalid x-user-id header".to_string()))?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => UserRole::Customer,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|r| UserRole::from_str(r.trim()))
                .ok_or_else(|| AppError::Unauthorized("Invalid x-user-role header".to_string()))?,
        };

        Ok(Actor { user_id, role })
    }
}
