//! Usuario que ejecuta una operación
//!
//! La autenticación es externa: aquí solo llega la identidad ya resuelta.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rol del usuario autenticado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Staff,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Staff => "staff",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(UserRole::Customer),
            "staff" | "manager" | "admin" => Some(UserRole::Staff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn customer(user_id: Uuid) -> Self {
        Self { user_id, role: UserRole::Customer }
    }

    pub fn staff(user_id: Uuid) -> Self {
        Self { user_id, role: UserRole::Staff }
    }

    pub fn is_staff(&self) -> bool {
        self.role == UserRole::Staff
    }
}
