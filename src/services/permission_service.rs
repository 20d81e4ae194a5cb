//! Política de permisos
//!
//! Un único punto de decisión `can(actor, action, target)` consultado por el
//! carrito, el checkout, la máquina de estados y el catálogo.

use uuid::Uuid;

use crate::models::Actor;
use crate::utils::errors::{AppError, AppResult};

/// Acciones sujetas a permiso
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Approve,
    Reject,
    Complete,
    ManageCatalog,
    Cancel,
    RemoveLine,
    ViewGroup,
    Checkout,
    AddVehicle,
    CreatePaymentIntent,
}

impl BookingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingAction::Approve => "approve",
            BookingAction::Reject => "reject",
            BookingAction::Complete => "complete",
            BookingAction::ManageCatalog => "manage catalog",
            BookingAction::Cancel => "cancel",
            BookingAction::RemoveLine => "remove reservation line",
            BookingAction::ViewGroup => "view reservation",
            BookingAction::Checkout => "checkout",
            BookingAction::AddVehicle => "add vehicle",
            BookingAction::CreatePaymentIntent => "create payment intent",
        }
    }
}

/// Sobre qué recae la acción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionTarget {
    Catalog,
    OwnedBy(Uuid),
}

pub trait PermissionPolicy: Send + Sync {
    fn can(&self, actor: &Actor, action: BookingAction, target: PermissionTarget) -> bool;
}

/// Política por defecto basada en rol y propiedad
#[derive(Debug, Default, Clone, Copy)]
pub struct RolePolicy;

impl PermissionPolicy for RolePolicy {
    fn can(&self, actor: &Actor, action: BookingAction, target: PermissionTarget) -> bool {
        let is_owner = matches!(target, PermissionTarget::OwnedBy(owner) if owner == actor.user_id);

        match action {
            BookingAction::Approve
            | BookingAction::Reject
            | BookingAction::Complete
            | BookingAction::ManageCatalog => actor.is_staff(),
            BookingAction::Cancel | BookingAction::RemoveLine | BookingAction::ViewGroup => {
                actor.is_staff() || is_owner
            }
            BookingAction::Checkout | BookingAction::AddVehicle | BookingAction::CreatePaymentIntent => is_owner,
        }
    }
}

/// Exigir el permiso o devolver `PermissionDenied`
pub fn require(
    policy: &dyn PermissionPolicy,
    actor: &Actor,
    action: BookingAction,
    target: PermissionTarget,
) -> AppResult<()> {
    if policy.can(actor, action, target) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(format!(
            "user {} may not {}",
            actor.user_id,
            action.as_str()
        )))
    }
}
