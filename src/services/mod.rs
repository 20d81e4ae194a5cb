//! Services module
//!
//! Lógica de negocio de reservas. Cada servicio recibe un `BookingContext`
//! con el almacén, la política de permisos, el notificador, el reloj y la
//! configuración.

pub mod availability_service;
pub mod cart_service;
pub mod catalog_service;
pub mod checkout_service;
pub mod context;
pub mod notification_service;
pub mod payment_service;
pub mod permission_service;
pub mod pricing_service;
pub mod reservation_service;
pub mod status_machine;

pub use availability_service::{available_vehicle_ids, is_vehicle_available, AvailabilityService, AvailableVehicle};
pub use cart_service::{CartLine, CartService, CartView};
pub use catalog_service::CatalogService;
pub use checkout_service::CheckoutService;
pub use context::BookingContext;
pub use notification_service::{MemoryNotifier, NotificationEvent, NotificationPayload, Notifier, TracingNotifier};
pub use payment_service::{MockCardGateway, PaymentGateway, PaymentResult, PaymentService};
pub use permission_service::{BookingAction, PermissionPolicy, PermissionTarget, RolePolicy};
pub use pricing_service::{quote, Quote, QuoteLine, QuotePeriod};
pub use reservation_service::ReservationService;
pub use status_machine::{StatusMachine, TransitionAction};
