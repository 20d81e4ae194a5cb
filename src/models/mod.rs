//! Modelos del sistema
//!
//! Este módulo contiene todos los modelos de datos que mapean
//! al schema PostgreSQL de reservas.

pub mod actor;
pub mod cart;
pub mod location;
pub mod payment;
pub mod reservation;
pub mod vehicle;

pub use actor::{Actor, UserRole};
pub use cart::{Cart, CartItem};
pub use location::Location;
pub use payment::{PaymentIntent, PaymentIntentStatus, PaymentOutcome};
pub use reservation::{ReservationGroup, ReservationGroupDetail, ReservationStatus, VehicleReservation};
pub use vehicle::{EngineType, Vehicle, VehicleCategory};
