//! DTOs de la API HTTP

pub mod cart_dto;
pub mod common_dto;
pub mod payment_dto;
pub mod vehicle_dto;

pub use cart_dto::RentalSelectionRequest;
pub use common_dto::ApiResponse;
pub use payment_dto::ConfirmPaymentRequest;
pub use vehicle_dto::{AvailabilityQuery, CreateLocationRequest, CreateVehicleRequest, QuoteQuery};
