//! Repositorios
//!
//! El almacén de reservas se consume a través de `BookingRepository`; hay
//! una implementación PostgreSQL y otra en memoria.

pub mod booking_repository;
pub mod memory_booking_repository;
pub mod pg_booking_repository;

pub use booking_repository::{BookingRepository, BookingTx};
pub use memory_booking_repository::InMemoryBookingRepository;
pub use pg_booking_repository::PgBookingRepository;
