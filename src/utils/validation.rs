//! Utilidades de validación
//!
//! Reglas compartidas por carrito, reservas y catálogo. Cada función añade
//! sus fallos a un `ValidationErrors` en lugar de cortar en el primero, así
//! el cliente recibe todos los campos inválidos de una vez.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use validator::ValidationErrors;

use crate::models::VehicleCategory;
use crate::utils::errors::{field_error, AppError, AppResult};

/// Validar un rango de alquiler `[start, end)` contra hoy y la duración máxima
pub fn check_rental_dates(
    errors: &mut ValidationErrors,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    max_days: i64,
) {
    if end <= start {
        errors.add("end_date", field_error("date_order", "End date must be after start date."));
    }
    if start < today {
        errors.add("start_date", field_error("past", "Pickup date cannot be in the past."));
    }
    if end < today {
        errors.add("end_date", field_error("past", "Return date cannot be in the past."));
    }
    check_rental_length(errors, start, end, max_days);
}

/// Solo la duración máxima (usada también tras fusionar items del carrito)
pub fn check_rental_length(errors: &mut ValidationErrors, start: NaiveDate, end: NaiveDate, max_days: i64) {
    let rental_days = (end - start).num_days();
    if rental_days > max_days {
        errors.add(
            "end_date",
            field_error(
                "max_rental_days",
                format!("Rental length is too long: {} days (max {}).", rental_days, max_days),
            ),
        );
    }
}

/// Validar asientos según la categoría: exactamente uno de {seats, unlimited}
pub fn check_seats(errors: &mut ValidationErrors, category: VehicleCategory, seats: Option<i32>, unlimited: bool) {
    match (seats, unlimited) {
        (Some(_), true) => {
            errors.add("seats", field_error("seats", "Leave seats empty when unlimited seats is enabled."));
        }
        (None, false) => {
            errors.add("seats", field_error("seats", "Seats is required."));
        }
        (Some(count), false) => {
            let (low, high) = category.seat_bounds();
            if count < low || count > high {
                errors.add(
                    "seats",
                    field_error(
                        "seat_bounds",
                        format!(
                            "{} must have between {} and {} seats (got {}).",
                            category.as_str(),
                            low,
                            high,
                            count
                        ),
                    ),
                );
            }
        }
        (None, true) => {}
    }
}

pub fn check_daily_price(errors: &mut ValidationErrors, daily_price: Decimal) {
    if daily_price < Decimal::ZERO {
        errors.add("daily_price", field_error("non_negative", "Price per day must be zero or positive."));
    }
}

/// Validar que un string no esté vacío
pub fn check_not_empty(errors: &mut ValidationErrors, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, field_error("not_empty", "This field is required."));
    }
}

/// Convertir los errores acumulados en resultado
pub fn into_result(errors: ValidationErrors) -> AppResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
