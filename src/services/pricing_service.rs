//! Motor de precios
//!
//! Convierte un rango `[start, end)` y una tarifa diaria en un presupuesto.
//! Cada bloque completo de 30 días se factura como 26 días y cada bloque de
//! 7 días como 6; el resto va a tarifa completa. Se prueban dos
//! descomposiciones (meses primero y semanas primero) y gana la más barata;
//! en caso de empate, meses primero.

use chrono::NaiveDate;
use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const MONTH_BLOCK_DAYS: i64 = 30;
const MONTH_BLOCK_BILLED: i64 = 26;
const WEEK_BLOCK_DAYS: i64 = 7;
const WEEK_BLOCK_BILLED: i64 = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuotePeriod {
    MonthBlock,
    WeekBlock,
    Day,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuoteLine {
    pub period: QuotePeriod,
    pub units: i64,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub days: i64,
    pub total: Decimal,
    pub breakdown: Vec<QuoteLine>,
    pub currency: String,
}

impl Quote {
    fn zero(days: i64, currency: &str) -> Self {
        Self {
            days,
            total: Decimal::ZERO,
            breakdown: Vec::new(),
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decomposition {
    months: i64,
    weeks: i64,
    days: i64,
}

impl Decomposition {
    fn months_first(days: i64) -> Self {
        let months = days / MONTH_BLOCK_DAYS;
        let rest = days % MONTH_BLOCK_DAYS;
        Self {
            months,
            weeks: rest / WEEK_BLOCK_DAYS,
            days: rest % WEEK_BLOCK_DAYS,
        }
    }

    fn weeks_first(days: i64) -> Self {
        let weeks = days / WEEK_BLOCK_DAYS;
        let rest = days % WEEK_BLOCK_DAYS;
        Self {
            months: rest / MONTH_BLOCK_DAYS,
            weeks,
            days: rest % MONTH_BLOCK_DAYS,
        }
    }

    fn billed_days(&self) -> i64 {
        self.months * MONTH_BLOCK_BILLED + self.weeks * WEEK_BLOCK_BILLED + self.days
    }
}

/// Redondeo a céntimos, mitad hacia arriba
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Importe en unidades menores (céntimos); `None` si no cabe en un i64
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Calcular el presupuesto de un alquiler
pub fn quote(start: NaiveDate, end: NaiveDate, daily_rate: Decimal, currency: &str) -> Quote {
    let days = (end - start).num_days();
    if days <= 0 {
        return Quote::zero(0, currency);
    }
    if daily_rate <= Decimal::ZERO {
        return Quote::zero(days, currency);
    }

    let months_first = Decomposition::months_first(days);
    let weeks_first = Decomposition::weeks_first(days);
    let best = if weeks_first.billed_days() < months_first.billed_days() {
        weeks_first
    } else {
        months_first
    };

    let mut breakdown = Vec::new();
    let mut raw_total = Decimal::ZERO;
    let lines = [
        (QuotePeriod::MonthBlock, best.months, MONTH_BLOCK_BILLED),
        (QuotePeriod::WeekBlock, best.weeks, WEEK_BLOCK_BILLED),
        (QuotePeriod::Day, best.days, 1),
    ];
    for (period, units, billed_per_unit) in lines {
        if units == 0 {
            continue;
        }
        let unit_price = daily_rate * Decimal::from(billed_per_unit);
        let subtotal = unit_price * Decimal::from(units);
        raw_total += subtotal;
        breakdown.push(QuoteLine {
            period,
            units,
            unit_price: round_money(unit_price),
            subtotal: round_money(subtotal),
        });
    }

    Quote {
        days,
        total: round_money(raw_total),
        breakdown,
        currency: currency.to_string(),
    }
}
