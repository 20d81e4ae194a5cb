//! Reloj inyectable
//!
//! Los servicios nunca llaman a `Utc::now()` directamente; así los tests
//! pueden fijar "hoy" y simular la expiración de los payment intents.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use parking_lot::RwLock;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Reloj fijo para tests, avanzable a mano
#[derive(Debug)]
pub struct FixedClock {
    time: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time: RwLock::new(time) }
    }

    /// Las 09:00 UTC del día indicado
    pub fn at_date(date: NaiveDate) -> Self {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
        Self::new(Utc.from_utc_datetime(&date.and_time(nine)))
    }

    pub fn advance(&self, by: Duration) {
        *self.time.write() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read()
    }
}
