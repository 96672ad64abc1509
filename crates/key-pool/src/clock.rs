//! Accounting-day clock
//!
//! Usage counters accumulate over one local calendar day. The store asks a
//! `Clock` for "today" instead of reading the system time directly so day
//! rollover can be driven from tests and simulations.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{Days, Local, NaiveDate};

/// Source of the current accounting day.
pub trait Clock: Send + Sync + fmt::Debug {
    fn today(&self) -> NaiveDate;
}

/// Local-time calendar day of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, day: NaiveDate) {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner) = day;
    }

    /// Move forward by `days`. Saturates at the last representable date.
    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = today.checked_add_days(Days::new(days)) {
            *today = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
