//! Installment term until handover.
//!
//! The backend normally reports `months_left`; this mirrors its rule so
//! quotes can be produced offline from a complex's installment settings.

use chrono::{Datelike, Months, NaiveDate};

/// Installment window of a complex: starts on `start`, runs `months` months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallmentWindow {
    pub start: NaiveDate,
    pub months: u32,
}

impl InstallmentWindow {
    pub fn new(start: NaiveDate, months: u32) -> Self {
        Self { start, months }
    }

    /// Handover date: `start` plus `months` calendar months.
    pub fn end(&self) -> NaiveDate {
        self.start
            .checked_add_months(Months::new(self.months))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Whole months left on `today`.
    ///
    /// Counts calendar months to the handover month, minus one once the
    /// current month has started (any day past the 1st). Never negative.
    pub fn months_left(&self, today: NaiveDate) -> u32 {
        let end = self.end();
        let mut diff = (end.year() - today.year()) * 12 + end.month() as i32 - today.month() as i32;
        if today.day() > 1 {
            diff -= 1;
        }
        diff.max(0) as u32
    }
}
