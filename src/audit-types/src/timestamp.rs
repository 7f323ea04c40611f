use chrono::{NaiveDate, NaiveTime};
use std::fmt;

/// A calendar date combined with a whole-second time of day, forming a total
/// order over transaction moments. Rows that share a `LedgerTimestamp` are
/// disambiguated by `Transaction::original_index`, not by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerTimestamp {
    date: NaiveDate,
    time: NaiveTime,
}

impl LedgerTimestamp {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }
}

impl fmt::Display for LedgerTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.time.format("%H:%M:%S"))
    }
}
