mod attribute;
mod money;
mod timestamp;
mod transaction;

pub use attribute::{classify_attribute, classify_direction, Direction, FundAttribute};
pub use money::{round_to, snap_to_zero, within_tolerance};
pub use timestamp::LedgerTimestamp;
pub use transaction::Transaction;
