use rust_decimal::Decimal;
use std::fmt;

/// Errors the audit pipeline can surface to a caller.
///
/// Only `IrreparableLedger` ever aborts a run (see the propagation policy in
/// [`crate::pipeline::AuditPipeline::run`]). `MalformedInput` rows are
/// processed with a `None` direction and collected in
/// [`crate::pipeline::AuditReport`]'s `malformed_rows` rather than halting
/// the pipeline — it exists in this enum because the taxonomy names it as an
/// error *kind*, not because every occurrence is fatal. `UnknownRedemption`,
/// `UninitializedPool`, and `PoolEmpty` never cross this boundary at all:
/// they are handled locally inside the trackers and surfaced only in a
/// row's behavior label.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditError {
    IrreparableLedger {
        row_index: usize,
        last_balance: Decimal,
        expected: Decimal,
        actual: Decimal,
    },
    MalformedInput {
        row_index: usize,
        reason: String,
    },
    InvalidConfig {
        reason: String,
    },
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::IrreparableLedger {
                row_index,
                last_balance,
                expected,
                actual,
            } => write!(
                f,
                "row {row_index}: balance {actual} does not reconcile with flows from {last_balance} (expected {expected}), and no same-timestamp reordering repairs it"
            ),
            AuditError::MalformedInput { row_index, reason } => {
                write!(f, "row {row_index}: malformed input, {reason}")
            }
            AuditError::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for AuditError {}
