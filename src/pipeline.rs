//! Audit pipeline (C7): orchestrates sort, validation, tracker selection,
//! and the row-by-row fold that produces the final report.

use crate::balance::BalanceTracker;
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::fifo::FifoTracker;
use crate::pool::{PoolLedgerEntry, PoolSummary};
use crate::tracker::FundTracker;
use crate::validation::validate;
use audit_types::{classify_attribute, classify_direction, round_to, within_tolerance, Direction, Transaction};
use rust_decimal::Decimal;

/// Selects which `FundTracker` implementation processes a run. Immutable
/// for the duration of the run — there is no mid-run algorithm switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerAlgorithm {
    Fifo,
    BalanceMethod,
}

/// One input row augmented with everything the tracker derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditedRow {
    pub transaction: Transaction,
    pub personal_ratio: Decimal,
    pub company_ratio: Decimal,
    pub behavior: String,
    pub cumulative_misuse: Decimal,
    pub cumulative_advance: Decimal,
    pub cumulative_returned_company_principal: Decimal,
    pub cumulative_returned_personal_principal: Decimal,
    pub personal_profit_share: Decimal,
    pub company_profit_share: Decimal,
    pub personal_balance: Decimal,
    pub company_balance: Decimal,
    pub total_balance: Decimal,
    pub funding_gap: Decimal,
}

/// The complete output of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    pub rows: Vec<AuditedRow>,
    pub pool_ledger: Vec<PoolLedgerEntry>,
    pub pool_summaries: Vec<PoolSummary>,
    pub repair_count: usize,
    /// Rows with neither a positive credit nor a positive debit despite a
    /// nonzero balance delta from the row before them — recorded, not
    /// fatal; each is processed with `Direction::None` (see
    /// [`AuditError::MalformedInput`]).
    pub malformed_rows: Vec<AuditError>,
}

/// Builds a fresh tracker for `algorithm`. The two variants share no state
/// and are dispatched through the `FundTracker` trait object rather than a
/// class hierarchy.
fn build_tracker(algorithm: TrackerAlgorithm, precision: u32) -> Box<dyn FundTracker> {
    match algorithm {
        TrackerAlgorithm::Fifo => Box::new(FifoTracker::new(precision)),
        TrackerAlgorithm::BalanceMethod => Box::new(BalanceTracker::new(precision)),
    }
}

/// The opening balance implied by the first row: its recorded balance minus
/// its own net flow, i.e. the balance the account held immediately before
/// that row posted.
fn opening_balance(first: &Transaction, precision: u32) -> Decimal {
    round_to(first.recorded_balance() - first.credit() + first.debit(), precision)
}

pub struct AuditPipeline;

impl AuditPipeline {
    /// Runs the full pipeline: stable-sort by `(timestamp, original_index)`,
    /// validate (and repair) the ledger, seed the opening balance, then fold
    /// every row through the selected tracker.
    pub fn run(transactions: Vec<Transaction>, algorithm: TrackerAlgorithm, config: &AuditConfig) -> Result<AuditReport, AuditError> {
        let mut transactions = transactions;
        transactions.sort_by(|a, b| a.timestamp().cmp(&b.timestamp()).then(a.original_index().cmp(&b.original_index())));

        let validated = validate(&transactions, config.balance_tolerance)?;
        let mut tracker = build_tracker(algorithm, config.precision);

        if let Some(first) = validated.repaired.first() {
            let opening = opening_balance(first, config.precision);
            if opening > Decimal::ZERO {
                log::info!("seeding opening balance {opening:.2} as {:?}", config.opening_balance_owner);
                tracker.initialize(opening, config.opening_balance_owner);
            }
        }

        let mut rows = Vec::with_capacity(validated.repaired.len());
        let mut malformed_rows = Vec::new();
        let mut previous_balance: Option<Decimal> = None;

        for transaction in validated.repaired {
            let attribute = classify_attribute(
                transaction.attribute_label(),
                &config.personal_keywords,
                &config.company_keywords,
                &config.investment_prefixes,
            );
            let (amount, direction) = classify_direction(transaction.credit(), transaction.debit());

            if direction == Direction::None {
                if let Some(prior) = previous_balance {
                    if !within_tolerance(prior, transaction.recorded_balance(), config.balance_tolerance) {
                        malformed_rows.push(AuditError::MalformedInput {
                            row_index: transaction.original_index() as usize,
                            reason: format!(
                                "credit and debit both non-positive but recorded balance moved from {prior} to {}",
                                transaction.recorded_balance()
                            ),
                        });
                    }
                }
            }
            previous_balance = Some(transaction.recorded_balance());

            let outcome = match direction {
                Direction::Credit => tracker.process_credit(amount, &attribute, transaction.timestamp()),
                Direction::Debit => tracker.process_debit(amount, &attribute, transaction.timestamp()),
                Direction::None => crate::tracker::RowOutcome {
                    personal_ratio: Decimal::ZERO,
                    company_ratio: Decimal::ZERO,
                    behavior: "无交易".to_string(),
                },
            };

            let snapshot = tracker.snapshot();
            rows.push(AuditedRow {
                transaction,
                personal_ratio: outcome.personal_ratio,
                company_ratio: outcome.company_ratio,
                behavior: outcome.behavior,
                cumulative_misuse: snapshot.cumulative_misuse,
                cumulative_advance: snapshot.cumulative_advance,
                cumulative_returned_company_principal: snapshot.cumulative_returned_company_principal,
                cumulative_returned_personal_principal: snapshot.cumulative_returned_personal_principal,
                personal_profit_share: snapshot.personal_profit_share,
                company_profit_share: snapshot.company_profit_share,
                personal_balance: snapshot.personal_balance,
                company_balance: snapshot.company_balance,
                total_balance: snapshot.total_balance(),
                funding_gap: snapshot.funding_gap(),
            });
        }

        Ok(AuditReport {
            rows,
            pool_ledger: tracker.pool_ledger().to_vec(),
            pool_summaries: tracker.pool_manager().summaries(),
            repair_count: validated.repair_count,
            malformed_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_types::LedgerTimestamp;
    use chrono::{NaiveDate, NaiveTime};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ts(hour: u32) -> LedgerTimestamp {
        LedgerTimestamp::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        )
    }

    fn row(index: u32, timestamp: LedgerTimestamp, credit: &str, debit: &str, balance: &str, label: &str) -> Transaction {
        Transaction::new(index, timestamp, d(credit), d(debit), d(balance), label)
    }

    /// Seed scenario 1 end-to-end: a company opening balance funds a
    /// personal debit, which the pipeline reports as misuse.
    #[test]
    fn pipeline_reports_misuse_for_personal_debit_funded_by_opening_company_balance() {
        let transactions = vec![
            row(0, ts(9), "0", "0", "200000", "公司"),
            row(1, ts(10), "0", "100000", "100000", "个人"),
        ];
        let config = AuditConfig::default();
        let report = AuditPipeline::run(transactions, TrackerAlgorithm::Fifo, &config).unwrap();

        assert_eq!(report.repair_count, 0);
        assert_eq!(report.rows.len(), 2);
        let last = report.rows.last().unwrap();
        assert_eq!(last.cumulative_misuse, d("100000"));
        assert_eq!(last.total_balance, d("100000"));
        assert!(report.malformed_rows.is_empty());
    }

    /// A validated ledger can never carry a `Direction::None` row whose
    /// balance moved, since the validator already enforces continuity —
    /// `malformed_rows` stays empty on any input that reaches the tracker.
    #[test]
    fn a_quiet_no_activity_row_is_not_malformed() {
        let transactions = vec![
            row(0, ts(9), "0", "0", "100", "公司"),
            row(1, ts(10), "0", "0", "100", "公司"),
        ];
        let config = AuditConfig::default();
        let report = AuditPipeline::run(transactions, TrackerAlgorithm::Fifo, &config).unwrap();
        assert!(report.malformed_rows.is_empty());
    }

    #[test]
    fn pipeline_propagates_irreparable_ledger_error() {
        let transactions = vec![
            row(0, ts(9), "100", "0", "100", "个人"),
            row(1, ts(10), "50", "0", "999", "个人"),
        ];
        let config = AuditConfig::default();
        let err = AuditPipeline::run(transactions, TrackerAlgorithm::Fifo, &config).unwrap_err();
        assert!(matches!(err, AuditError::IrreparableLedger { .. }));
    }

    #[test]
    fn both_algorithms_agree_on_a_pure_single_owner_run() {
        let transactions = vec![
            row(0, ts(9), "0", "0", "100000", "公司"),
            row(1, ts(10), "0", "30000", "70000", "公司"),
        ];
        let config = AuditConfig::default();
        let fifo_report = AuditPipeline::run(transactions.clone(), TrackerAlgorithm::Fifo, &config).unwrap();
        let balance_report = AuditPipeline::run(transactions, TrackerAlgorithm::BalanceMethod, &config).unwrap();

        assert_eq!(fifo_report.rows.last().unwrap().total_balance, balance_report.rows.last().unwrap().total_balance);
        assert_eq!(fifo_report.rows.last().unwrap().cumulative_misuse, Decimal::ZERO);
        assert_eq!(balance_report.rows.last().unwrap().cumulative_misuse, Decimal::ZERO);
    }
}
