// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ledger-integrity validator (C6): checks that recorded balances reconcile
//! with recorded flows, repairing same-timestamp ordering mistakes with a
//! greedy search before giving up.

use crate::error::AuditError;
use audit_types::{within_tolerance, Transaction};
use rust_decimal::Decimal;

/// The repaired row sequence plus how many same-timestamp clusters were
/// reordered to produce it. The validator never mutates its input; this is
/// always a freshly built sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub repaired: Vec<Transaction>,
    pub repair_count: usize,
}

/// Validates `transactions`, already stably sorted by `(timestamp,
/// original_index)`. Returns the repaired sequence or the first
/// irreparable row.
pub fn validate(transactions: &[Transaction], tolerance: Decimal) -> Result<ValidationOutcome, AuditError> {
    let mut rows: Vec<Transaction> = transactions.to_vec();
    let mut repair_count = 0usize;
    let mut i = 1usize;

    while i < rows.len() {
        let prior_balance = rows[i - 1].recorded_balance();
        let expected = prior_balance + rows[i].credit() - rows[i].debit();
        let actual = rows[i].recorded_balance();

        if within_tolerance(expected, actual, tolerance) {
            i += 1;
            continue;
        }

        let timestamp = rows[i].timestamp();
        let cluster_start = rows.iter().position(|row| row.timestamp() == timestamp).expect("row i matches itself");
        let cluster_end = rows.iter().rposition(|row| row.timestamp() == timestamp).expect("row i matches itself");

        if cluster_end == cluster_start {
            return Err(AuditError::IrreparableLedger {
                row_index: rows[i].original_index() as usize,
                last_balance: prior_balance,
                expected,
                actual,
            });
        }

        let search_start_balance = if cluster_start == 0 { Decimal::ZERO } else { rows[cluster_start - 1].recorded_balance() };
        let cluster = &rows[cluster_start..=cluster_end];

        match greedy_order(cluster, search_start_balance, tolerance) {
            Some(ordered) => {
                log::warn!(
                    "row {}: balance discontinuity, repaired via same-timestamp reorder ({} candidates)",
                    rows[i].original_index(),
                    cluster.len()
                );
                rows.splice(cluster_start..=cluster_end, ordered);
                repair_count += 1;
                i = cluster_end + 1;
            }
            None => {
                return Err(AuditError::IrreparableLedger {
                    row_index: rows[i].original_index() as usize,
                    last_balance: prior_balance,
                    expected,
                    actual,
                });
            }
        }
    }

    Ok(ValidationOutcome { repaired: rows, repair_count })
}

/// Greedily assembles `cluster` into the order whose running balance, seeded
/// at `start_balance`, reconciles every row within `tolerance`. At each step
/// the first still-unplaced candidate (in the order it appears in `cluster`)
/// that reconciles wins, which makes original-row-index ascending the
/// natural tiebreaker for rows the search can't otherwise distinguish.
fn greedy_order(cluster: &[Transaction], start_balance: Decimal, tolerance: Decimal) -> Option<Vec<Transaction>> {
    let mut remaining: Vec<Transaction> = cluster.to_vec();
    let mut ordered = Vec::with_capacity(cluster.len());
    let mut current_balance = start_balance;

    while !remaining.is_empty() {
        let position = remaining.iter().position(|candidate| {
            let expected = current_balance + candidate.credit() - candidate.debit();
            within_tolerance(expected, candidate.recorded_balance(), tolerance)
        })?;

        let chosen = remaining.remove(position);
        current_balance = chosen.recorded_balance();
        ordered.push(chosen);
    }

    Some(ordered)
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

    fn tolerance() -> Decimal {
        d("0.01")
    }

    fn ts(hour: u32, minute: u32) -> LedgerTimestamp {
        LedgerTimestamp::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        )
    }

    fn row(index: u32, timestamp: LedgerTimestamp, credit: &str, debit: &str, balance: &str) -> Transaction {
        Transaction::new(index, timestamp, d(credit), d(debit), d(balance), "个人")
    }

    #[test]
    fn consistent_ledger_passes_with_zero_repairs() {
        let rows = vec![
            row(0, ts(9, 0), "100", "0", "100"),
            row(1, ts(10, 0), "50", "0", "150"),
            row(2, ts(11, 0), "0", "30", "120"),
        ];
        let outcome = validate(&rows, tolerance()).unwrap();
        assert_eq!(outcome.repair_count, 0);
        assert_eq!(outcome.repaired, rows);
    }

    /// Seed scenario 5: two same-timestamp credits recorded in swapped
    /// order are reordered so recorded balances reconcile.
    #[test]
    fn greedy_reorder_fixes_swapped_same_timestamp_credits() {
        let shared = ts(12, 0);
        let rows = vec![
            row(0, ts(9, 0), "100", "0", "100"),
            row(1, shared, "20", "0", "130"),
            row(2, shared, "10", "0", "110"),
        ];
        let outcome = validate(&rows, tolerance()).unwrap();
        assert_eq!(outcome.repair_count, 1);
        assert_eq!(outcome.repaired[1].recorded_balance(), d("110"));
        assert_eq!(outcome.repaired[1].original_index(), 2);
        assert_eq!(outcome.repaired[2].recorded_balance(), d("130"));
        assert_eq!(outcome.repaired[2].original_index(), 1);
    }

    /// Running the repaired output back through the validator yields zero
    /// further repairs.
    #[test]
    fn repaired_output_is_stable_under_revalidation() {
        let shared = ts(12, 0);
        let rows = vec![
            row(0, ts(9, 0), "100", "0", "100"),
            row(1, shared, "20", "0", "130"),
            row(2, shared, "10", "0", "110"),
        ];
        let first = validate(&rows, tolerance()).unwrap();
        let second = validate(&first.repaired, tolerance()).unwrap();
        assert_eq!(second.repair_count, 0);
        assert_eq!(second.repaired, first.repaired);
    }

    /// Seed scenario 6: a lone mismatched row with no same-timestamp peers
    /// is irreparable.
    #[test]
    fn lone_mismatch_with_no_peers_is_irreparable() {
        let rows = vec![
            row(0, ts(9, 0), "100", "0", "100"),
            row(1, ts(10, 0), "50", "0", "999"),
        ];
        let err = validate(&rows, tolerance()).unwrap_err();
        match err {
            AuditError::IrreparableLedger { row_index, actual, .. } => {
                assert_eq!(row_index, 1);
                assert_eq!(actual, d("999"));
            }
            other => panic!("expected IrreparableLedger, got {other:?}"),
        }
    }

    #[test]
    fn cluster_with_no_valid_permutation_is_irreparable() {
        let shared = ts(12, 0);
        let rows = vec![
            row(0, ts(9, 0), "100", "0", "100"),
            row(1, shared, "20", "0", "9999"),
            row(2, shared, "10", "0", "9998"),
        ];
        assert!(validate(&rows, tolerance()).is_err());
    }
}
