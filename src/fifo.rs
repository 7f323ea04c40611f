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

//! FIFO fund tracker (C4): an ordered queue of ownership-tagged deposit
//! slices, consumed head-first on every debit, with a partially-consumed
//! remainder pushed back to the front.

use crate::behavior::BehaviorAnalyzer;
use crate::config::Owner;
use crate::pool::{format_ratio, InvestmentPoolManager, PoolLedgerEntry, RedemptionOutcome};
use crate::tracker::{FundTracker, RowOutcome, TrackerSnapshot};
use audit_types::{round_to, FundAttribute, LedgerTimestamp};
use rust_decimal::Decimal;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SliceOwner {
    Personal,
    Company,
}

/// An ownership-tagged portion of a single credit, retained in arrival
/// order for deduction by later debits.
#[derive(Debug, Clone)]
struct DepositSlice {
    amount: Decimal,
    owner: SliceOwner,
}

/// The FIFO fund tracker. Holds two running balances plus the deposit
/// queue that backs them; `personal_balance`/`company_balance` are kept in
/// sync with the queue so callers can read them without walking it.
pub struct FifoTracker {
    personal_balance: Decimal,
    company_balance: Decimal,
    initialized: bool,
    queue: VecDeque<DepositSlice>,
    pools: InvestmentPoolManager,
    pool_ledger: Vec<PoolLedgerEntry>,
    cumulative_misuse: Decimal,
    cumulative_advance: Decimal,
    cumulative_returned_company_principal: Decimal,
    cumulative_returned_personal_principal: Decimal,
    personal_profit_share: Decimal,
    company_profit_share: Decimal,
    precision: u32,
}

impl FifoTracker {
    pub fn new(precision: u32) -> Self {
        Self {
            personal_balance: Decimal::ZERO,
            company_balance: Decimal::ZERO,
            initialized: false,
            queue: VecDeque::new(),
            pools: InvestmentPoolManager::new(precision),
            pool_ledger: Vec::new(),
            cumulative_misuse: Decimal::ZERO,
            cumulative_advance: Decimal::ZERO,
            cumulative_returned_company_principal: Decimal::ZERO,
            cumulative_returned_personal_principal: Decimal::ZERO,
            personal_profit_share: Decimal::ZERO,
            company_profit_share: Decimal::ZERO,
            precision,
        }
    }

    fn round(&self, value: Decimal) -> Decimal {
        round_to(value, self.precision)
    }

    fn enqueue(&mut self, amount: Decimal, owner: SliceOwner) {
        if amount <= Decimal::ZERO {
            return;
        }
        self.queue.push_back(DepositSlice { amount, owner });
        match owner {
            SliceOwner::Personal => self.personal_balance = self.round(self.personal_balance + amount),
            SliceOwner::Company => self.company_balance = self.round(self.company_balance + amount),
        }
    }

    /// Rebuilds a two-slice queue from the current balances when the queue
    /// has desynced from them — this should never happen if the invariants
    /// hold, so treat any occurrence as a bug signal, handled as a
    /// best-effort recovery rather than a hard failure.
    fn rebuild_queue_if_desynced(&mut self) {
        if !self.queue.is_empty() {
            return;
        }
        if self.personal_balance <= Decimal::ZERO && self.company_balance <= Decimal::ZERO {
            return;
        }
        log::warn!("FIFO deposit queue is empty but balances are non-zero; rebuilding from balances");
        if self.personal_balance > Decimal::ZERO {
            self.queue.push_back(DepositSlice {
                amount: self.personal_balance,
                owner: SliceOwner::Personal,
            });
        }
        if self.company_balance > Decimal::ZERO {
            self.queue.push_back(DepositSlice {
                amount: self.company_balance,
                owner: SliceOwner::Company,
            });
        }
    }

    /// Dequeues slices to cover `effective`, returning the personal/company
    /// split actually deducted. No zero-amount slice is ever retained.
    fn drain(&mut self, effective: Decimal) -> (Decimal, Decimal) {
        let mut remaining = effective;
        let mut personal_deducted = Decimal::ZERO;
        let mut company_deducted = Decimal::ZERO;

        while remaining > Decimal::ZERO {
            let Some(slice) = self.queue.pop_front() else {
                break;
            };

            if slice.amount <= remaining {
                remaining -= slice.amount;
                match slice.owner {
                    SliceOwner::Personal => {
                        personal_deducted += slice.amount;
                        self.personal_balance = (self.personal_balance - slice.amount).max(Decimal::ZERO);
                    }
                    SliceOwner::Company => {
                        company_deducted += slice.amount;
                        self.company_balance = (self.company_balance - slice.amount).max(Decimal::ZERO);
                    }
                }
            } else {
                match slice.owner {
                    SliceOwner::Personal => {
                        personal_deducted += remaining;
                        self.personal_balance = (self.personal_balance - remaining).max(Decimal::ZERO);
                    }
                    SliceOwner::Company => {
                        company_deducted += remaining;
                        self.company_balance = (self.company_balance - remaining).max(Decimal::ZERO);
                    }
                }
                self.queue.push_front(DepositSlice {
                    amount: slice.amount - remaining,
                    owner: slice.owner,
                });
                remaining = Decimal::ZERO;
            }
        }

        (self.round(personal_deducted), self.round(company_deducted))
    }

    fn process_redemption(&mut self, amount: Decimal, attribute: &FundAttribute, timestamp: LedgerTimestamp) -> RowOutcome {
        let (prefix, pool_key) = match attribute {
            FundAttribute::Investment { prefix, pool_key } => (prefix.clone(), pool_key.clone()),
            _ => unreachable!("process_redemption only called for investment attributes"),
        };

        match self.pools.redeem(&pool_key, amount) {
            RedemptionOutcome::UnknownRedemption => {
                self.enqueue(amount, SliceOwner::Personal);
                let behavior = format!("{prefix}收入-{pool_key}：个人应收 {amount:.2}（无申购记录）");
                RowOutcome {
                    personal_ratio: Decimal::ONE,
                    company_ratio: Decimal::ZERO,
                    behavior,
                }
            }
            RedemptionOutcome::UninitializedPool => RowOutcome {
                personal_ratio: Decimal::ZERO,
                company_ratio: Decimal::ZERO,
                behavior: format!("错误：投资产品{pool_key}从未有过有效资金池，无法分配收益"),
            },
            RedemptionOutcome::Redeemed {
                personal_return,
                company_return,
                personal_ratio,
                company_ratio,
                realized_gain,
            } => {
                if personal_return > Decimal::ZERO {
                    self.enqueue(personal_return, SliceOwner::Personal);
                }
                if company_return > Decimal::ZERO {
                    self.enqueue(company_return, SliceOwner::Company);
                }

                let (personal_share, company_share) =
                    BehaviorAnalyzer::analyze_profit_split(realized_gain, personal_ratio, company_ratio);
                self.personal_profit_share = self.round(self.personal_profit_share + personal_share);
                self.company_profit_share = self.round(self.company_profit_share + company_share);

                let matched_cost = (amount - realized_gain).max(Decimal::ZERO);
                self.cumulative_returned_company_principal =
                    self.round(self.cumulative_returned_company_principal + matched_cost * company_ratio);
                self.cumulative_returned_personal_principal =
                    self.round(self.cumulative_returned_personal_principal + matched_cost * personal_ratio);

                let pool = self.pools.get(&pool_key).expect("just redeemed");
                let behavior =
                    format!("{prefix}赎回-{pool_key}：个人{personal_return:.2}，公司{company_return:.2}，收益{realized_gain:.2}");
                self.pool_ledger.push(PoolLedgerEntry {
                    timestamp,
                    pool_key: pool_key.clone(),
                    inflow: Decimal::ZERO,
                    outflow: amount,
                    total_balance_after: pool.total_amount,
                    single_tx_ratio: format_ratio(personal_ratio, company_ratio),
                    cumulative_ratio: format_ratio(pool.latest_personal_ratio, pool.latest_company_ratio),
                    behavior: behavior.clone(),
                    cumulative_purchase: pool.cumulative_purchase,
                    cumulative_redemption: pool.cumulative_redemption,
                });

                RowOutcome {
                    personal_ratio,
                    company_ratio,
                    behavior,
                }
            }
        }
    }
}

impl FundTracker for FifoTracker {
    fn initialize(&mut self, opening_balance: Decimal, owner: Owner) {
        if self.initialized || opening_balance <= Decimal::ZERO {
            return;
        }
        match owner {
            Owner::Personal => self.enqueue(opening_balance, SliceOwner::Personal),
            Owner::Company => self.enqueue(opening_balance, SliceOwner::Company),
        }
        self.initialized = true;
    }

    fn process_credit(&mut self, amount: Decimal, attribute: &FundAttribute, timestamp: LedgerTimestamp) -> RowOutcome {
        if amount <= Decimal::ZERO {
            return RowOutcome {
                personal_ratio: Decimal::ZERO,
                company_ratio: Decimal::ZERO,
                behavior: String::new(),
            };
        }

        match attribute {
            FundAttribute::Personal => {
                self.enqueue(amount, SliceOwner::Personal);
                RowOutcome {
                    personal_ratio: Decimal::ONE,
                    company_ratio: Decimal::ZERO,
                    behavior: format!("个人资金流入：{amount:.2}"),
                }
            }
            FundAttribute::Company => {
                self.enqueue(amount, SliceOwner::Company);
                RowOutcome {
                    personal_ratio: Decimal::ZERO,
                    company_ratio: Decimal::ONE,
                    behavior: format!("公司资金流入：{amount:.2}"),
                }
            }
            FundAttribute::Investment { .. } => self.process_redemption(amount, attribute, timestamp),
            FundAttribute::Other => {
                let total = self.personal_balance + self.company_balance;
                if total.is_zero() {
                    log::warn!("资金池为空，收到{amount:.2}，按默认规则处理");
                    let half = self.round(amount / Decimal::from(2));
                    self.enqueue(half, SliceOwner::Personal);
                    self.enqueue(half, SliceOwner::Company);
                    RowOutcome {
                        personal_ratio: Decimal::new(5, 1),
                        company_ratio: Decimal::new(5, 1),
                        behavior: format!("混合资金流入：个人{half:.2}，公司{half:.2}"),
                    }
                } else {
                    let personal_ratio = self.personal_balance / total;
                    let company_ratio = self.company_balance / total;
                    let personal_amount = self.round(amount * personal_ratio);
                    let company_amount = self.round(amount - personal_amount);
                    self.enqueue(personal_amount, SliceOwner::Personal);
                    self.enqueue(company_amount, SliceOwner::Company);
                    RowOutcome {
                        personal_ratio,
                        company_ratio,
                        behavior: format!("混合资金流入：个人{personal_amount:.2}，公司{company_amount:.2}"),
                    }
                }
            }
        }
    }

    fn process_debit(&mut self, amount: Decimal, attribute: &FundAttribute, timestamp: LedgerTimestamp) -> RowOutcome {
        if amount <= Decimal::ZERO {
            return RowOutcome {
                personal_ratio: Decimal::ZERO,
                company_ratio: Decimal::ZERO,
                behavior: String::new(),
            };
        }

        let total = self.personal_balance + self.company_balance;
        if total <= Decimal::ZERO {
            log::warn!("资金池已空，无法支出{amount:.2}");
            return RowOutcome {
                personal_ratio: Decimal::ZERO,
                company_ratio: Decimal::ZERO,
                behavior: format!("资金池已空，无法支出{amount:.2}"),
            };
        }

        let effective = amount.min(total);
        let shortfall = amount - effective;
        self.rebuild_queue_if_desynced();
        let (personal_deducted, company_deducted) = self.drain(effective);

        let (personal_ratio, company_ratio, behavior) = if attribute.is_investment() {
            let (prefix, pool_key) = match attribute {
                FundAttribute::Investment { prefix, pool_key } => (prefix.clone(), pool_key.clone()),
                _ => unreachable!(),
            };

            if company_deducted > Decimal::ZERO {
                self.cumulative_misuse = self.round(self.cumulative_misuse + company_deducted);
            }
            let (label, _) = BehaviorAnalyzer::analyze_investment(personal_deducted, company_deducted);
            let behavior = BehaviorAnalyzer::append_shortfall(label, shortfall);

            let personal_share = if effective > Decimal::ZERO {
                personal_deducted / effective
            } else {
                Decimal::ZERO
            };
            let company_share = if effective > Decimal::ZERO {
                company_deducted / effective
            } else {
                Decimal::ZERO
            };
            self.pools.contribute(&pool_key, effective, personal_share, company_share, timestamp);

            let pool = self.pools.get(&pool_key).expect("just contributed");
            self.pool_ledger.push(PoolLedgerEntry {
                timestamp,
                pool_key: pool_key.clone(),
                inflow: effective,
                outflow: Decimal::ZERO,
                total_balance_after: pool.total_amount,
                single_tx_ratio: format_ratio(personal_share, company_share),
                cumulative_ratio: format_ratio(pool.latest_personal_ratio, pool.latest_company_ratio),
                behavior: format!("{prefix}申购-{pool_key}：{behavior}"),
                cumulative_purchase: pool.cumulative_purchase,
                cumulative_redemption: pool.cumulative_redemption,
            });

            let personal_ratio = if amount > Decimal::ZERO { personal_deducted / amount } else { Decimal::ZERO };
            let company_ratio = if amount > Decimal::ZERO { company_deducted / amount } else { Decimal::ZERO };
            (personal_ratio, company_ratio, behavior)
        } else {
            let outcome = BehaviorAnalyzer::analyze(attribute, personal_deducted, company_deducted, effective);
            if outcome.misuse_accrual > Decimal::ZERO {
                self.cumulative_misuse = self.round(self.cumulative_misuse + outcome.misuse_accrual);
            }
            if outcome.advance_accrual > Decimal::ZERO {
                self.cumulative_advance = self.round(self.cumulative_advance + outcome.advance_accrual);
            }
            let behavior = BehaviorAnalyzer::append_shortfall(outcome.label, shortfall);
            let personal_ratio = if amount > Decimal::ZERO { personal_deducted / amount } else { Decimal::ZERO };
            let company_ratio = if amount > Decimal::ZERO { company_deducted / amount } else { Decimal::ZERO };
            (personal_ratio, company_ratio, behavior)
        };

        RowOutcome {
            personal_ratio,
            company_ratio,
            behavior,
        }
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            personal_balance: self.personal_balance,
            company_balance: self.company_balance,
            cumulative_misuse: self.cumulative_misuse,
            cumulative_advance: self.cumulative_advance,
            cumulative_returned_company_principal: self.cumulative_returned_company_principal,
            cumulative_returned_personal_principal: self.cumulative_returned_personal_principal,
            personal_profit_share: self.personal_profit_share,
            company_profit_share: self.company_profit_share,
        }
    }

    fn pool_manager(&self) -> &InvestmentPoolManager {
        &self.pools
    }

    fn pool_ledger(&self) -> &[PoolLedgerEntry] {
        &self.pool_ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn personal() -> FundAttribute {
        FundAttribute::Personal
    }

    fn company() -> FundAttribute {
        FundAttribute::Company
    }

    #[test]
    fn company_debit_drains_company_slices_first() {
        let mut tracker = FifoTracker::new(2);
        tracker.process_credit(d("100000"), &personal(), ts(0));
        tracker.process_credit(d("200000"), &company(), ts(1));

        let outcome = tracker.process_debit(d("100000"), &company(), ts(2));
        let snapshot = tracker.snapshot();

        assert_eq!(snapshot.company_balance, d("100000"));
        assert_eq!(snapshot.personal_balance, d("100000"));
        assert_eq!(snapshot.cumulative_misuse, Decimal::ZERO);
        assert_eq!(snapshot.cumulative_advance, Decimal::ZERO);
        assert_eq!(outcome.personal_ratio, Decimal::ZERO);
        assert_eq!(outcome.company_ratio, Decimal::ONE);
    }

    #[test]
    fn exact_match_debit_drains_slice_completely_leaving_empty_queue() {
        let mut tracker = FifoTracker::new(2);
        tracker.process_credit(d("500"), &personal(), ts(0));
        tracker.process_debit(d("500"), &personal(), ts(1));
        assert!(tracker.queue.is_empty());
        assert_eq!(tracker.snapshot().personal_balance, Decimal::ZERO);
    }

    #[test]
    fn personal_debit_funded_partly_by_company_is_misuse() {
        let mut tracker = FifoTracker::new(2);
        tracker.process_credit(d("40000"), &personal(), ts(0));
        tracker.process_credit(d("60000"), &company(), ts(1));

        let outcome = tracker.process_debit(d("100000"), &personal(), ts(2));
        let snapshot = tracker.snapshot();

        assert_eq!(snapshot.cumulative_misuse, d("60000"));
        assert_eq!(outcome.behavior, "挪用：60000.00；个人支付：40000.00");
    }

    #[test]
    fn debit_exceeding_balance_reports_funding_gap_and_drains_everything() {
        let mut tracker = FifoTracker::new(2);
        tracker.process_credit(d("100"), &personal(), ts(0));

        let outcome = tracker.process_debit(d("150"), &personal(), ts(1));
        assert!(outcome.behavior.contains("资金缺口：50.00"));
        assert_eq!(tracker.snapshot().personal_balance, Decimal::ZERO);
    }

    #[test]
    fn queue_desync_is_recovered_from_balances() {
        let mut tracker = FifoTracker::new(2);
        tracker.process_credit(d("100"), &personal(), ts(0));
        tracker.queue.clear();

        let outcome = tracker.process_debit(d("40"), &personal(), ts(1));
        assert_eq!(outcome.personal_ratio, Decimal::ONE);
        assert_eq!(tracker.snapshot().personal_balance, d("60"));
    }

    #[test]
    fn investment_redemption_without_contribution_falls_back_to_personal_receivable() {
        let mut tracker = FifoTracker::new(2);
        let attr = FundAttribute::Investment {
            prefix: "理财".to_string(),
            pool_key: "理财-Z".to_string(),
        };
        let outcome = tracker.process_credit(d("500"), &attr, ts(0));
        assert_eq!(outcome.personal_ratio, Decimal::ONE);
        assert!(outcome.behavior.contains("无申购记录"));
        assert_eq!(tracker.snapshot().personal_balance, d("500"));
    }

    #[test]
    fn investment_purchase_then_redemption_splits_profit_by_contribution_ratio() {
        let mut tracker = FifoTracker::new(2);
        let attr = FundAttribute::Investment {
            prefix: "理财".to_string(),
            pool_key: "理财-A".to_string(),
        };
        tracker.process_credit(d("1000000"), &company(), ts(0));
        tracker.process_debit(d("1000000"), &attr, ts(1));

        let before = tracker.snapshot();
        assert_eq!(before.cumulative_misuse, d("1000000"));

        let outcome = tracker.process_credit(d("1100000"), &attr, ts(2));
        let after = tracker.snapshot();

        assert_eq!(outcome.personal_ratio, Decimal::ZERO);
        assert_eq!(outcome.company_ratio, Decimal::ONE);
        assert_eq!(after.company_profit_share, d("100000"));
        assert_eq!(after.company_balance, d("1100000"));
    }

    /// Seed property 3: across a mixed run touching misuse, advance, and an
    /// investment redemption, every cumulative counter is non-decreasing
    /// step to step.
    #[test]
    fn cumulative_counters_never_decrease_across_a_mixed_run() {
        let attr = FundAttribute::Investment {
            prefix: "理财".to_string(),
            pool_key: "理财-A".to_string(),
        };
        let mut tracker = FifoTracker::new(2);
        let steps: Vec<(bool, Decimal, FundAttribute)> = vec![
            (true, d("100000"), personal()),
            (true, d("200000"), company()),
            (false, d("150000"), personal()),
            (false, d("50000"), company()),
            (false, d("100000"), attr.clone()),
            (true, d("120000"), attr),
        ];

        let mut previous = tracker.snapshot();
        for (is_credit, amount, attribute) in steps {
            if is_credit {
                tracker.process_credit(amount, &attribute, ts(0));
            } else {
                tracker.process_debit(amount, &attribute, ts(0));
            }
            let current = tracker.snapshot();
            assert!(current.cumulative_misuse >= previous.cumulative_misuse);
            assert!(current.cumulative_advance >= previous.cumulative_advance);
            assert!(current.cumulative_returned_company_principal >= previous.cumulative_returned_company_principal);
            assert!(current.cumulative_returned_personal_principal >= previous.cumulative_returned_personal_principal);
            assert!(current.personal_profit_share >= previous.personal_profit_share);
            assert!(current.company_profit_share >= previous.company_profit_share);
            previous = current;
        }

        let pool = tracker.pool_manager().get("理财-A").unwrap();
        assert!(pool.cumulative_purchase >= Decimal::ZERO);
        assert!(pool.cumulative_redemption >= Decimal::ZERO);
    }
}
