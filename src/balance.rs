//! Balance-Method fund tracker (C5): two running scalars with no deposit
//! history, deducted by ownership priority instead of arrival order.
//!
//! A personal-class debit draws down the personal balance first and only
//! spills into the company balance once the personal balance is exhausted
//! (and vice versa for a company-class debit). This is a deliberately
//! disjoint alternative to the FIFO tracker's arrival-order consumption, not
//! a refinement of it — see [`crate::fifo::FifoTracker`].

use crate::behavior::BehaviorAnalyzer;
use crate::config::Owner;
use crate::pool::{format_ratio, InvestmentPoolManager, PoolLedgerEntry, RedemptionOutcome};
use crate::tracker::{FundTracker, RowOutcome, TrackerSnapshot};
use audit_types::{round_to, FundAttribute, LedgerTimestamp};
use rust_decimal::Decimal;

/// The Balance-Method fund tracker.
pub struct BalanceTracker {
    personal_balance: Decimal,
    company_balance: Decimal,
    initialized: bool,
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

impl BalanceTracker {
    pub fn new(precision: u32) -> Self {
        Self {
            personal_balance: Decimal::ZERO,
            company_balance: Decimal::ZERO,
            initialized: false,
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

    fn credit_personal(&mut self, amount: Decimal) {
        self.personal_balance = self.round(self.personal_balance + amount);
    }

    fn credit_company(&mut self, amount: Decimal) {
        self.company_balance = self.round(self.company_balance + amount);
    }

    /// Deducts `effective` from the two balances, preferring `primary`'s
    /// balance before spilling into the other one. Returns the actual
    /// (personal, company) amounts deducted.
    fn drain_priority(&mut self, effective: Decimal, primary: Owner) -> (Decimal, Decimal) {
        let (primary_balance, secondary_balance) = match primary {
            Owner::Personal => (self.personal_balance, self.company_balance),
            Owner::Company => (self.company_balance, self.personal_balance),
        };

        let from_primary = effective.min(primary_balance).max(Decimal::ZERO);
        let from_secondary = (effective - from_primary).min(secondary_balance).max(Decimal::ZERO);

        match primary {
            Owner::Personal => {
                self.personal_balance = self.round((self.personal_balance - from_primary).max(Decimal::ZERO));
                self.company_balance = self.round((self.company_balance - from_secondary).max(Decimal::ZERO));
                (self.round(from_primary), self.round(from_secondary))
            }
            Owner::Company => {
                self.company_balance = self.round((self.company_balance - from_primary).max(Decimal::ZERO));
                self.personal_balance = self.round((self.personal_balance - from_secondary).max(Decimal::ZERO));
                (self.round(from_secondary), self.round(from_primary))
            }
        }
    }

    fn process_redemption(&mut self, amount: Decimal, attribute: &FundAttribute, timestamp: LedgerTimestamp) -> RowOutcome {
        let (prefix, pool_key) = match attribute {
            FundAttribute::Investment { prefix, pool_key } => (prefix.clone(), pool_key.clone()),
            _ => unreachable!("process_redemption only called for investment attributes"),
        };

        match self.pools.redeem(&pool_key, amount) {
            RedemptionOutcome::UnknownRedemption => {
                self.credit_personal(amount);
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
                self.credit_personal(personal_return);
                self.credit_company(company_return);

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

impl FundTracker for BalanceTracker {
    fn initialize(&mut self, opening_balance: Decimal, owner: Owner) {
        if self.initialized || opening_balance <= Decimal::ZERO {
            return;
        }
        match owner {
            Owner::Personal => self.credit_personal(opening_balance),
            Owner::Company => self.credit_company(opening_balance),
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
                self.credit_personal(amount);
                RowOutcome {
                    personal_ratio: Decimal::ONE,
                    company_ratio: Decimal::ZERO,
                    behavior: format!("个人资金流入：{amount:.2}"),
                }
            }
            FundAttribute::Company => {
                self.credit_company(amount);
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
                    self.credit_personal(half);
                    self.credit_company(half);
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
                    self.credit_personal(personal_amount);
                    self.credit_company(company_amount);
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

        // Investment debits draw personal funds first: investing is a
        // personal act that only becomes misuse when it overruns the
        // personal balance. Every other class prioritizes its own-owner
        // balance, spilling into the other owner only on shortfall.
        let primary = match attribute {
            FundAttribute::Company => Owner::Company,
            FundAttribute::Personal | FundAttribute::Investment { .. } | FundAttribute::Other => Owner::Personal,
        };
        let (personal_deducted, company_deducted) = self.drain_priority(effective, primary);

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
