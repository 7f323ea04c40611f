use audit_types::{round_to, LedgerTimestamp};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One chronological entry in a pool's ledger, emitted whenever a
/// contribution or redemption touches it.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolLedgerEntry {
    pub timestamp: LedgerTimestamp,
    pub pool_key: String,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub total_balance_after: Decimal,
    /// This transaction's own personal/company split, e.g. "个人20.00%，公司80.00%".
    pub single_tx_ratio: String,
    /// The pool's ownership ratio after this transaction.
    pub cumulative_ratio: String,
    pub behavior: String,
    pub cumulative_purchase: Decimal,
    pub cumulative_redemption: Decimal,
}

/// A pool's lifetime summary: totals plus realized profit across both the
/// closed-out history and whatever gain the current cycle has accrued.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSummary {
    pub pool_key: String,
    pub total_inflow: Decimal,
    pub total_outflow: Decimal,
    pub final_balance: Decimal,
    pub realized_profit: Decimal,
}

/// Renders a personal/company ratio pair as a fund-split label, e.g.
/// "个人20.00%，公司80.00%".
pub fn format_ratio(personal_ratio: Decimal, company_ratio: Decimal) -> String {
    let hundred = Decimal::from(100);
    format!(
        "个人{:.2}%，公司{:.2}%",
        personal_ratio * hundred,
        company_ratio * hundred
    )
}

/// Per-pool bookkeeping for a single investment product.
///
/// `total_amount` can go negative when a redemption realizes more than the
/// pool's remaining cost basis — that negative balance represents realized
/// gain not yet folded into a new contribution (see [`InvestmentPool`]'s
/// reset-on-negative transition in [`InvestmentPoolManager::contribute`]).
#[derive(Debug, Clone)]
pub struct InvestmentPool {
    pub personal_amount: Decimal,
    pub company_amount: Decimal,
    pub total_amount: Decimal,
    pub cumulative_purchase: Decimal,
    pub cumulative_redemption: Decimal,
    pub latest_personal_ratio: Decimal,
    pub latest_company_ratio: Decimal,
    pub realized_profit_history: Vec<(LedgerTimestamp, Decimal)>,
    pub cumulative_realized_profit: Decimal,
}

impl InvestmentPool {
    fn new() -> Self {
        Self {
            personal_amount: Decimal::ZERO,
            company_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            cumulative_purchase: Decimal::ZERO,
            cumulative_redemption: Decimal::ZERO,
            latest_personal_ratio: Decimal::ZERO,
            latest_company_ratio: Decimal::ZERO,
            realized_profit_history: Vec::new(),
            cumulative_realized_profit: Decimal::ZERO,
        }
    }
}

/// The outcome of a redemption request, including the two recoverable
/// failure modes a redemption can hit. Neither failure mutates pool state
/// or crosses the pipeline's fallible boundary — the caller (a tracker)
/// decides how to fall back.
pub enum RedemptionOutcome {
    Redeemed {
        personal_return: Decimal,
        company_return: Decimal,
        personal_ratio: Decimal,
        company_ratio: Decimal,
        realized_gain: Decimal,
    },
    UnknownRedemption,
    UninitializedPool,
}

/// Owns every investment pool's state, keyed by the full attribute label.
/// Iteration order follows first-contribution (insertion) order, matching
/// the deterministic pool-ledger output the pipeline emits.
pub struct InvestmentPoolManager {
    pools: HashMap<String, InvestmentPool>,
    insertion_order: Vec<String>,
    precision: u32,
}

impl InvestmentPoolManager {
    pub fn new(precision: u32) -> Self {
        Self {
            pools: HashMap::new(),
            insertion_order: Vec::new(),
            precision,
        }
    }

    pub fn get(&self, pool_key: &str) -> Option<&InvestmentPool> {
        self.pools.get(pool_key)
    }

    /// Pools in first-contribution order, for deterministic ledger output.
    pub fn pools_in_order(&self) -> impl Iterator<Item = (&str, &InvestmentPool)> {
        self.insertion_order
            .iter()
            .map(move |key| (key.as_str(), self.pools.get(key).expect("insertion_order tracks live keys")))
    }

    /// Summarizes one pool's lifetime activity: realized profit combines the
    /// history recorded at prior resets with whatever gain the current
    /// cycle has accrued (a negative `total_amount` that hasn't yet been
    /// folded into a new contribution).
    pub fn summary(&self, pool_key: &str) -> Option<PoolSummary> {
        let pool = self.pools.get(pool_key)?;
        let current_cycle_profit = if pool.total_amount < Decimal::ZERO {
            pool.total_amount.abs()
        } else {
            Decimal::ZERO
        };
        Some(PoolSummary {
            pool_key: pool_key.to_string(),
            total_inflow: pool.cumulative_purchase,
            total_outflow: pool.cumulative_redemption,
            final_balance: pool.total_amount,
            realized_profit: round_to(pool.cumulative_realized_profit + current_cycle_profit, self.precision),
        })
    }

    /// Summaries for every pool, in first-contribution order.
    pub fn summaries(&self) -> Vec<PoolSummary> {
        self.insertion_order
            .iter()
            .map(|key| self.summary(key).expect("insertion_order tracks live keys"))
            .collect()
    }

    fn get_or_create(&mut self, pool_key: &str) -> &mut InvestmentPool {
        if !self.pools.contains_key(pool_key) {
            self.pools.insert(pool_key.to_string(), InvestmentPool::new());
            self.insertion_order.push(pool_key.to_string());
        }
        self.pools.get_mut(pool_key).expect("just inserted")
    }

    /// Records a contribution, resetting the pool first if it is currently
    /// negative (a prior cycle's unfolded realized gain).
    pub fn contribute(
        &mut self,
        pool_key: &str,
        amount: Decimal,
        personal_share: Decimal,
        company_share: Decimal,
        timestamp: LedgerTimestamp,
    ) {
        let precision = self.precision;
        let pool = self.get_or_create(pool_key);

        if pool.total_amount < Decimal::ZERO {
            let realized = pool.total_amount.abs();
            pool.realized_profit_history.push((timestamp, round_to(realized, precision)));
            pool.cumulative_realized_profit = round_to(pool.cumulative_realized_profit + realized, precision);
            pool.personal_amount = Decimal::ZERO;
            pool.company_amount = Decimal::ZERO;
            pool.total_amount = Decimal::ZERO;
        }

        pool.personal_amount = round_to(pool.personal_amount + amount * personal_share, precision);
        pool.company_amount = round_to(pool.company_amount + amount * company_share, precision);
        pool.total_amount = round_to(pool.total_amount + amount, precision);
        pool.cumulative_purchase = round_to(pool.cumulative_purchase + amount, precision);

        if pool.total_amount > Decimal::ZERO {
            pool.latest_personal_ratio = pool.personal_amount / pool.total_amount;
            pool.latest_company_ratio = pool.company_amount / pool.total_amount;
        }
    }

    /// Allocates a redemption by the pool's latest recorded ratios. The
    /// ratios used for the split never change mid-redemption, even though
    /// step 4/5 below may recompute them afterwards for the *next*
    /// redemption to see.
    pub fn redeem(&mut self, pool_key: &str, amount: Decimal) -> RedemptionOutcome {
        let precision = self.precision;
        let pool = match self.pools.get_mut(pool_key) {
            Some(pool) => pool,
            None => return RedemptionOutcome::UnknownRedemption,
        };

        if pool.latest_personal_ratio.is_zero() && pool.latest_company_ratio.is_zero() {
            return RedemptionOutcome::UninitializedPool;
        }

        let personal_ratio = pool.latest_personal_ratio;
        let company_ratio = pool.latest_company_ratio;
        let personal_return = round_to(amount * personal_ratio, precision);
        let company_return = round_to(amount * company_ratio, precision);

        let realized_gain;
        if pool.total_amount > Decimal::ZERO {
            let matched_cost = amount.min(pool.total_amount);
            let redeem_ratio = (amount / pool.total_amount).min(Decimal::ONE);

            pool.personal_amount = round_to(pool.personal_amount - pool.personal_amount * redeem_ratio, precision);
            pool.company_amount = round_to(pool.company_amount - pool.company_amount * redeem_ratio, precision);
            pool.total_amount = round_to(pool.total_amount - matched_cost, precision);
            realized_gain = round_to((amount - matched_cost).max(Decimal::ZERO), precision);

            if pool.total_amount > Decimal::ZERO {
                pool.latest_personal_ratio = pool.personal_amount / pool.total_amount;
                pool.latest_company_ratio = pool.company_amount / pool.total_amount;
            }
        } else {
            pool.personal_amount = round_to(pool.personal_amount - personal_return, precision);
            pool.company_amount = round_to(pool.company_amount - company_return, precision);
            pool.total_amount = round_to(pool.total_amount - amount, precision);
            realized_gain = amount;
        }

        pool.cumulative_redemption = round_to(pool.cumulative_redemption + amount, precision);

        RedemptionOutcome::Redeemed {
            personal_return,
            company_return,
            personal_ratio,
            company_ratio,
            realized_gain,
        }
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

    fn ts() -> LedgerTimestamp {
        LedgerTimestamp::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn redemption_on_unknown_pool_is_reported_not_panicked() {
        let mut manager = InvestmentPoolManager::new(2);
        assert!(matches!(manager.redeem("理财-A", d("100")), RedemptionOutcome::UnknownRedemption));
    }

    #[test]
    fn investment_gain_cycle_and_reset_on_negative() {
        let mut manager = InvestmentPoolManager::new(2);
        manager.contribute("理财-A", d("1000000"), d("0.2"), d("0.8"), ts());

        let outcome = manager.redeem("理财-A", d("1100000"));
        let (personal_return, company_return, gain) = match outcome {
            RedemptionOutcome::Redeemed {
                personal_return,
                company_return,
                realized_gain,
                ..
            } => (personal_return, company_return, realized_gain),
            _ => panic!("expected a redemption"),
        };
        assert_eq!(personal_return, d("220000"));
        assert_eq!(company_return, d("880000"));
        assert_eq!(gain, d("100000"));

        let pool = manager.get("理财-A").unwrap();
        assert_eq!(pool.total_amount, d("-100000"));
        assert!(pool.realized_profit_history.is_empty());
        assert_eq!(pool.cumulative_realized_profit, Decimal::ZERO);

        manager.contribute("理财-A", d("1000000"), d("0.3"), d("0.7"), ts());
        let pool = manager.get("理财-A").unwrap();
        assert_eq!(pool.realized_profit_history.len(), 1);
        assert_eq!(pool.realized_profit_history[0].1, d("100000"));
        assert_eq!(pool.cumulative_realized_profit, d("100000"));
        assert_eq!(pool.total_amount, d("1000000"));
        assert_eq!(pool.latest_personal_ratio, d("0.3"));
        assert_eq!(pool.latest_company_ratio, d("0.7"));
    }

    #[test]
    fn redemption_exceeding_total_caps_pool_at_zero() {
        let mut manager = InvestmentPoolManager::new(2);
        manager.contribute("投资-B", d("500000"), d("1"), Decimal::ZERO, ts());
        manager.redeem("投资-B", d("600000"));
        let pool = manager.get("投资-B").unwrap();
        assert_eq!(pool.total_amount, Decimal::ZERO);
    }

    #[test]
    fn pools_iterate_in_first_contribution_order() {
        let mut manager = InvestmentPoolManager::new(2);
        manager.contribute("理财-B", d("1"), Decimal::ONE, Decimal::ZERO, ts());
        manager.contribute("理财-A", d("1"), Decimal::ONE, Decimal::ZERO, ts());
        let keys: Vec<&str> = manager.pools_in_order().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["理财-B", "理财-A"]);
    }

    #[test]
    fn summary_folds_current_cycle_gain_into_realized_profit() {
        let mut manager = InvestmentPoolManager::new(2);
        manager.contribute("理财-A", d("1000000"), d("0.2"), d("0.8"), ts());
        manager.redeem("理财-A", d("1100000"));

        let summary = manager.summary("理财-A").unwrap();
        assert_eq!(summary.total_inflow, d("1000000"));
        assert_eq!(summary.total_outflow, d("1100000"));
        assert_eq!(summary.final_balance, d("-100000"));
        assert_eq!(summary.realized_profit, d("100000"));
    }

    #[test]
    fn format_ratio_renders_personal_and_company_percentages() {
        assert_eq!(format_ratio(d("0.2"), d("0.8")), "个人20.00%，公司80.00%");
    }
}
