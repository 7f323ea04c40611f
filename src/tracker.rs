use crate::config::Owner;
use crate::pool::{InvestmentPoolManager, PoolLedgerEntry};
use audit_types::{FundAttribute, LedgerTimestamp};
use rust_decimal::Decimal;

/// The ratios and behavior label produced by feeding one row to a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub personal_ratio: Decimal,
    pub company_ratio: Decimal,
    pub behavior: String,
}

/// A snapshot of tracker-owned aggregate counters after processing a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSnapshot {
    pub personal_balance: Decimal,
    pub company_balance: Decimal,
    pub cumulative_misuse: Decimal,
    pub cumulative_advance: Decimal,
    pub cumulative_returned_company_principal: Decimal,
    pub cumulative_returned_personal_principal: Decimal,
    pub personal_profit_share: Decimal,
    pub company_profit_share: Decimal,
}

impl TrackerSnapshot {
    pub fn total_balance(&self) -> Decimal {
        self.personal_balance + self.company_balance
    }

    pub fn funding_gap(&self) -> Decimal {
        self.cumulative_misuse - self.cumulative_returned_company_principal - self.cumulative_advance
    }
}

/// The interface shared by the two fund-tracker variants (FIFO and
/// Balance-Method). The variants' state is disjoint — this trait plus the
/// [`crate::pipeline::TrackerAlgorithm`] selector is the dispatch mechanism,
/// not a class hierarchy.
pub trait FundTracker {
    /// Seeds the opening balance once, before any row is processed. A
    /// no-op if already initialized or if `opening_balance` is not
    /// positive.
    fn initialize(&mut self, opening_balance: Decimal, owner: Owner);

    fn process_credit(&mut self, amount: Decimal, attribute: &FundAttribute, timestamp: LedgerTimestamp) -> RowOutcome;

    fn process_debit(&mut self, amount: Decimal, attribute: &FundAttribute, timestamp: LedgerTimestamp) -> RowOutcome;

    fn snapshot(&self) -> TrackerSnapshot;

    fn pool_manager(&self) -> &InvestmentPoolManager;

    /// Every pool-ledger entry recorded so far, in the order processed.
    fn pool_ledger(&self) -> &[PoolLedgerEntry];
}
