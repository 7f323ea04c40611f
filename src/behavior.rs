use audit_types::FundAttribute;
use rust_decimal::Decimal;

/// Builds the free-text, multi-clause behavior label for a debit and
/// decides how much of it counts as misuse or advancement.
///
/// Stateless by design: the caller (a tracker) owns the cumulative
/// `misuse`/`advance` counters and accrues the amounts this function
/// reports, rather than the analyzer mutating shared state itself.
pub struct BehaviorAnalyzer;

/// The clauses and accruals produced by analyzing one debit.
pub struct BehaviorOutcome {
    pub label: String,
    pub misuse_accrual: Decimal,
    pub advance_accrual: Decimal,
}

impl BehaviorAnalyzer {
    /// Analyzes a non-investment debit split between personal and company
    /// funding sources.
    pub fn analyze(
        attribute: &FundAttribute,
        personal_deducted: Decimal,
        company_deducted: Decimal,
        total_amount: Decimal,
    ) -> BehaviorOutcome {
        if total_amount <= Decimal::ZERO {
            return BehaviorOutcome {
                label: "无交易".to_string(),
                misuse_accrual: Decimal::ZERO,
                advance_accrual: Decimal::ZERO,
            };
        }

        let mut clauses = Vec::new();
        let mut misuse_accrual = Decimal::ZERO;
        let mut advance_accrual = Decimal::ZERO;

        match attribute {
            FundAttribute::Personal => {
                if company_deducted > Decimal::ZERO {
                    misuse_accrual = company_deducted;
                    clauses.push(format!("挪用：{company_deducted:.2}"));
                }
                if personal_deducted > Decimal::ZERO {
                    clauses.push(format!("个人支付：{personal_deducted:.2}"));
                }
            }
            FundAttribute::Company => {
                if personal_deducted > Decimal::ZERO {
                    advance_accrual = personal_deducted;
                    clauses.push(format!("垫付：{personal_deducted:.2}"));
                }
                if company_deducted > Decimal::ZERO {
                    clauses.push(format!("公司支付：{company_deducted:.2}"));
                }
            }
            FundAttribute::Investment { .. } | FundAttribute::Other => {
                if personal_deducted > Decimal::ZERO {
                    clauses.push(format!("个人支付：{personal_deducted:.2}"));
                }
                if company_deducted > Decimal::ZERO {
                    clauses.push(format!("公司支付：{company_deducted:.2}"));
                }
            }
        }

        let label = if clauses.is_empty() {
            "无明确行为".to_string()
        } else {
            clauses.join("；")
        };

        BehaviorOutcome {
            label,
            misuse_accrual,
            advance_accrual,
        }
    }

    /// Analyzes an investment debit: investing is a personal act, so any
    /// company-funded portion is misuse by construction.
    pub fn analyze_investment(personal_deducted: Decimal, company_deducted: Decimal) -> (String, Decimal) {
        let mut clauses = Vec::new();
        let mut misuse_accrual = Decimal::ZERO;

        if company_deducted > Decimal::ZERO {
            misuse_accrual = company_deducted;
            clauses.push(format!("投资挪用：{company_deducted:.2}"));
        }
        if personal_deducted > Decimal::ZERO {
            clauses.push(format!("个人投资：{personal_deducted:.2}"));
        }

        let label = if clauses.is_empty() {
            "无投资".to_string()
        } else {
            clauses.join("；")
        };

        (label, misuse_accrual)
    }

    /// Appends a "资金缺口：Z" clause when a debit couldn't be fully funded.
    /// A no-op when `shortfall` is not positive.
    pub fn append_shortfall(label: String, shortfall: Decimal) -> String {
        if shortfall > Decimal::ZERO {
            format!("{label}；资金缺口：{shortfall:.2}")
        } else {
            label
        }
    }

    /// Splits a realized gain between personal and company shares by ratio.
    pub fn analyze_profit_split(
        gain: Decimal,
        personal_ratio: Decimal,
        company_ratio: Decimal,
    ) -> (Decimal, Decimal) {
        if gain <= Decimal::ZERO {
            return (Decimal::ZERO, Decimal::ZERO);
        }
        (gain * personal_ratio, gain * company_ratio)
    }
}
