use rust_decimal::Decimal;
use std::fmt;

/// Which side of the ledger a row moves money on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
    None,
}

/// Decides the effective amount and direction of a row from its raw
/// credit/debit fields.
///
/// Ties (both positive, equal) go to credit, matching the "larger amount
/// rule with credit as primary" tie-break.
pub fn classify_direction(credit: Decimal, debit: Decimal) -> (Decimal, Direction) {
    let credit_positive = credit > Decimal::ZERO;
    let debit_positive = debit > Decimal::ZERO;

    match (credit_positive, debit_positive) {
        (true, false) => (credit, Direction::Credit),
        (false, true) => (debit, Direction::Debit),
        (true, true) => {
            if credit >= debit {
                (credit, Direction::Credit)
            } else {
                (debit, Direction::Debit)
            }
        }
        (false, false) => (Decimal::ZERO, Direction::None),
    }
}

/// The classification of a row's fund-attribute label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundAttribute {
    Personal,
    Company,
    /// `prefix` is the text before the first `-`; `pool_key` is the full
    /// label, used verbatim as the investment pool's identity.
    Investment { prefix: String, pool_key: String },
    Other,
}

impl FundAttribute {
    pub fn is_investment(&self) -> bool {
        matches!(self, FundAttribute::Investment { .. })
    }
}

impl fmt::Display for FundAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundAttribute::Personal => write!(f, "personal"),
            FundAttribute::Company => write!(f, "company"),
            FundAttribute::Investment { pool_key, .. } => write!(f, "investment({pool_key})"),
            FundAttribute::Other => write!(f, "other"),
        }
    }
}

/// Classifies a raw attribute label against the configured keyword sets and
/// investment prefixes. Personal/company keyword matches take priority over
/// the investment-prefix pattern.
pub fn classify_attribute(
    label: &str,
    personal_keywords: &[String],
    company_keywords: &[String],
    investment_prefixes: &[String],
) -> FundAttribute {
    let trimmed = label.trim();

    if personal_keywords.iter().any(|kw| trimmed.contains(kw.as_str())) {
        return FundAttribute::Personal;
    }
    if company_keywords.iter().any(|kw| trimmed.contains(kw.as_str())) {
        return FundAttribute::Company;
    }
    if let Some(prefix) = investment_prefix(trimmed, investment_prefixes) {
        return FundAttribute::Investment {
            prefix,
            pool_key: trimmed.to_string(),
        };
    }
    FundAttribute::Other
}

fn investment_prefix(label: &str, investment_prefixes: &[String]) -> Option<String> {
    let prefix = label.split('-').next()?;
    if investment_prefixes.iter().any(|p| p == prefix) {
        Some(prefix.to_string())
    } else {
        None
    }
}
