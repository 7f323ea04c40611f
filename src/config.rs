use crate::error::AuditError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Ownership class assigned to a derived opening balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    Personal,
    Company,
}

/// Immutable run-time parameters for the audit pipeline: balance tolerance,
/// decimal precision, the keyword/prefix sets used for classification, and
/// the opening-balance owner. Construct with [`AuditConfig::default`] or
/// [`AuditConfig::from_toml_str`] to override a subset of fields while
/// keeping the rest at their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub balance_tolerance: Decimal,
    /// Threshold below which a rounding residue is snapped to exact zero
    /// (see [`audit_types::snap_to_zero`]). Distinct from `balance_tolerance`:
    /// this guards against floating-point-style residue, that guards the
    /// ledger-equation comparison in [`crate::validation::validate`].
    pub epsilon: Decimal,
    pub precision: u32,
    pub personal_keywords: Vec<String>,
    pub company_keywords: Vec<String>,
    pub investment_prefixes: Vec<String>,
    pub opening_balance_owner: Owner,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: Decimal::from_str("0.01").expect("literal parses"),
            epsilon: Decimal::from_str("0.00000001").expect("literal parses"),
            precision: 2,
            personal_keywords: vec!["个人".into(), "个人应收".into(), "个人应付".into()],
            company_keywords: vec!["公司".into(), "公司应收".into(), "公司应付".into()],
            investment_prefixes: vec![
                "理财".into(),
                "投资".into(),
                "保险".into(),
                "关联银行卡".into(),
                "资金池".into(),
            ],
            opening_balance_owner: Owner::Company,
        }
    }
}

impl AuditConfig {
    /// Parses a TOML document, overriding only the fields it mentions; every
    /// other field keeps its default value.
    pub fn from_toml_str(source: &str) -> Result<Self, AuditError> {
        toml::from_str(source).map_err(|err| AuditError::InvalidConfig {
            reason: err.to_string(),
        })
    }
}
