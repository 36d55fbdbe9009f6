use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FinbotError, Result};

/// The kind of account an export came from. Part of the identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Checking,
    CreditCard,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "Checking",
            Self::CreditCard => "CreditCard",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = FinbotError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().replace([' ', '_'], "").as_str() {
            "checking" => Ok(Self::Checking),
            "creditcard" | "cashrewards" | "credit" => Ok(Self::CreditCard),
            _ => Err(FinbotError::Other(format!("Unknown source type: {raw}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    /// Category label. Empty means untagged.
    pub tags: String,
    pub notes: String,
    pub source_type: SourceType,
    pub check_number: Option<String>,
}

impl TransactionRecord {
    pub fn new(
        date: NaiveDate,
        description: &str,
        amount: Decimal,
        source_type: SourceType,
        check_number: Option<String>,
    ) -> Self {
        Self {
            date,
            description: description.trim().to_string(),
            amount: round_amount(amount),
            tags: String::new(),
            notes: String::new(),
            source_type,
            check_number,
        }
    }

    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            date: self.date,
            description: self.description.clone(),
            amount: round_amount(self.amount),
            source_type: self.source_type,
            check_number: self.check_number.clone(),
        }
    }

    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }
}

/// Two records with the same key are the same real-world transaction,
/// whatever their tags or notes say.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub source_type: SourceType,
    pub check_number: Option<String>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} | {} | {}",
            self.date,
            self.description,
            format_amount(self.amount),
            self.source_type,
            self.check_number.as_deref().unwrap_or("")
        )
    }
}

pub fn round_amount(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded
}

/// Ledger representation: always exactly two decimals.
pub fn format_amount(amount: Decimal) -> String {
    round_amount(amount).to_string()
}

/// `""`, `-1`, `-1.0` and `nan` all mean "no check number". Float
/// renderings like `1234.0` collapse to `1234`.
pub fn normalize_check_number(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }
    let s = s.strip_suffix(".0").unwrap_or(s);
    let s = s.strip_suffix(".00").unwrap_or(s);
    if s == "-1" {
        return None;
    }
    Some(s.to_string())
}
