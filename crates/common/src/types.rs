use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Address tokens that mark a missing or non-spendable counterparty.
pub const SENTINEL_ADDRESSES: [&str; 3] = ["UNKNOWN", "COINBASE", "OP_RETURN"];

/// True when `addr` names a real counterparty rather than a placeholder.
pub fn is_real_address(addr: &str) -> bool {
    !addr.is_empty() && !SENTINEL_ADDRESSES.contains(&addr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Presentation band for a continuous risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Severe,
    Elevated,
    Moderate,
    Minimal,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Severe
        } else if score >= 0.5 {
            Self::Elevated
        } else if score >= 0.2 {
            Self::Moderate
        } else {
            Self::Minimal
        }
    }
}

/// Numeric ledger columns that take part in correlation analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericField {
    Value,
    Fee,
    Size,
    Vsize,
    Weight,
}

impl NumericField {
    pub const ALL: [Self; 5] = [
        Self::Value,
        Self::Fee,
        Self::Size,
        Self::Vsize,
        Self::Weight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Fee => "fee",
            Self::Size => "size",
            Self::Vsize => "vsize",
            Self::Weight => "weight",
        }
    }
}

impl fmt::Display for NumericField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Precomputed boolean columns of a ledger row. Only the literal token `"1"` is true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskFlags {
    pub high_risk: bool,
    pub medium_risk: bool,
    pub low_risk: bool,
    pub high_value_tx: bool,
    pub repeat_receiver_tx: bool,
    pub high_out_degree: bool,
    pub low_entropy_hash: bool,
    pub duplicate_tx_flag: bool,
}

impl RiskFlags {
    pub fn any_standard(&self) -> bool {
        self.high_risk || self.medium_risk || self.low_risk
    }
}

/// A column that was present in the row but could not be coerced to its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub column: String,
    pub raw: String,
}

/// One typed ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    /// Position of the row in the source ledger (0-based, data rows only).
    pub index: usize,
    pub tx_id: Option<String>,
    pub tx_hash: Option<String>,
    pub sender_address: Option<String>,
    pub receiver_address: Option<String>,
    pub value: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub size: Option<u64>,
    pub vsize: Option<u64>,
    pub weight: Option<u64>,
    pub flags: RiskFlags,
    /// Numeric reading of the `High_Risk` column; some exports carry a probability there.
    pub high_risk_score: f64,
    pub fraud_probability: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub script_pubkey_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldIssue>,
}

impl TransactionRecord {
    pub fn value_or_zero(&self) -> Decimal {
        self.value.unwrap_or(Decimal::ZERO)
    }

    /// Display identifier: `tx_id`, falling back to `tx_hash`.
    pub fn display_id(&self) -> &str {
        self.tx_id
            .as_deref()
            .or(self.tx_hash.as_deref())
            .unwrap_or("unknown")
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender_address
            .as_deref()
            .filter(|a| is_real_address(a))
    }

    pub fn receiver(&self) -> Option<&str> {
        self.receiver_address
            .as_deref()
            .filter(|a| is_real_address(a))
    }

    pub fn touches(&self, address: &str) -> bool {
        self.sender_address.as_deref() == Some(address)
            || self.receiver_address.as_deref() == Some(address)
    }

    /// Numeric value of a correlation field, `None` when absent or unparseable.
    pub fn numeric(&self, field: NumericField) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        match field {
            NumericField::Value => self.value.and_then(|d| d.to_f64()),
            NumericField::Fee => self.fee.and_then(|d| d.to_f64()),
            NumericField::Size => self.size.map(|v| v as f64),
            NumericField::Vsize => self.vsize.map(|v| v as f64),
            NumericField::Weight => self.weight.map(|v| v as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressTag {
    pub name: &'static str,
    pub category: &'static str,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Exchange,
    Merchant,
    Unknown,
}

impl EntityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::Merchant => "merchant",
            Self::Unknown => "unknown",
        }
    }
}

/// Heuristic guess at who controls an address, derived from flag columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityHint {
    pub name: &'static str,
    pub category: EntityCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}
