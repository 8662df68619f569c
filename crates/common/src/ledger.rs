//! Flat CSV ledger ingestion.
//!
//! Parsing happens in two steps: [`parse_csv`] splits raw text into string rows keyed
//! by header, then [`TransactionRecord::from_row`] performs the one typed coercion.
//! Neither step fails; malformed input yields absent fields and [`FieldIssue`]s.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{FieldIssue, RiskFlags, TransactionRecord};

pub mod columns {
    pub const TX_ID: &str = "tx_id";
    pub const TX_HASH: &str = "tx_hash";
    pub const SENDER: &str = "sender_address";
    pub const RECEIVER: &str = "receiver_address";
    pub const VALUE: &str = "value";
    pub const FEE: &str = "fee";
    pub const SIZE: &str = "size";
    pub const VSIZE: &str = "vsize";
    pub const WEIGHT: &str = "weight";
    pub const TIMESTAMP: &str = "timestamp";
    pub const SCRIPT_TYPE: &str = "scriptPubKey_type";
    pub const HIGH_VALUE_TX: &str = "high_value_tx";
    pub const REPEAT_RECEIVER_TX: &str = "repeat_receiver_tx";
    pub const HIGH_OUT_DEGREE: &str = "high_out_degree";
    pub const LOW_ENTROPY_HASH: &str = "low_entropy_hash";
    pub const DUPLICATE_TX_FLAG: &str = "duplicate_tx_flag";
    pub const LOW_RISK: &str = "Low_Risk";
    pub const MEDIUM_RISK: &str = "Medium_Risk";
    pub const HIGH_RISK: &str = "High_Risk";
    pub const FRAUD_PROBABILITY: &str = "fraud_probability";
}

/// One data line of the CSV, keyed by header token. No type coercion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRow {
    fields: HashMap<String, String>,
}

impl LedgerRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LedgerRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Split newline-delimited, comma-separated text into header-keyed rows.
///
/// Blank lines are skipped. A short line leaves its trailing headers absent; extra
/// values beyond the header count are dropped. Quoted fields are not supported.
pub fn parse_csv(text: &str) -> Vec<LedgerRow> {
    let mut lines = text.split('\n');
    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<&str> = header_line.split(',').map(str::trim).collect();

    lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            headers
                .iter()
                .zip(line.split(','))
                .map(|(h, v)| (*h, v.trim()))
                .collect()
        })
        .collect()
}

fn non_empty<'a>(row: &'a LedgerRow, column: &str) -> Option<&'a str> {
    row.get(column).filter(|v| !v.is_empty())
}

fn flag(row: &LedgerRow, column: &str) -> bool {
    row.get(column) == Some("1")
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn parse_count(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().or_else(|| {
        let f = raw.parse::<f64>().ok()?;
        (f.is_finite() && f >= 0.0 && f.fract() == 0.0).then_some(f as u64)
    })
}

fn parse_unix_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let secs = match raw.parse::<i64>() {
        Ok(secs) => secs,
        Err(_) => {
            let f = raw.parse::<f64>().ok().filter(|f| f.is_finite())?;
            f.floor() as i64
        }
    };
    DateTime::from_timestamp(secs, 0)
}

fn parse_probability(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Coerces one column, recording an issue when the value is present but unusable.
struct Coercer<'a> {
    row: &'a LedgerRow,
    issues: Vec<FieldIssue>,
}

impl Coercer<'_> {
    fn field<T>(&mut self, column: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = non_empty(self.row, column)?;
        let parsed = parse(raw);
        if parsed.is_none() {
            self.issues.push(FieldIssue {
                column: column.to_string(),
                raw: raw.to_string(),
            });
        }
        parsed
    }

    fn text(&self, column: &str) -> Option<String> {
        non_empty(self.row, column).map(str::to_string)
    }
}

impl TransactionRecord {
    /// Typed view of a parsed row. Never fails: unusable values become `None` and
    /// are listed in `issues`.
    pub fn from_row(index: usize, row: &LedgerRow) -> Self {
        use columns::*;

        let non_negative = |raw: &str| parse_decimal(raw).filter(|d| !d.is_sign_negative());

        let mut c = Coercer {
            row,
            issues: Vec::new(),
        };
        let value = c.field(VALUE, non_negative);
        let fee = c.field(FEE, non_negative);
        let size = c.field(SIZE, parse_count);
        let vsize = c.field(VSIZE, parse_count);
        let weight = c.field(WEIGHT, parse_count);
        let high_risk_score = c.field(HIGH_RISK, parse_probability).unwrap_or(0.0);
        let fraud_probability = c.field(FRAUD_PROBABILITY, parse_probability);
        let timestamp = c.field(TIMESTAMP, parse_unix_seconds);

        let flags = RiskFlags {
            high_risk: flag(row, HIGH_RISK),
            medium_risk: flag(row, MEDIUM_RISK),
            low_risk: flag(row, LOW_RISK),
            high_value_tx: flag(row, HIGH_VALUE_TX),
            repeat_receiver_tx: flag(row, REPEAT_RECEIVER_TX),
            high_out_degree: flag(row, HIGH_OUT_DEGREE),
            low_entropy_hash: flag(row, LOW_ENTROPY_HASH),
            duplicate_tx_flag: flag(row, DUPLICATE_TX_FLAG),
        };

        Self {
            index,
            tx_id: c.text(TX_ID),
            tx_hash: c.text(TX_HASH),
            sender_address: c.text(SENDER),
            receiver_address: c.text(RECEIVER),
            value,
            fee,
            size,
            vsize,
            weight,
            flags,
            high_risk_score,
            fraud_probability,
            timestamp,
            script_pubkey_type: c.text(SCRIPT_TYPE),
            issues: c.issues,
        }
    }
}

/// The ordered, typed record set for one load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    records: Vec<TransactionRecord>,
}

impl Ledger {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows that had at least one value fail coercion.
    pub fn flagged_rows(&self) -> usize {
        self.records.iter().filter(|r| !r.issues.is_empty()).count()
    }

    /// Lookup by `tx_id`, then by `tx_hash`.
    pub fn find(&self, id: &str) -> Option<&TransactionRecord> {
        self.records
            .iter()
            .find(|r| r.tx_id.as_deref() == Some(id))
            .or_else(|| {
                self.records
                    .iter()
                    .find(|r| r.tx_hash.as_deref() == Some(id))
            })
    }
}

pub fn parse_ledger(text: &str) -> Ledger {
    let records: Vec<TransactionRecord> = parse_csv(text)
        .iter()
        .enumerate()
        .map(|(i, row)| TransactionRecord::from_row(i, row))
        .collect();
    let ledger = Ledger::new(records);

    let flagged = ledger.flagged_rows();
    metrics::counter!("ledger_rows_parsed_total").increment(ledger.len() as u64);
    if flagged > 0 {
        metrics::counter!("ledger_rows_flagged_total").increment(flagged as u64);
        tracing::warn!(
            rows = ledger.len(),
            flagged,
            "ledger rows with values that failed coercion"
        );
    }
    tracing::debug!(rows = ledger.len(), "ledger parsed");
    ledger
}
