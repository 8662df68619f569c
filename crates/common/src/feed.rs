//! Bounded, ordered transaction windows for display.

use std::cmp::Ordering;

use serde::Serialize;

use crate::types::{Direction, TransactionRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry<'a> {
    pub direction: Direction,
    pub record: &'a TransactionRecord,
}

/// Records touching `address`, in ledger order, at most `limit` of them.
///
/// Direction is outbound when the address is the sender; a self-transfer is outbound.
pub fn recent_for_address<'a>(
    records: &'a [TransactionRecord],
    address: &str,
    limit: usize,
) -> Vec<FeedEntry<'a>> {
    records
        .iter()
        .filter(|r| r.touches(address))
        .take(limit)
        .map(|record| FeedEntry {
            direction: if record.sender_address.as_deref() == Some(address) {
                Direction::Outbound
            } else {
                Direction::Inbound
            },
            record,
        })
        .collect()
}

/// The `limit` records with the highest `High_Risk` reading.
///
/// Stable: equal scores keep ledger order, so repeated runs give identical output.
pub fn top_by_risk(records: &[TransactionRecord], limit: usize) -> Vec<&TransactionRecord> {
    let mut sorted: Vec<&TransactionRecord> = records.iter().collect();
    // Scores are finite, so this never falls back; -0.0 and 0.0 compare equal.
    sorted.sort_by(|a, b| {
        b.high_risk_score
            .partial_cmp(&a.high_risk_score)
            .unwrap_or(Ordering::Equal)
    });
    sorted.truncate(limit);
    sorted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityKind {
    #[serde(rename = "Large Value")]
    LargeValue,
    #[serde(rename = "Suspicious Pattern")]
    SuspiciousPattern,
    #[serde(rename = "High Risk")]
    HighRisk,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LargeValue => "Large Value",
            Self::SuspiciousPattern => "Suspicious Pattern",
            Self::HighRisk => "High Risk",
        }
    }

    fn of(record: &TransactionRecord) -> Self {
        if record.flags.high_value_tx {
            Self::LargeValue
        } else if record.flags.repeat_receiver_tx {
            Self::SuspiciousPattern
        } else {
            Self::HighRisk
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry<'a> {
    pub kind: ActivityKind,
    pub record: &'a TransactionRecord,
}

/// First `limit` records flagged High_Risk, in ledger order, labelled by what drove them.
pub fn recent_high_risk(records: &[TransactionRecord], limit: usize) -> Vec<ActivityEntry<'_>> {
    records
        .iter()
        .filter(|r| r.flags.high_risk)
        .take(limit)
        .map(|record| ActivityEntry {
            kind: ActivityKind::of(record),
            record,
        })
        .collect()
}
