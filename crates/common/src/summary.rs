//! Ledger-wide dashboard figures: counts, distributions and top movers.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::profiles::{add_saturating, AddressBook};
use crate::types::{RiskCategory, TransactionRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: RiskCategory,
    pub count: usize,
    /// Share of all records, percent with one decimal place.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptTypeCount {
    pub script_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressFlow {
    pub address: String,
    /// Absolute net flow (received minus sent).
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyActivity {
    pub hour: DateTime<Utc>,
    pub count: usize,
    pub volume: Decimal,
    pub average_fee: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_transactions: usize,
    pub active_addresses: usize,
    pub risk_alerts: usize,
    pub total_volume: Decimal,
    pub risk_distribution: Vec<CategoryShare>,
    pub size_buckets: Vec<Bucket>,
    pub script_types: Vec<ScriptTypeCount>,
    pub top_addresses: Vec<AddressFlow>,
    pub hourly_activity: Vec<HourlyActivity>,
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Per-record category used for the distribution chart: High, else Medium, else Low.
fn record_category(record: &TransactionRecord) -> RiskCategory {
    if record.flags.high_risk {
        RiskCategory::High
    } else if record.flags.medium_risk {
        RiskCategory::Medium
    } else {
        RiskCategory::Low
    }
}

pub fn risk_distribution(records: &[TransactionRecord]) -> Vec<CategoryShare> {
    let mut counts = [0usize; 3];
    for r in records {
        counts[record_category(r) as usize] += 1;
    }
    [RiskCategory::Low, RiskCategory::Medium, RiskCategory::High]
        .into_iter()
        .map(|category| {
            let count = counts[category as usize];
            CategoryShare {
                category,
                count,
                percentage: percentage(count, records.len()),
            }
        })
        .collect()
}

const SIZE_BUCKETS: [(&str, u64); 4] = [
    ("Small (<1000)", 1000),
    ("Medium (1000-5000)", 5000),
    ("Large (5000-10000)", 10000),
    ("Very Large (>10000)", u64::MAX),
];

/// Records bucketed by byte size; a missing size counts as small.
pub fn size_buckets(records: &[TransactionRecord]) -> Vec<Bucket> {
    let mut counts = [0usize; SIZE_BUCKETS.len()];
    for r in records {
        let size = r.size.unwrap_or(0);
        let idx = SIZE_BUCKETS
            .iter()
            .position(|(_, upper)| size < *upper)
            .unwrap_or(SIZE_BUCKETS.len() - 1);
        counts[idx] += 1;
    }
    SIZE_BUCKETS
        .iter()
        .zip(counts)
        .map(|(&(label, _), count)| Bucket { label, count })
        .collect()
}

pub fn script_type_distribution(records: &[TransactionRecord]) -> Vec<ScriptTypeCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records {
        *counts
            .entry(r.script_pubkey_type.as_deref().unwrap_or("unknown"))
            .or_default() += 1;
    }
    let mut out: Vec<ScriptTypeCount> = counts
        .into_iter()
        .map(|(t, count)| ScriptTypeCount {
            script_type: t.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.script_type.cmp(&b.script_type))
    });
    out
}

/// Addresses with the largest absolute net flow; ties keep first-seen order.
pub fn top_addresses(book: &AddressBook, limit: usize) -> Vec<AddressFlow> {
    let mut profiles: Vec<_> = book.iter().collect();
    profiles.sort_by(|a, b| {
        b.balance
            .abs()
            .cmp(&a.balance.abs())
            .then(a.first_seen_order.cmp(&b.first_seen_order))
    });
    profiles
        .into_iter()
        .take(limit)
        .map(|p| AddressFlow {
            address: p.address.clone(),
            value: p.balance.abs(),
        })
        .collect()
}

/// Count, volume and mean fee per UTC hour, for records that carry a timestamp.
pub fn hourly_activity(records: &[TransactionRecord]) -> Vec<HourlyActivity> {
    let mut hours: BTreeMap<i64, (usize, Decimal, f64)> = BTreeMap::new();
    for r in records {
        let Some(ts) = r.timestamp else {
            continue;
        };
        let hour = ts.timestamp().div_euclid(3600) * 3600;
        let entry = hours.entry(hour).or_insert((0, Decimal::ZERO, 0.0));
        entry.0 += 1;
        add_saturating(&mut entry.1, r.value_or_zero());
        entry.2 += r.fee.and_then(|f| f.to_f64()).unwrap_or(0.0);
    }
    hours
        .into_iter()
        .filter_map(|(hour, (count, volume, fees))| {
            Some(HourlyActivity {
                hour: DateTime::from_timestamp(hour, 0)?,
                count,
                volume,
                average_fee: fees / count as f64,
            })
        })
        .collect()
}

/// Sum of record values, clamped at `Decimal::MAX`.
pub fn total_volume(records: &[TransactionRecord]) -> Decimal {
    let mut total = Decimal::ZERO;
    for r in records {
        add_saturating(&mut total, r.value_or_zero());
    }
    total
}

impl DashboardSummary {
    pub fn compute(records: &[TransactionRecord], book: &AddressBook, top_limit: usize) -> Self {
        Self {
            total_transactions: records.len(),
            active_addresses: book.len(),
            risk_alerts: records.iter().filter(|r| r.flags.high_risk).count(),
            total_volume: total_volume(records),
            risk_distribution: risk_distribution(records),
            size_buckets: size_buckets(records),
            script_types: script_type_distribution(records),
            top_addresses: top_addresses(book, top_limit),
            hourly_activity: hourly_activity(records),
        }
    }
}
