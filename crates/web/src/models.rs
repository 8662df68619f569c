//! JSON response bodies that are not plain `common` types.

use chrono::{DateTime, Utc};
use common::profiles::AddressProfile;
use common::snapshot::RefreshOutcome;
use common::source::LoadStatus;
use common::types::{RiskBand, RiskCategory};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub load: LoadStatus,
    pub source: String,
    pub content_hash: Option<String>,
    pub built_at: DateTime<Utc>,
    pub records: usize,
    pub flagged_rows: usize,
    pub addresses: usize,
    pub last_refresh: Option<RefreshOutcome>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// One row of the address listing.
#[derive(Serialize)]
pub struct AddressRow {
    pub address: String,
    pub transaction_count: u64,
    pub balance: Decimal,
    pub risk_category: RiskCategory,
    pub risk_score: f64,
    pub band: RiskBand,
    pub entity: Option<&'static str>,
    pub tags: Vec<&'static str>,
}

impl From<&AddressProfile> for AddressRow {
    fn from(p: &AddressProfile) -> Self {
        Self {
            address: p.address.clone(),
            transaction_count: p.transaction_count,
            balance: p.balance,
            risk_category: p.risk_category,
            risk_score: p.risk_score,
            band: RiskBand::from_score(p.risk_score),
            entity: p.entity.as_ref().map(|e| e.name),
            tags: p.tags.iter().map(|t| t.name).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct AddressList {
    /// Most active address in the whole ledger, independent of filters.
    pub primary: Option<String>,
    pub total: usize,
    pub addresses: Vec<AddressRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddressQuery {
    /// `low`, `medium` (or `moderate`), `high`.
    pub risk: Option<String>,
    pub limit: Option<usize>,
}
