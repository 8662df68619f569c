//! Everything derived from one ledger load, computed once and shared read-only.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::AggregationConfig;
use crate::correlation::{correlation_matrix, CorrelationMatrix};
use crate::feed::{recent_for_address, recent_high_risk, top_by_risk, ActivityEntry, FeedEntry};
use crate::ledger::Ledger;
use crate::profiles::{aggregate, AddressBook, AddressProfile};
use crate::risk::{classify, patterns, risk_indicators, RiskAssessment, RiskIndicator};
use crate::source::{LedgerLoad, LedgerSource, LoadStatus};
use crate::summary::DashboardSummary;
use crate::types::{NumericField, RiskBand, TransactionRecord};

#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub status: LoadStatus,
    pub content_hash: Option<String>,
    pub built_at: DateTime<Utc>,
    pub config: AggregationConfig,
    pub ledger: Ledger,
    pub book: AddressBook,
    pub summary: DashboardSummary,
    pub correlation: CorrelationMatrix,
}

/// One transaction with its classification spelled out.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetail<'a> {
    pub record: &'a TransactionRecord,
    pub assessment: RiskAssessment,
    pub band: RiskBand,
    pub indicators: Vec<RiskIndicator>,
    pub patterns: Vec<&'static str>,
}

/// Address profile plus its most recent transactions.
#[derive(Debug, Clone, Serialize)]
pub struct AddressReport<'a> {
    pub profile: &'a AddressProfile,
    pub band: RiskBand,
    pub recent: Vec<FeedEntry<'a>>,
}

impl LedgerSnapshot {
    pub fn build(load: LedgerLoad, config: &AggregationConfig) -> Self {
        let start = Instant::now();
        let records = load.ledger.records();
        let book = aggregate(records, config);
        let summary = DashboardSummary::compute(records, &book, config.top_addresses_limit);
        let correlation = correlation_matrix(records, &NumericField::ALL);
        let ms = start.elapsed().as_secs_f64() * 1000.0;

        metrics::histogram!("snapshot_build_ms").record(ms);
        metrics::counter!("snapshot_builds_total").increment(1);
        tracing::info!(
            rows = records.len(),
            addresses = book.len(),
            status = load.status.as_str(),
            build_ms = ms,
            "snapshot built"
        );

        Self {
            status: load.status,
            content_hash: load.content_hash,
            built_at: Utc::now(),
            config: *config,
            ledger: load.ledger,
            book,
            summary,
            correlation,
        }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        self.ledger.records()
    }

    /// True when `hash` differs from this snapshot's content, or this one has none.
    pub fn is_stale_for(&self, hash: Option<&str>) -> bool {
        match (self.content_hash.as_deref(), hash) {
            (Some(current), Some(new)) => current != new,
            (None, None) => false,
            _ => true,
        }
    }

    pub fn top_risk(&self) -> Vec<&TransactionRecord> {
        top_by_risk(self.records(), self.config.top_risk_limit)
    }

    pub fn recent_activity(&self) -> Vec<ActivityEntry<'_>> {
        recent_high_risk(self.records(), self.config.activity_limit)
    }

    pub fn address(&self, address: &str) -> Option<AddressReport<'_>> {
        let profile = self.book.get(address)?;
        Some(AddressReport {
            profile,
            band: RiskBand::from_score(profile.risk_score),
            recent: recent_for_address(self.records(), address, self.config.recent_limit),
        })
    }

    /// Report for the most active address, if any address was seen.
    pub fn primary(&self) -> Option<AddressReport<'_>> {
        let address = &self.book.primary()?.address;
        self.address(address)
    }

    pub fn transaction(&self, id: &str) -> Option<TransactionDetail<'_>> {
        let record = self.ledger.find(id)?;
        let assessment = classify(record);
        Some(TransactionDetail {
            record,
            band: RiskBand::from_score(assessment.score),
            assessment,
            indicators: risk_indicators(record),
            patterns: patterns(record),
        })
    }
}

/// What a refresh attempt did to the shared snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Rebuilt,
    Unchanged,
    /// Fetch failed; the previous snapshot is still served.
    Failed {
        reason: String,
    },
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rebuilt => "rebuilt",
            Self::Unchanged => "unchanged",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Latest snapshot shared between the refresh loop and readers.
///
/// Readers clone the inner `Arc` and drop the lock immediately.
#[derive(Debug)]
pub struct SharedSnapshot {
    current: RwLock<Arc<LedgerSnapshot>>,
    last_outcome: RwLock<Option<RefreshOutcome>>,
}

impl SharedSnapshot {
    pub fn new(snapshot: LedgerSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            last_outcome: RwLock::new(None),
        }
    }

    pub async fn current(&self) -> Arc<LedgerSnapshot> {
        self.current.read().await.clone()
    }

    pub async fn last_outcome(&self) -> Option<RefreshOutcome> {
        self.last_outcome.read().await.clone()
    }

    /// Reload from `source` and swap in a new snapshot when the content changed.
    ///
    /// A failed fetch keeps serving the previous data unless that data was itself
    /// a failure, in which case the unavailable status replaces it.
    pub async fn refresh(
        &self,
        source: &LedgerSource,
        config: &AggregationConfig,
    ) -> RefreshOutcome {
        let load = source.load().await;
        let current = self.current().await;

        let failure = match &load.status {
            LoadStatus::Unavailable { reason } => Some(reason.clone()),
            _ => None,
        };

        let outcome = if let Some(reason) = failure {
            if !current.status.is_available() {
                *self.current.write().await = Arc::new(LedgerSnapshot::build(load, config));
            }
            RefreshOutcome::Failed { reason }
        } else if current.is_stale_for(load.content_hash.as_deref()) {
            let next = LedgerSnapshot::build(load, config);
            *self.current.write().await = Arc::new(next);
            RefreshOutcome::Rebuilt
        } else {
            RefreshOutcome::Unchanged
        };

        metrics::counter!("snapshot_refresh_total", "outcome" => outcome.as_str()).increment(1);
        tracing::debug!(outcome = outcome.as_str(), "snapshot refresh");
        *self.last_outcome.write().await = Some(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, RiskCategory};

    const SAMPLE: &str =
        "tx_id,sender_address,receiver_address,value,High_Risk,Medium_Risk,high_value_tx\n\
t1,A,B,5,0,1,0\n\
t2,B,C,3,1,0,1\n\
t3,C,UNKNOWN,1,0,0,0\n\
t4,B,D,2,0,0,0\n";

    fn snapshot() -> LedgerSnapshot {
        LedgerSnapshot::build(LedgerLoad::from_text(SAMPLE), &AggregationConfig::default())
    }

    #[test]
    fn test_build_derives_views() {
        let s = snapshot();
        assert_eq!(s.status, LoadStatus::Loaded);
        assert_eq!(s.records().len(), 4);
        assert_eq!(s.book.len(), 4);
        assert_eq!(s.summary.total_transactions, 4);
        assert_eq!(s.summary.risk_alerts, 1);
        assert_eq!(s.correlation.cells.len(), 25);
    }

    #[test]
    fn test_address_report() {
        let s = snapshot();
        let report = s.address("B").unwrap();
        assert_eq!(report.profile.transaction_count, 3);
        assert_eq!(report.profile.risk_category, RiskCategory::Medium);
        assert_eq!(report.band, RiskBand::Elevated);
        let dirs: Vec<Direction> = report.recent.iter().map(|e| e.direction).collect();
        assert_eq!(
            dirs,
            vec![Direction::Inbound, Direction::Outbound, Direction::Outbound]
        );
        assert!(s.address("Z").is_none());
        assert!(s.address("UNKNOWN").is_none());
    }

    #[test]
    fn test_primary_is_most_active() {
        let s = snapshot();
        assert_eq!(s.primary().unwrap().profile.address, "B");
    }

    #[test]
    fn test_transaction_detail() {
        let s = snapshot();
        let d = s.transaction("t2").unwrap();
        assert_eq!(d.assessment.category, RiskCategory::High);
        assert_eq!(d.band, RiskBand::Severe);
        assert!(!d.indicators.is_empty());
        assert!(s.transaction("t9").is_none());
    }

    #[test]
    fn test_top_risk_and_activity() {
        let s = snapshot();
        assert_eq!(s.top_risk()[0].display_id(), "t2");
        assert_eq!(s.top_risk().len(), 4);
        let activity = s.recent_activity();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].record.display_id(), "t2");
    }

    #[test]
    fn test_staleness() {
        let s = snapshot();
        let same = crate::source::content_hash(SAMPLE);
        assert!(!s.is_stale_for(Some(&same)));
        assert!(s.is_stale_for(Some("other")));
        assert!(s.is_stale_for(None));
    }

    #[tokio::test]
    async fn test_shared_refresh_rebuilds_only_on_change() {
        use std::io::Write;

        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{SAMPLE}").unwrap();
        let source = LedgerSource::file(f.path());
        let config = AggregationConfig::default();

        let shared = SharedSnapshot::new(LedgerSnapshot::build(source.load().await, &config));
        assert!(shared.last_outcome().await.is_none());
        let outcome = shared.refresh(&source, &config).await;
        assert_eq!(outcome, RefreshOutcome::Unchanged);

        writeln!(f, "t5,D,E,7,0,0,0").unwrap();
        let outcome = shared.refresh(&source, &config).await;
        assert_eq!(outcome, RefreshOutcome::Rebuilt);
        assert_eq!(shared.current().await.records().len(), 5);
        assert_eq!(shared.last_outcome().await, Some(RefreshOutcome::Rebuilt));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let source = LedgerSource::file(&path);
        let config = AggregationConfig::default();

        let shared = SharedSnapshot::new(LedgerSnapshot::build(source.load().await, &config));
        std::fs::remove_file(&path).unwrap();

        let outcome = shared.refresh(&source, &config).await;
        assert_eq!(outcome.as_str(), "failed");
        let current = shared.current().await;
        assert_eq!(current.status, LoadStatus::Loaded);
        assert_eq!(current.records().len(), 4);
    }

    #[tokio::test]
    async fn test_recovers_after_unavailable_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let source = LedgerSource::file(&path);
        let config = AggregationConfig::default();

        let shared = SharedSnapshot::new(LedgerSnapshot::build(source.load().await, &config));
        assert!(!shared.current().await.status.is_available());

        std::fs::write(&path, SAMPLE).unwrap();
        let outcome = shared.refresh(&source, &config).await;
        assert_eq!(outcome, RefreshOutcome::Rebuilt);
        assert_eq!(shared.current().await.status, LoadStatus::Loaded);
    }

    #[test]
    fn test_empty_load_builds_empty_snapshot() {
        let s = LedgerSnapshot::build(
            LedgerLoad::from_text("tx_id,value\n"),
            &AggregationConfig::default(),
        );
        assert_eq!(s.status, LoadStatus::Empty);
        assert!(s.book.is_empty());
        assert!(s.primary().is_none());
        assert!(s.top_risk().is_empty());
    }
}
