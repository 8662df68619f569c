//! Folds the ledger into per-address profiles.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{AddressRiskPolicy, AggregationConfig};
use crate::risk::{classify, RiskAssessment};
use crate::types::{AddressTag, EntityCategory, EntityHint, RiskCategory, TransactionRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressProfile {
    pub address: String,
    pub transaction_count: u64,
    pub total_sent: Decimal,
    pub total_received: Decimal,
    /// `total_received - total_sent`; negative when the ledger is incomplete.
    pub balance: Decimal,
    pub risk_category: RiskCategory,
    pub risk_score: f64,
    pub tags: Vec<AddressTag>,
    pub connected_addresses: BTreeSet<String>,
    pub first_seen_index: usize,
    pub last_seen_index: usize,
    /// Appearance rank: a row's sender ranks before its receiver.
    #[serde(skip)]
    pub first_seen_order: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub entity: Option<EntityHint>,
}

impl AddressProfile {
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }
}

#[derive(Debug)]
struct Accumulator {
    transaction_count: u64,
    total_sent: Decimal,
    total_received: Decimal,
    risk: Option<RiskAssessment>,
    connected: BTreeSet<String>,
    first_seen_index: usize,
    first_seen_order: usize,
    last_seen_index: usize,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    touches_high_value: bool,
    touches_high_risk: bool,
    sends_high_out_degree: bool,
    receives_repeat: bool,
}

impl Accumulator {
    fn new(index: usize, order: usize) -> Self {
        Self {
            transaction_count: 0,
            total_sent: Decimal::ZERO,
            total_received: Decimal::ZERO,
            risk: None,
            connected: BTreeSet::new(),
            first_seen_index: index,
            first_seen_order: order,
            last_seen_index: index,
            first_seen: None,
            last_seen: None,
            touches_high_value: false,
            touches_high_risk: false,
            sends_high_out_degree: false,
            receives_repeat: false,
        }
    }

    fn observe(
        &mut self,
        record: &TransactionRecord,
        assessment: RiskAssessment,
        policy: AddressRiskPolicy,
    ) {
        self.transaction_count += 1;
        self.last_seen_index = record.index;
        self.touches_high_value |= record.flags.high_value_tx;
        self.touches_high_risk |= record.flags.high_risk;

        if let Some(ts) = record.timestamp {
            self.first_seen = Some(self.first_seen.map_or(ts, |cur| cur.min(ts)));
            self.last_seen = Some(self.last_seen.map_or(ts, |cur| cur.max(ts)));
        }

        self.risk = match (self.risk, policy) {
            (None, _) | (Some(_), AddressRiskPolicy::Latest) => Some(assessment),
            (Some(cur), AddressRiskPolicy::FirstSeen) => Some(cur),
            (Some(cur), AddressRiskPolicy::MaxOverTransactions) => {
                let riskier = (assessment.category, assessment.score) > (cur.category, cur.score);
                Some(if riskier { assessment } else { cur })
            }
        };
    }

    fn finish(self, address: String, high_volume_threshold: u64) -> AddressProfile {
        let risk = self.risk.unwrap_or_else(|| RiskAssessment {
            category: RiskCategory::Low,
            score: crate::risk::BASELINE_RISK_SCORE,
        });

        let mut tags = Vec::new();
        if self.transaction_count > high_volume_threshold {
            tags.push(AddressTag {
                name: "high_volume",
                category: "activity",
                confidence: 0.9,
            });
        }
        if self.touches_high_value {
            tags.push(AddressTag {
                name: "high_value_transactions",
                category: "activity",
                confidence: 0.85,
            });
        }
        if risk.category == RiskCategory::High {
            tags.push(AddressTag {
                name: "high_risk_activity",
                category: "risk",
                confidence: 0.95,
            });
        }

        let entity = if self.sends_high_out_degree {
            Some(EntityHint {
                name: "Possible Exchange",
                category: EntityCategory::Exchange,
            })
        } else if self.receives_repeat {
            Some(EntityHint {
                name: "Merchant Service",
                category: EntityCategory::Merchant,
            })
        } else if self.touches_high_risk {
            Some(EntityHint {
                name: "High Risk Entity",
                category: EntityCategory::Unknown,
            })
        } else {
            None
        };

        AddressProfile {
            address,
            transaction_count: self.transaction_count,
            total_sent: self.total_sent,
            total_received: self.total_received,
            balance: self.total_received - self.total_sent,
            risk_category: risk.category,
            risk_score: risk.score,
            tags,
            connected_addresses: self.connected,
            first_seen_index: self.first_seen_index,
            last_seen_index: self.last_seen_index,
            first_seen_order: self.first_seen_order,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            entity,
        }
    }
}

/// Address-keyed profiles built from one ledger snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AddressBook {
    profiles: BTreeMap<String, AddressProfile>,
}

impl AddressBook {
    pub fn get(&self, address: &str) -> Option<&AddressProfile> {
        self.profiles.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.profiles.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressProfile> {
        self.profiles.values()
    }

    /// The most active address; ties go to the one seen first in the ledger.
    pub fn primary(&self) -> Option<&AddressProfile> {
        self.iter().min_by(|a, b| {
            b.transaction_count
                .cmp(&a.transaction_count)
                .then(a.first_seen_order.cmp(&b.first_seen_order))
        })
    }

    /// Profiles ordered by descending transaction count, then first sight.
    pub fn by_activity(&self) -> Vec<&AddressProfile> {
        let mut out: Vec<&AddressProfile> = self.iter().collect();
        out.sort_by(|a, b| {
            b.transaction_count
                .cmp(&a.transaction_count)
                .then(a.first_seen_order.cmp(&b.first_seen_order))
        });
        out
    }

    pub fn count_by_category(&self, category: RiskCategory) -> usize {
        self.iter().filter(|p| p.risk_category == category).count()
    }
}

/// Add `amount` to `total`, pinning at the representable limit instead of
/// overflowing. Returns `false` when the sum had to be clamped.
pub fn add_saturating(total: &mut Decimal, amount: Decimal) -> bool {
    match total.checked_add(amount) {
        Some(sum) => {
            *total = sum;
            true
        }
        None => {
            *total = total.saturating_add(amount);
            false
        }
    }
}

/// Single pass over the ledger producing one profile per real address.
///
/// Sentinel and empty addresses never get a profile. An address's risk follows
/// `config.risk_policy`; the default is the risk of the first record naming it.
/// Totals that would overflow are clamped to `Decimal::MAX` and logged.
pub fn aggregate(records: &[TransactionRecord], config: &AggregationConfig) -> AddressBook {
    let mut acc: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut clamped = 0usize;

    for record in records {
        let assessment = classify(record);
        let sender = record.sender();
        let receiver = record.receiver();
        let value = record.value_or_zero();

        if let Some(s) = sender {
            let order = record.index * 2;
            let a = acc
                .entry(s.to_string())
                .or_insert_with(|| Accumulator::new(record.index, order));
            a.observe(record, assessment, config.risk_policy);
            if !add_saturating(&mut a.total_sent, value) {
                clamped += 1;
            }
            a.sends_high_out_degree |= record.flags.high_out_degree;
        }
        if let Some(r) = receiver {
            let order = record.index * 2 + 1;
            let a = acc
                .entry(r.to_string())
                .or_insert_with(|| Accumulator::new(record.index, order));
            a.observe(record, assessment, config.risk_policy);
            if !add_saturating(&mut a.total_received, value) {
                clamped += 1;
            }
            a.receives_repeat |= record.flags.repeat_receiver_tx;
        }
        if let (Some(s), Some(r)) = (sender, receiver) {
            if let Some(a) = acc.get_mut(s) {
                a.connected.insert(r.to_string());
            }
            if let Some(a) = acc.get_mut(r) {
                a.connected.insert(s.to_string());
            }
        }
    }

    if clamped > 0 {
        tracing::warn!(clamped, "address totals clamped to the decimal range");
    }

    let profiles = acc
        .into_iter()
        .map(|(address, a)| {
            let profile = a.finish(address.clone(), config.high_volume_threshold);
            (address, profile)
        })
        .collect();
    AddressBook { profiles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::parse_ledger;

    const HEADER: &str =
        "tx_id,sender_address,receiver_address,value,High_Risk,Medium_Risk,Low_Risk,high_value_tx,high_out_degree,repeat_receiver_tx";

    fn book(rows: &[&str], policy: AddressRiskPolicy) -> AddressBook {
        let text = format!("{HEADER}\n{}", rows.join("\n"));
        let ledger = parse_ledger(&text);
        let cfg = AggregationConfig {
            risk_policy: policy,
            ..AggregationConfig::default()
        };
        aggregate(ledger.records(), &cfg)
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_two_hop_scenario_profile_for_middle_address() {
        let b = book(
            &["t1,A,B,5,1,0,0,0,0,0", "t2,B,C,3,0,0,1,0,0,0"],
            AddressRiskPolicy::FirstSeen,
        );
        let p = b.get("B").unwrap();
        assert_eq!(p.total_received, dec("5"));
        assert_eq!(p.total_sent, dec("3"));
        assert_eq!(p.balance, dec("2"));
        assert_eq!(p.transaction_count, 2);
        let connected: Vec<&str> = p.connected_addresses.iter().map(String::as_str).collect();
        assert_eq!(connected, vec!["A", "C"]);
    }

    #[test]
    fn test_unseen_address_is_absent() {
        let b = book(&["t1,A,B,5,0,0,0,0,0,0"], AddressRiskPolicy::FirstSeen);
        assert!(!b.contains("Z"));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_self_transfer_counts_twice_and_nets_zero() {
        let b = book(&["t1,A,A,2.5,0,0,0,0,0,0"], AddressRiskPolicy::FirstSeen);
        let p = b.get("A").unwrap();
        assert_eq!(p.transaction_count, 2);
        assert_eq!(p.total_sent, dec("2.5"));
        assert_eq!(p.total_received, dec("2.5"));
        assert_eq!(p.balance, Decimal::ZERO);
        assert!(p.connected_addresses.contains("A"));
    }

    #[test]
    fn test_sentinels_do_not_get_profiles_or_edges() {
        let b = book(
            &[
                "t1,COINBASE,M,6.25,0,0,0,0,0,0",
                "t2,M,OP_RETURN,0,0,0,0,0,0,0",
                "t3,UNKNOWN,M,1,0,0,0,0,0,0",
                "t4,,M,1,0,0,0,0,0,0",
            ],
            AddressRiskPolicy::FirstSeen,
        );
        assert_eq!(b.len(), 1);
        let m = b.get("M").unwrap();
        assert_eq!(m.transaction_count, 4);
        assert_eq!(m.total_sent, Decimal::ZERO);
        assert_eq!(m.total_received, dec("8.25"));
        assert!(m.connected_addresses.is_empty());
    }

    #[test]
    fn test_balance_is_exact_for_eight_fractional_digits() {
        let b = book(
            &[
                "t1,X,Y,0.10000001,0,0,0,0,0,0",
                "t2,X,Y,0.20000002,0,0,0,0,0,0",
                "t3,Y,X,0.00000003,0,0,0,0,0,0",
            ],
            AddressRiskPolicy::FirstSeen,
        );
        let y = b.get("Y").unwrap();
        assert_eq!(y.total_received, dec("0.30000003"));
        assert_eq!(y.balance, y.total_received - y.total_sent);
        assert_eq!(y.balance, dec("0.30000000"));
        let x = b.get("X").unwrap();
        assert_eq!(x.balance, dec("-0.30000000"));
    }

    #[test]
    fn test_missing_value_counts_as_zero() {
        let b = book(
            &["t1,A,B,,0,0,0,0,0,0", "t2,A,B,oops,0,0,0,0,0,0"],
            AddressRiskPolicy::FirstSeen,
        );
        let a = b.get("A").unwrap();
        assert_eq!(a.transaction_count, 2);
        assert_eq!(a.total_sent, Decimal::ZERO);
    }

    #[test]
    fn test_risk_policies() {
        let rows = [
            "t1,A,B,1,0,0,1,0,0,0",
            "t2,A,C,1,1,0,0,0,0,0",
            "t3,A,D,1,0,1,0,0,0,0",
        ];

        let first = book(&rows, AddressRiskPolicy::FirstSeen);
        assert_eq!(first.get("A").unwrap().risk_category, RiskCategory::Low);
        assert!(!first.get("A").unwrap().has_tag("high_risk_activity"));

        let max = book(&rows, AddressRiskPolicy::MaxOverTransactions);
        assert_eq!(max.get("A").unwrap().risk_category, RiskCategory::High);
        assert!(max.get("A").unwrap().has_tag("high_risk_activity"));

        let latest = book(&rows, AddressRiskPolicy::Latest);
        assert_eq!(latest.get("A").unwrap().risk_category, RiskCategory::Medium);
        assert!((latest.get("A").unwrap().risk_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_high_volume_tag_threshold_is_strict() {
        let rows: Vec<String> = (0..51)
            .map(|i| format!("t{i},HV,R{i},1,0,0,0,0,0,0"))
            .collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let b = book(&refs, AddressRiskPolicy::FirstSeen);
        assert!(b.get("HV").unwrap().has_tag("high_volume"));

        let b = book(&refs[..50], AddressRiskPolicy::FirstSeen);
        assert!(!b.get("HV").unwrap().has_tag("high_volume"));
    }

    #[test]
    fn test_high_value_tag_from_any_touching_record() {
        let b = book(
            &["t1,A,B,1,0,0,0,0,0,0", "t2,C,B,1,0,0,0,1,0,0"],
            AddressRiskPolicy::FirstSeen,
        );
        assert!(b.get("B").unwrap().has_tag("high_value_transactions"));
        assert!(!b.get("A").unwrap().has_tag("high_value_transactions"));
    }

    #[test]
    fn test_entity_hints() {
        let b = book(
            &[
                "t1,EX,M,1,0,0,0,0,1,0",
                "t2,P,M,1,0,0,0,0,0,1",
                "t3,Q,R,1,1,0,0,0,0,0",
            ],
            AddressRiskPolicy::FirstSeen,
        );
        let entity = |a: &str| b.get(a).unwrap().entity.clone().unwrap();
        assert_eq!(entity("EX").category, EntityCategory::Exchange);
        assert_eq!(entity("M").name, "Merchant Service");
        assert_eq!(entity("R").name, "High Risk Entity");
        assert!(b.get("P").unwrap().entity.is_none());
    }

    #[test]
    fn test_primary_prefers_count_then_first_seen() {
        let b = book(
            &[
                "t1,A,B,1,0,0,0,0,0,0",
                "t2,C,D,1,0,0,0,0,0,0",
                "t3,C,B,1,0,0,0,0,0,0",
            ],
            AddressRiskPolicy::FirstSeen,
        );
        // B and C both have two appearances; B was seen first.
        assert_eq!(b.primary().unwrap().address, "B");
        let order: Vec<&str> = b.by_activity().iter().map(|p| p.address.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn test_seen_indices_track_ledger_positions() {
        let b = book(
            &[
                "t1,A,B,1,0,0,0,0,0,0",
                "t2,C,D,1,0,0,0,0,0,0",
                "t3,A,D,1,0,0,0,0,0,0",
            ],
            AddressRiskPolicy::FirstSeen,
        );
        let a = b.get("A").unwrap();
        assert_eq!((a.first_seen_index, a.last_seen_index), (0, 2));
        assert!(a.first_seen.is_none());
    }

    #[test]
    fn test_empty_ledger_yields_empty_book() {
        let b = aggregate(&[], &AggregationConfig::default());
        assert!(b.is_empty());
        assert!(b.primary().is_none());
    }

    #[test]
    fn test_primary_tie_on_one_row_goes_to_sender() {
        let b = book(&["t1,Z,A,1,0,0,0,0,0,0"], AddressRiskPolicy::FirstSeen);
        assert_eq!(b.primary().unwrap().address, "Z");
        let order: Vec<&str> = b.by_activity().iter().map(|p| p.address.as_str()).collect();
        assert_eq!(order, vec!["Z", "A"]);
    }

    #[test]
    fn test_totals_clamp_instead_of_overflowing() {
        let max = "79228162514264337593543950335";
        let first = format!("t1,A,B,{max},0,0,0,0,0,0");
        let second = format!("t2,C,B,{max},0,0,0,0,0,0");
        let rows = [first.as_str(), second.as_str()];
        let b = book(&rows, AddressRiskPolicy::FirstSeen);
        let receiver = b.get("B").unwrap();
        assert_eq!(receiver.total_received, Decimal::MAX);
        assert_eq!(receiver.balance, Decimal::MAX);
        assert_eq!(receiver.transaction_count, 2);
        assert_eq!(b.get("A").unwrap().total_sent, Decimal::MAX);
    }

    #[test]
    fn test_add_saturating_reports_clamping() {
        let mut total = Decimal::ONE;
        assert!(add_saturating(&mut total, Decimal::ONE));
        assert_eq!(total, Decimal::new(2, 0));
        assert!(!add_saturating(&mut total, Decimal::MAX));
        assert_eq!(total, Decimal::MAX);
    }

    #[test]
    fn test_piped_address_is_a_single_party() {
        let b = book(&["t1,A|B,C,2,0,0,0,0,0,0"], AddressRiskPolicy::FirstSeen);
        assert_eq!(b.len(), 2);
        assert!(!b.contains("A"));
        assert!(!b.contains("B"));
        let party = b.get("A|B").unwrap();
        assert_eq!(party.total_sent, dec("2"));
        assert!(party.connected_addresses.contains("C"));
    }
}
