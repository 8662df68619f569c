use serde::Serialize;

use crate::types::{RiskCategory, TransactionRecord};

pub const HIGH_RISK_SCORE: f64 = 0.85;
pub const MEDIUM_RISK_SCORE: f64 = 0.5;
pub const LOW_RISK_SCORE: f64 = 0.15;
/// Score for a record carrying no risk evidence at all.
pub const BASELINE_RISK_SCORE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub category: RiskCategory,
    pub score: f64,
}

/// Fixed High > Medium > Low cascade over the standard flags.
///
/// When none of the three flags is set, a `fraud_probability` column (if present)
/// supplies the score directly; the category stays Low.
pub fn classify(record: &TransactionRecord) -> RiskAssessment {
    let flags = &record.flags;
    let (category, score) = if flags.high_risk {
        (RiskCategory::High, HIGH_RISK_SCORE)
    } else if flags.medium_risk {
        (RiskCategory::Medium, MEDIUM_RISK_SCORE)
    } else if flags.low_risk {
        (RiskCategory::Low, LOW_RISK_SCORE)
    } else if let Some(p) = record.fraud_probability {
        (RiskCategory::Low, p.clamp(0.0, 1.0))
    } else {
        (RiskCategory::Low, BASELINE_RISK_SCORE)
    };
    RiskAssessment { category, score }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskIndicator {
    pub kind: &'static str,
    pub severity: RiskCategory,
    pub description: &'static str,
    pub confidence: f64,
}

struct IndicatorRule {
    kind: &'static str,
    pattern: &'static str,
    severity: RiskCategory,
    description: &'static str,
    confidence: f64,
    applies: fn(&TransactionRecord) -> bool,
}

const INDICATOR_RULES: [IndicatorRule; 5] = [
    IndicatorRule {
        kind: "high_value",
        pattern: "high_value",
        severity: RiskCategory::Medium,
        description: "High value transaction detected",
        confidence: 0.8,
        applies: |r| r.flags.high_value_tx,
    },
    IndicatorRule {
        kind: "repeat_receiver",
        pattern: "repeat_receiver",
        severity: RiskCategory::Medium,
        description: "Repeated transactions to same receiver",
        confidence: 0.75,
        applies: |r| r.flags.repeat_receiver_tx,
    },
    IndicatorRule {
        kind: "high_out_degree",
        pattern: "high_out_degree",
        severity: RiskCategory::High,
        description: "High number of output transactions",
        confidence: 0.85,
        applies: |r| r.flags.high_out_degree,
    },
    IndicatorRule {
        kind: "low_entropy",
        pattern: "low_entropy_hash",
        severity: RiskCategory::Medium,
        description: "Low entropy transaction hash detected",
        confidence: 0.7,
        applies: |r| r.flags.low_entropy_hash,
    },
    IndicatorRule {
        kind: "duplicate",
        pattern: "duplicate_transaction",
        severity: RiskCategory::High,
        description: "Duplicate transaction pattern detected",
        confidence: 0.9,
        applies: |r| r.flags.duplicate_tx_flag,
    },
];

/// One indicator per auxiliary flag set on the record, in fixed rule order.
pub fn risk_indicators(record: &TransactionRecord) -> Vec<RiskIndicator> {
    INDICATOR_RULES
        .iter()
        .filter(|rule| (rule.applies)(record))
        .map(|rule| RiskIndicator {
            kind: rule.kind,
            severity: rule.severity,
            description: rule.description,
            confidence: rule.confidence,
        })
        .collect()
}

/// Short pattern labels for the same flags `risk_indicators` reports.
pub fn patterns(record: &TransactionRecord) -> Vec<&'static str> {
    INDICATOR_RULES
        .iter()
        .filter(|rule| (rule.applies)(record))
        .map(|rule| rule.pattern)
        .collect()
}
