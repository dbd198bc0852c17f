//! User segments: named predicates over a user's transaction history.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::ids::SegmentId;
use crate::money::CapValue;

/// The quantity a segment measures and its bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Measure {
    TransactionCount {
        min: u64,
        #[serde(default)]
        max: Option<u64>,
    },
    TransactionVolume {
        min: BigDecimal,
        #[serde(default)]
        max: Option<BigDecimal>,
    },
}

/// Segment membership criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCriteria {
    #[serde(flatten)]
    pub measure: Measure,
    /// Look-back window in days; `None` means lifetime.
    #[serde(default)]
    pub period_days: Option<u32>,
    /// Only transactions in this currency are counted.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub signup_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub signup_end_date: Option<NaiveDate>,
}

/// Aggregates over the user's transactions inside the observation window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionStats {
    pub count: u64,
    pub volume: BigDecimal,
}

impl TransactionStats {
    pub fn new(count: u64, volume: BigDecimal) -> Self {
        Self { count, volume }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            volume: BigDecimal::zero(),
        }
    }
}

impl SegmentCriteria {
    /// Rejects criteria no user could ever match.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let inverted = match &self.measure {
            Measure::TransactionCount { min, max } => max.map_or(false, |max| max < *min),
            Measure::TransactionVolume { min, max } => {
                if min.is_negative_value() {
                    return Err(DefinitionError::InvalidValue {
                        field: "criteria.min",
                        reason: "must not be negative".to_string(),
                    });
                }
                max.as_ref().map_or(false, |max| max < min)
            }
        };
        if inverted {
            return Err(DefinitionError::InvalidValue {
                field: "criteria.max",
                reason: "must not be below min".to_string(),
            });
        }
        if self.period_days == Some(0) {
            return Err(DefinitionError::InvalidValue {
                field: "criteria.period_days",
                reason: "must be at least 1 day, or omitted for lifetime".to_string(),
            });
        }
        if let (Some(start), Some(end)) = (self.signup_start_date, self.signup_end_date) {
            if start > end {
                return Err(DefinitionError::InvalidDateRange);
            }
        }
        Ok(())
    }

    /// Start of the observation window, or `None` for lifetime.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.period_days
            .map(|days| now - Duration::days(i64::from(days)))
    }

    pub fn has_signup_bounds(&self) -> bool {
        self.signup_start_date.is_some() || self.signup_end_date.is_some()
    }

    /// Registration date check. A bounded criterion fails when the
    /// registration date is unknown.
    pub fn signup_matches(&self, registered_at: Option<DateTime<Utc>>) -> bool {
        if !self.has_signup_bounds() {
            return true;
        }
        let Some(registered_at) = registered_at else {
            return false;
        };
        let day = registered_at.date_naive();
        self.signup_start_date.map_or(true, |start| day >= start)
            && self.signup_end_date.map_or(true, |end| day <= end)
    }

    /// Whether the windowed aggregates fall inside the bounds.
    pub fn stats_match(&self, stats: &TransactionStats) -> bool {
        match &self.measure {
            Measure::TransactionCount { min, max } => {
                stats.count >= *min && max.map_or(true, |max| stats.count <= max)
            }
            Measure::TransactionVolume { min, max } => {
                &stats.volume >= min && max.as_ref().map_or(true, |max| &stats.volume <= max)
            }
        }
    }

    /// Full membership predicate.
    pub fn matches(&self, stats: &TransactionStats, registered_at: Option<DateTime<Utc>>) -> bool {
        self.signup_matches(registered_at) && self.stats_match(stats)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub criteria: SegmentCriteria,
}

impl SegmentDraft {
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::Missing("Segment name"));
        }
        self.criteria.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSegment {
    pub id: SegmentId,
    pub name: String,
    pub description: Option<String>,
    pub criteria: SegmentCriteria,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn volume_criteria(min: &str) -> SegmentCriteria {
        serde_json::from_value(serde_json::json!({
            "type": "TRANSACTION_VOLUME",
            "min": min,
        }))
        .unwrap()
    }

    #[test]
    fn test_parses_tagged_criteria() {
        let criteria: SegmentCriteria = serde_json::from_str(
            r#"{"type": "TRANSACTION_COUNT", "min": 5, "max": 10, "period_days": 30}"#,
        )
        .unwrap();
        assert_eq!(
            criteria.measure,
            Measure::TransactionCount {
                min: 5,
                max: Some(10)
            }
        );
        assert_eq!(criteria.period_days, Some(30));
        assert!(serde_json::from_str::<SegmentCriteria>(r#"{"type": "NEW_USER"}"#).is_err());
    }

    #[test]
    fn test_volume_boundary() {
        let criteria = volume_criteria("1000");
        let at = |v: &str| TransactionStats::new(3, BigDecimal::from_str(v).unwrap());
        assert!(!criteria.matches(&at("950"), None));
        assert!(criteria.matches(&at("1000"), None));
        assert!(criteria.matches(&at("25000"), None));
    }

    #[test]
    fn test_count_bounds_are_inclusive() {
        let criteria = SegmentCriteria {
            measure: Measure::TransactionCount {
                min: 2,
                max: Some(4),
            },
            period_days: None,
            currency: None,
            signup_start_date: None,
            signup_end_date: None,
        };
        let stats = |count| TransactionStats::new(count, BigDecimal::zero());
        assert!(!criteria.stats_match(&stats(1)));
        assert!(criteria.stats_match(&stats(2)));
        assert!(criteria.stats_match(&stats(4)));
        assert!(!criteria.stats_match(&stats(5)));
    }

    #[test]
    fn test_window_start() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        let mut criteria = volume_criteria("0");
        assert_eq!(criteria.window_start(now), None);
        criteria.period_days = Some(30);
        assert_eq!(
            criteria.window_start(now),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_signup_bounds() {
        let mut criteria = volume_criteria("0");
        let registered = Utc.with_ymd_and_hms(2024, 6, 15, 8, 0, 0).unwrap();
        assert!(criteria.signup_matches(None));

        criteria.signup_start_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        criteria.signup_end_date = NaiveDate::from_ymd_opt(2024, 6, 15);
        assert!(criteria.signup_matches(Some(registered)));
        assert!(!criteria.signup_matches(None));

        criteria.signup_start_date = NaiveDate::from_ymd_opt(2024, 7, 1);
        criteria.signup_end_date = None;
        assert!(!criteria.signup_matches(Some(registered)));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut criteria = volume_criteria("500");
        criteria.measure = Measure::TransactionVolume {
            min: BigDecimal::from(500),
            max: Some(BigDecimal::from(100)),
        };
        assert!(criteria.validate().is_err());

        let mut criteria = volume_criteria("0");
        criteria.period_days = Some(0);
        assert!(criteria.validate().is_err());
    }
}
