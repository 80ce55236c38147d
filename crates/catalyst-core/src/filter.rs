//! Filter predicate model for saved searches.
//!
//! A `FilterPredicate` is a structured conjunction of optional constraints.
//! All present fields are AND-ed; absent fields impose no constraint. An
//! empty predicate would match everything and is rejected at creation.
//!
//! Serializes to a flat JSON map for JSONB storage.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Alertable clinical trial phases.
pub const ALERTABLE_PHASES: [i16; 2] = [2, 3];

/// Structured matching criteria for a saved search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    /// Required trial phase (2 or 3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<i16>,

    /// Substring match on the candidate's therapeutic area, case-insensitive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub therapeutic_area: Option<String>,

    /// Minimum market cap in whole dollars, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_min: Option<i64>,

    /// Maximum market cap in whole dollars, exclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_max: Option<i64>,

    /// Catalyst must complete within this many days from evaluation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_days_max: Option<i64>,

    /// Sponsor must be one of these names, case-insensitive exact match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor_in: Option<Vec<String>>,
}

impl FilterPredicate {
    /// Create a new empty predicate. Must gain at least one constraint
    /// before it passes `validate`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase(mut self, phase: i16) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_therapeutic_area(mut self, area: impl Into<String>) -> Self {
        self.therapeutic_area = Some(area.into());
        self
    }

    pub fn with_market_cap_min(mut self, min: i64) -> Self {
        self.market_cap_min = Some(min);
        self
    }

    pub fn with_market_cap_max(mut self, max: i64) -> Self {
        self.market_cap_max = Some(max);
        self
    }

    pub fn with_completion_days_max(mut self, days: i64) -> Self {
        self.completion_days_max = Some(days);
        self
    }

    pub fn with_sponsors(mut self, sponsors: Vec<String>) -> Self {
        self.sponsor_in = Some(sponsors);
        self
    }

    /// Check if no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.therapeutic_area.is_none()
            && self.market_cap_min.is_none()
            && self.market_cap_max.is_none()
            && self.completion_days_max.is_none()
            && self.sponsor_in.is_none()
    }

    /// Validate internal consistency.
    ///
    /// At least one field must be present, numeric bounds must be
    /// non-negative, and `market_cap_min <= market_cap_max` when both are
    /// set.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidFilter(
                "predicate must have at least one constraint".into(),
            ));
        }

        if let Some(phase) = self.phase {
            if !ALERTABLE_PHASES.contains(&phase) {
                return Err(Error::InvalidFilter(format!(
                    "phase must be one of {ALERTABLE_PHASES:?}, got {phase}"
                )));
            }
        }

        if let Some(area) = &self.therapeutic_area {
            if area.trim().is_empty() {
                return Err(Error::InvalidFilter(
                    "therapeutic_area must be non-empty".into(),
                ));
            }
        }

        if let Some(min) = self.market_cap_min {
            if min < 0 {
                return Err(Error::InvalidFilter(format!(
                    "market_cap_min must be non-negative, got {min}"
                )));
            }
        }

        if let Some(max) = self.market_cap_max {
            if max < 0 {
                return Err(Error::InvalidFilter(format!(
                    "market_cap_max must be non-negative, got {max}"
                )));
            }
        }

        if let (Some(min), Some(max)) = (self.market_cap_min, self.market_cap_max) {
            if min > max {
                return Err(Error::InvalidFilter(format!(
                    "market_cap_min ({min}) exceeds market_cap_max ({max})"
                )));
            }
        }

        if let Some(days) = self.completion_days_max {
            if days < 0 {
                return Err(Error::InvalidFilter(format!(
                    "completion_days_max must be non-negative, got {days}"
                )));
            }
        }

        if let Some(sponsors) = &self.sponsor_in {
            if sponsors.is_empty() || sponsors.iter().any(|s| s.trim().is_empty()) {
                return Err(Error::InvalidFilter(
                    "sponsor_in must be a non-empty list of non-empty names".into(),
                ));
            }
        }

        Ok(())
    }
}
