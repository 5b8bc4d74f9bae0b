//! Throttle Classification
//!
//! Maps a CPU/RAM sample onto one of four throttling levels. The
//! classification is stateless: the same sample and thresholds always give
//! the same level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Offset added to the base limit when no medium limit is configured
pub const MEDIUM_OFFSET: f64 = 5.0;

/// Offset added to the base limit when no high limit is configured
pub const HIGH_OFFSET: f64 = 10.0;

/// A point-in-time CPU/RAM measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl ResourceSample {
    /// Build a sample stamped with the current time, clamping both values to [0, 100]
    pub fn now(cpu_percent: f64, ram_percent: f64) -> Self {
        Self {
            cpu_percent: clamp_percent(cpu_percent),
            ram_percent: clamp_percent(ram_percent),
            timestamp: Utc::now(),
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Throttling level published to the rest of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ThrottleLevel {
    None = 0,
    Light = 1,
    Moderate = 2,
    Severe = 3,
}

impl ThrottleLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Default for ThrottleLevel {
    fn default() -> Self {
        ThrottleLevel::None
    }
}

impl From<ThrottleLevel> for u8 {
    fn from(level: ThrottleLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for ThrottleLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ThrottleLevel::None),
            1 => Ok(ThrottleLevel::Light),
            2 => Ok(ThrottleLevel::Moderate),
            3 => Ok(ThrottleLevel::Severe),
            other => Err(format!("invalid throttling level {}", other)),
        }
    }
}

impl std::fmt::Display for ThrottleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThrottleLevel::None => write!(f, "none"),
            ThrottleLevel::Light => write!(f, "light"),
            ThrottleLevel::Moderate => write!(f, "moderate"),
            ThrottleLevel::Severe => write!(f, "severe"),
        }
    }
}

/// Rejected threshold configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("{name} must be a finite, non-negative percentage (got {value})")]
    InvalidValue { name: &'static str, value: f64 },

    #[error("{resource} thresholds out of order: base {base} <= medium {medium} <= high {high} is required")]
    OutOfOrder {
        resource: &'static str,
        base: f64,
        medium: f64,
        high: f64,
    },
}

/// Escalation limits for one resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Limits {
    pub base: f64,
    pub medium: f64,
    pub high: f64,
}

impl Limits {
    fn new(
        resource: &'static str,
        names: [&'static str; 3],
        base: f64,
        medium: Option<f64>,
        high: Option<f64>,
    ) -> Result<Self, ThresholdError> {
        let medium = medium.unwrap_or(base + MEDIUM_OFFSET);
        let high = high.unwrap_or(base + HIGH_OFFSET);

        for (name, value) in names.into_iter().zip([base, medium, high]) {
            if !value.is_finite() || value < 0.0 {
                return Err(ThresholdError::InvalidValue { name, value });
            }
        }

        if !(base <= medium && medium <= high) {
            return Err(ThresholdError::OutOfOrder {
                resource,
                base,
                medium,
                high,
            });
        }

        Ok(Self { base, medium, high })
    }
}

/// Validated CPU and RAM thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThrottleThresholds {
    pub cpu: Limits,
    pub ram: Limits,
}

impl ThrottleThresholds {
    /// Thresholds with medium/high derived from the base limits
    pub fn new(cpu_limit: f64, ram_limit: f64) -> Result<Self, ThresholdError> {
        Self::with_escalation(cpu_limit, ram_limit, None, None, None, None)
    }

    /// Thresholds with optional explicit escalation limits
    pub fn with_escalation(
        cpu_limit: f64,
        ram_limit: f64,
        cpu_limit_medium: Option<f64>,
        ram_limit_medium: Option<f64>,
        cpu_limit_high: Option<f64>,
        ram_limit_high: Option<f64>,
    ) -> Result<Self, ThresholdError> {
        Ok(Self {
            cpu: Limits::new(
                "cpu",
                ["cpu_limit", "cpu_limit_medium", "cpu_limit_high"],
                cpu_limit,
                cpu_limit_medium,
                cpu_limit_high,
            )?,
            ram: Limits::new(
                "ram",
                ["ram_limit", "ram_limit_medium", "ram_limit_high"],
                ram_limit,
                ram_limit_medium,
                ram_limit_high,
            )?,
        })
    }
}

impl Default for ThrottleThresholds {
    fn default() -> Self {
        let limits = Limits {
            base: 70.0,
            medium: 70.0 + MEDIUM_OFFSET,
            high: 70.0 + HIGH_OFFSET,
        };
        Self {
            cpu: limits,
            ram: limits,
        }
    }
}

/// Classify a sample. The worst resource decides the level.
pub fn classify(sample: &ResourceSample, thresholds: &ThrottleThresholds) -> ThrottleLevel {
    let cpu = sample.cpu_percent;
    let ram = sample.ram_percent;
    let (cpu_t, ram_t) = (&thresholds.cpu, &thresholds.ram);

    if cpu <= cpu_t.base && ram <= ram_t.base {
        ThrottleLevel::None
    } else if cpu > cpu_t.high || ram > ram_t.high {
        ThrottleLevel::Severe
    } else if cpu > cpu_t.medium || ram > ram_t.medium {
        ThrottleLevel::Moderate
    } else {
        ThrottleLevel::Light
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: f64, ram: f64) -> ResourceSample {
        ResourceSample::now(cpu, ram)
    }

    #[test]
    fn test_default_escalation_offsets() {
        let t = ThrottleThresholds::new(70.0, 60.0).unwrap();
        assert_eq!(t.cpu.medium, 75.0);
        assert_eq!(t.cpu.high, 80.0);
        assert_eq!(t.ram.medium, 65.0);
        assert_eq!(t.ram.high, 70.0);
    }

    #[test]
    fn test_within_base_limits_is_none() {
        let t = ThrottleThresholds::new(70.0, 70.0).unwrap();
        assert_eq!(classify(&sample(0.0, 0.0), &t), ThrottleLevel::None);
        assert_eq!(classify(&sample(70.0, 70.0), &t), ThrottleLevel::None);
        assert_eq!(classify(&sample(69.9, 12.0), &t), ThrottleLevel::None);
    }

    #[test]
    fn test_escalation_tiers() {
        let t = ThrottleThresholds::new(70.0, 70.0).unwrap();
        assert_eq!(classify(&sample(72.0, 10.0), &t), ThrottleLevel::Light);
        assert_eq!(classify(&sample(75.0, 10.0), &t), ThrottleLevel::Light);
        assert_eq!(classify(&sample(77.0, 10.0), &t), ThrottleLevel::Moderate);
        assert_eq!(classify(&sample(80.0, 10.0), &t), ThrottleLevel::Moderate);
        assert_eq!(classify(&sample(80.1, 10.0), &t), ThrottleLevel::Severe);
    }

    #[test]
    fn test_single_resource_above_high_is_severe() {
        let t = ThrottleThresholds::new(70.0, 70.0).unwrap();
        assert_eq!(classify(&sample(95.0, 10.0), &t), ThrottleLevel::Severe);
        assert_eq!(classify(&sample(5.0, 99.0), &t), ThrottleLevel::Severe);
    }

    #[test]
    fn test_explicit_escalation_limits() {
        let t = ThrottleThresholds::with_escalation(
            50.0,
            70.0,
            Some(60.0),
            None,
            Some(90.0),
            None,
        )
        .unwrap();
        assert_eq!(classify(&sample(55.0, 0.0), &t), ThrottleLevel::Light);
        assert_eq!(classify(&sample(85.0, 0.0), &t), ThrottleLevel::Moderate);
        assert_eq!(classify(&sample(91.0, 0.0), &t), ThrottleLevel::Severe);
    }

    #[test]
    fn test_monotonic_in_each_metric() {
        let t = ThrottleThresholds::new(70.0, 60.0).unwrap();
        for fixed in [0.0, 40.0, 62.0, 66.0, 71.0, 100.0] {
            let mut previous = ThrottleLevel::None;
            let mut previous_ram = ThrottleLevel::None;
            for step in 0..=200 {
                let value = step as f64 * 0.5;
                let level = classify(&sample(value, fixed), &t);
                assert!(level >= previous, "cpu={} ram={}", value, fixed);
                previous = level;

                let level = classify(&sample(fixed, value), &t);
                assert!(level >= previous_ram, "cpu={} ram={}", fixed, value);
                previous_ram = level;
            }
        }
    }

    #[test]
    fn test_medium_below_base_is_rejected() {
        let err = ThrottleThresholds::with_escalation(70.0, 70.0, Some(65.0), None, None, None)
            .unwrap_err();
        assert!(matches!(err, ThresholdError::OutOfOrder { resource: "cpu", .. }));
    }

    #[test]
    fn test_high_below_medium_is_rejected() {
        let err =
            ThrottleThresholds::with_escalation(70.0, 70.0, None, Some(90.0), None, Some(85.0))
                .unwrap_err();
        assert!(matches!(err, ThresholdError::OutOfOrder { resource: "ram", .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ThrottleThresholds::new(f64::NAN, 70.0),
            Err(ThresholdError::InvalidValue { name: "cpu_limit", .. })
        ));
        assert!(ThrottleThresholds::new(70.0, -1.0).is_err());
    }

    #[test]
    fn test_sample_is_clamped() {
        let s = sample(130.0, -4.0);
        assert_eq!(s.cpu_percent, 100.0);
        assert_eq!(s.ram_percent, 0.0);
    }

    #[test]
    fn test_level_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&ThrottleLevel::Moderate).unwrap(), "2");
        let level: ThrottleLevel = serde_json::from_str("3").unwrap();
        assert_eq!(level, ThrottleLevel::Severe);
        assert!(serde_json::from_str::<ThrottleLevel>("4").is_err());
    }
}
