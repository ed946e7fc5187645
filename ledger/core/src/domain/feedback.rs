// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Feedback & Reinforcement Policy
//!
//! Positive feedback acts like a dopamine hit on a memory's confidence,
//! negative feedback like cortisol. Corrections replace the content outright.

use serde::{Deserialize, Serialize};

use super::memory::Confidence;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackKind {
    Positive,
    Negative,
    Correction { content: String },
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Positive => "positive",
            FeedbackKind::Negative => "negative",
            FeedbackKind::Correction { .. } => "correction",
        }
    }
}

/// Strength of a feedback signal, within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FeedbackWeight(f64);

impl FeedbackWeight {
    pub const FULL: FeedbackWeight = FeedbackWeight(1.0);

    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(format!("feedback weight {} outside [0, 1]", value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for FeedbackWeight {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        FeedbackWeight::new(value)
    }
}

impl From<FeedbackWeight> for f64 {
    fn from(w: FeedbackWeight) -> f64 {
        w.0
    }
}

/// Additive, clamped confidence adjustment.
///
/// `new = clamp(old ± step * weight, 0, 1)`. Corrections ignore the old value
/// and land on `correction_confidence`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReinforcementPolicy {
    pub step: f64,
    pub correction_confidence: Confidence,
}

impl Default for ReinforcementPolicy {
    fn default() -> Self {
        Self {
            step: 0.15,
            correction_confidence: Confidence::clamped(0.5),
        }
    }
}

impl ReinforcementPolicy {
    pub fn adjust(&self, current: Confidence, kind: &FeedbackKind, weight: FeedbackWeight) -> Confidence {
        let delta = self.step * weight.value();
        match kind {
            FeedbackKind::Positive => Confidence::clamped(round(current.value() + delta)),
            FeedbackKind::Negative => Confidence::clamped(round(current.value() - delta)),
            FeedbackKind::Correction { .. } => self.correction_confidence,
        }
    }
}

// Keeps 0.5 + 0.15 - 0.15 landing exactly on 0.5 after repeated steps.
fn round(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(v: f64) -> Confidence {
        Confidence::new(v).unwrap()
    }

    #[test]
    fn test_positive_then_negative_round_trips() {
        let policy = ReinforcementPolicy::default();
        let up = policy.adjust(c(0.5), &FeedbackKind::Positive, FeedbackWeight::FULL);
        assert_eq!(up, c(0.65));
        let down = policy.adjust(up, &FeedbackKind::Negative, FeedbackWeight::FULL);
        assert_eq!(down, c(0.5));
    }

    #[test]
    fn test_adjust_saturates() {
        let policy = ReinforcementPolicy::default();
        assert_eq!(policy.adjust(c(0.95), &FeedbackKind::Positive, FeedbackWeight::FULL), c(1.0));
        assert_eq!(policy.adjust(c(0.05), &FeedbackKind::Negative, FeedbackWeight::FULL), c(0.0));
    }

    #[test]
    fn test_weight_scales_step() {
        let policy = ReinforcementPolicy::default();
        let half = FeedbackWeight::new(0.5).unwrap();
        assert_eq!(policy.adjust(c(0.5), &FeedbackKind::Positive, half), c(0.575));
        let zero = FeedbackWeight::new(0.0).unwrap();
        assert_eq!(policy.adjust(c(0.5), &FeedbackKind::Negative, zero), c(0.5));
    }

    #[test]
    fn test_correction_resets() {
        let policy = ReinforcementPolicy::default();
        let kind = FeedbackKind::Correction { content: "fixed".into() };
        assert_eq!(policy.adjust(c(0.9), &kind, FeedbackWeight::FULL), c(0.5));
    }

    #[test]
    fn test_weight_validation() {
        assert!(FeedbackWeight::new(1.5).is_err());
        assert!(FeedbackWeight::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_feedback_kind_wire_format() {
        let kind: FeedbackKind =
            serde_json::from_str(r#"{"type":"correction","content":"x"}"#).unwrap();
        assert_eq!(kind.as_str(), "correction");
        let kind: FeedbackKind = serde_json::from_str(r#"{"type":"positive"}"#).unwrap();
        assert_eq!(kind, FeedbackKind::Positive);
    }
}
