//! Sentiment-driven escalation priority.
//!
//! The thresholds that elevate a negative inquiry to a higher review
//! priority are configuration, not constants: the upstream behavior
//! differed between code paths, so operators decide.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Output of the sentiment collaborator for a piece of customer text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: String,
    pub confidence_pct: u8,
    pub per_class: BTreeMap<String, u8>,
}

impl SentimentScore {
    pub fn is_negative(&self) -> bool {
        matches!(self.label.to_ascii_lowercase().as_str(), "negative" | "angry" | "frustrated")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPriority {
    Normal,
    High,
    Urgent,
}

impl EscalationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Confidence thresholds (in percent) at which a negative sentiment
/// elevates priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityThresholds {
    pub high_pct: u8,
    pub urgent_pct: u8,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self { high_pct: 70, urgent_pct: 80 }
    }
}

impl PriorityThresholds {
    /// Map a sentiment score to a review priority. Only negative labels
    /// elevate; everything else stays at normal priority.
    pub fn elevate(&self, score: &SentimentScore) -> EscalationPriority {
        if !score.is_negative() {
            return EscalationPriority::Normal;
        }
        if score.confidence_pct >= self.urgent_pct {
            EscalationPriority::Urgent
        } else if score.confidence_pct >= self.high_pct {
            EscalationPriority::High
        } else {
            EscalationPriority::Normal
        }
    }
}
