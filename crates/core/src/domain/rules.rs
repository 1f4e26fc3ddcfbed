use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    OrderStatus,
    Escalation,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderStatus => "order_status",
            Self::Escalation => "escalation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "order_status" => Some(Self::OrderStatus),
            "escalation" => Some(Self::Escalation),
            _ => None,
        }
    }
}

/// Per-user, per-agent configuration. Read once per run, never mutated by
/// the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRule {
    pub user_id: String,
    pub agent_type: AgentType,
    pub enabled: bool,
    pub requires_approval: bool,
}

impl AgentRule {
    /// The rule applied when no explicit rule exists. Never auto-send
    /// without explicit opt-in.
    pub fn default_for(user_id: impl Into<String>, agent_type: AgentType) -> Self {
        Self { user_id: user_id.into(), agent_type, enabled: true, requires_approval: true }
    }
}
