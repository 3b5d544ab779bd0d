//! Subscription plans and the per-request plan context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tier::Tier;

/// A subscription plan, ordered `Free < Pro < Max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Free,
    Pro,
    Max,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Pro => "PRO",
            Self::Max => "MAX",
        }
    }

    /// The tier a plan maps to when the task is not pinned.
    pub fn default_tier(&self) -> Tier {
        match self {
            Self::Free => Tier::Medium,
            Self::Pro | Self::Max => Tier::High,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "PRO" => Ok(Self::Pro),
            "MAX" => Ok(Self::Max),
            other => Err(format!("unknown plan '{other}' (expected FREE, PRO or MAX)")),
        }
    }
}

/// Plan information attached to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanContext {
    pub plan: Plan,

    /// Model the user picked in the UI, if any. Used for capability checks
    /// in place of the resolved model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model_id: Option<String>,

    /// Provider-native tools (e.g. gateway-side web plugins) the caller asked for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_tool_ids: Vec<String>,
}

impl PlanContext {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            selected_model_id: None,
            provider_tool_ids: Vec::new(),
        }
    }

    pub fn with_selected_model(mut self, model: impl Into<String>) -> Self {
        self.selected_model_id = Some(model.into());
        self
    }
}
