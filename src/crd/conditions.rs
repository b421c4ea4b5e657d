//! Status conditions shared by all request kinds
//!
//! External consumers poll or watch conditions to learn the outcome of a
//! request, so the vocabulary is fixed: one `Fulfilled` condition with a
//! `True`/`False`/`Unknown` status and free-text reason and message.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set once a request has been processed
pub const CONDITION_FULFILLED: &str = "Fulfilled";

/// Condition status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single observation about the state of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, unique within one conditions list
    pub r#type: String,
    /// Status: True, False, Unknown
    pub status: ConditionStatus,
    /// Time of the last status transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Machine-readable reason for the last transition
    pub reason: String,
    /// Human-readable details
    pub message: String,
}

impl Condition {
    /// Create a condition stamped with the current time
    pub fn new(
        r#type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            status,
            last_transition_time: Some(Utc::now()),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// The condition recorded when a request has been fulfilled
    pub fn fulfilled() -> Self {
        Self::new(
            CONDITION_FULFILLED,
            ConditionStatus::True,
            "Fulfilled",
            "The request has been fulfilled",
        )
    }
}

/// Insert or replace a condition, keyed by type.
///
/// Replacing a condition with the same status keeps the original transition
/// time; only an actual status flip re-stamps it.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            let transition_time = if existing.status == condition.status {
                existing.last_transition_time
            } else {
                condition.last_transition_time
            };
            *existing = condition;
            existing.last_transition_time = transition_time;
        }
        None => conditions.push(condition),
    }
}

/// Look up a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Access to the conditions list of a status payload.
///
/// Implemented by every request status so the engine can record handler
/// failures without knowing the concrete kind.
pub trait HasConditions {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// Whether the `Fulfilled` condition is present and `True`
    fn is_fulfilled(&self) -> bool {
        find_condition(self.conditions(), CONDITION_FULFILLED)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}
