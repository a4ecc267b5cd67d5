//! Status model: phases, operations, conditions and classified errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ObjectMeta, OPERATION_ANNOTATION};

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of an installation or execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    #[default]
    Pending,
    Progressing,
    Completed,
    Failed,
    Deleting,
}

impl Phase {
    /// Completed and Failed are final until the generation moves.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Progressing => "Progressing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Operation
// =============================================================================

/// Operation requested through the operation annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operation {
    /// No annotation: reconcile only if stale.
    #[default]
    None,
    /// Reconcile once, then clear the annotation.
    Reconcile,
    /// Reset to Pending and reprocess even if already final.
    ForceReconcile,
    /// Recognized but not acted upon.
    Abort,
}

impl Operation {
    pub const RECONCILE: &'static str = "reconcile";
    pub const FORCE_RECONCILE: &'static str = "force-reconcile";
    pub const ABORT: &'static str = "abort";

    /// Decodes the operation annotation of an object.
    ///
    /// Unrecognized values decode to [`Operation::None`].
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        match meta.annotations.get(OPERATION_ANNOTATION).map(String::as_str) {
            Some(value) => Self::parse(value).unwrap_or_else(|| {
                tracing::warn!(
                    object = %meta.key(),
                    value,
                    "Ignoring unknown operation annotation"
                );
                Self::None
            }),
            None => Self::None,
        }
    }

    /// Parses an annotation value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            Self::RECONCILE => Some(Self::Reconcile),
            Self::FORCE_RECONCILE => Some(Self::ForceReconcile),
            Self::ABORT => Some(Self::Abort),
            _ => None,
        }
    }

    /// The annotation value for this operation.
    pub fn annotation_value(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Reconcile => Some(Self::RECONCILE),
            Self::ForceReconcile => Some(Self::FORCE_RECONCILE),
            Self::Abort => Some(Self::ABORT),
        }
    }
}

// =============================================================================
// Conditions
// =============================================================================

/// Well-known condition types.
pub mod condition_types {
    /// Progress of the teardown protocol.
    pub const DELETED: &str = "Deleted";
    /// Whether the blueprint and component could be resolved.
    pub const BLUEPRINT_RESOLVED: &str = "BlueprintResolved";
}

/// Well-known condition reasons.
pub mod condition_reasons {
    pub const SIBLING_IMPORT: &str = "SiblingImport";
    pub const WAITING_FOR_DELETION: &str = "WaitingForDeletion";
    pub const RESOLVED: &str = "Resolved";
    pub const RESOLUTION_FAILED: &str = "ResolutionFailed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// An informational status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Sets or updates a condition in place.
///
/// The transition time only moves when the status value flips, so repeated
/// calls with the same status do not produce a status diff.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
) {
    let message = message.into();
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition_type)
    {
        Some(existing) => {
            if existing.status != status {
                existing.status = status;
                existing.last_transition_time = Utc::now();
            }
            existing.reason = reason.to_string();
            existing.message = message;
        }
        None => conditions.push(Condition {
            condition_type: condition_type.to_string(),
            status,
            reason: reason.to_string(),
            message,
            last_transition_time: Utc::now(),
        }),
    }
}

pub fn get_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

// =============================================================================
// Errors
// =============================================================================

/// Classification attached to a recorded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Invalid or unparseable configuration; not retried on a timer.
    #[serde(rename = "ERR_CONFIGURATION_PROBLEM")]
    ConfigurationProblem,
    #[serde(rename = "ERR_INTERNAL_PROBLEM")]
    InternalProblem,
    #[serde(rename = "ERR_TIMEOUT")]
    Timeout,
}

/// The last error observed while reconciling an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub operation: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<ErrorCode>,
    pub last_update_time: DateTime<Utc>,
}

impl LastError {
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.codes.contains(&code)
    }
}

/// Returns the updated last error, keeping the previous timestamp when the
/// error is unchanged.
pub fn update_last_error(
    previous: Option<&LastError>,
    operation: &str,
    reason: &str,
    message: impl Into<String>,
    codes: Vec<ErrorCode>,
) -> LastError {
    let message = message.into();
    let last_update_time = match previous {
        Some(prev)
            if prev.operation == operation
                && prev.reason == reason
                && prev.message == message
                && prev.codes == codes =>
        {
            prev.last_update_time
        }
        _ => Utc::now(),
    };
    LastError {
        operation: operation.to_string(),
        reason: reason.to_string(),
        message,
        codes,
        last_update_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, Operation::None)]
    #[case(Some("reconcile"), Operation::Reconcile)]
    #[case(Some("force-reconcile"), Operation::ForceReconcile)]
    #[case(Some("abort"), Operation::Abort)]
    #[case(Some("explode"), Operation::None)]
    fn test_operation_decoding(#[case] annotation: Option<&str>, #[case] expected: Operation) {
        let mut meta = ObjectMeta::new("default", "a");
        if let Some(value) = annotation {
            meta.annotations
                .insert(OPERATION_ANNOTATION.to_string(), value.to_string());
        }
        assert_eq!(Operation::from_meta(&meta), expected);
    }

    #[rstest]
    #[case(Phase::Pending, false)]
    #[case(Phase::Progressing, false)]
    #[case(Phase::Completed, true)]
    #[case(Phase::Failed, true)]
    #[case(Phase::Deleting, false)]
    fn test_phase_is_final(#[case] phase: Phase, #[case] expected: bool) {
        assert_eq!(phase.is_final(), expected);
    }

    #[test]
    fn test_set_condition_keeps_transition_time_on_same_status() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            condition_types::DELETED,
            ConditionStatus::False,
            condition_reasons::SIBLING_IMPORT,
            "b imports foo",
        );
        let first = conditions[0].last_transition_time;
        set_condition(
            &mut conditions,
            condition_types::DELETED,
            ConditionStatus::False,
            condition_reasons::SIBLING_IMPORT,
            "b imports foo",
        );
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first);
    }

    #[test]
    fn test_update_last_error_keeps_time_for_same_error() {
        let first = update_last_error(
            None,
            "Reconcile",
            "ResolveBlueprint",
            "not found",
            vec![ErrorCode::ConfigurationProblem],
        );
        let second = update_last_error(
            Some(&first),
            "Reconcile",
            "ResolveBlueprint",
            "not found",
            vec![ErrorCode::ConfigurationProblem],
        );
        assert_eq!(first, second);
        assert!(second.has_code(ErrorCode::ConfigurationProblem));
    }

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_string(&ErrorCode::ConfigurationProblem).unwrap();
        assert_eq!(json, "\"ERR_CONFIGURATION_PROBLEM\"");
    }
}
