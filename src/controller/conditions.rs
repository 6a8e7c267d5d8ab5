//! LogStorage status conditions following Kubernetes API conventions

use chrono::Utc;

use super::config::Readiness;
use super::lifecycle::{LifecyclePhase, Reconciliation};
use crate::crd::{Condition, LogStorageStatus};
use crate::error::Error;

pub const CONDITION_TYPE_READY: &str = "Ready";
pub const CONDITION_TYPE_PROGRESSING: &str = "Progressing";
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// Values of `status.state`
pub const STATE_READY: &str = "Ready";
pub const STATE_PROGRESSING: &str = "Progressing";
pub const STATE_TERMINATING: &str = "Terminating";
pub const STATE_DEGRADED: &str = "Degraded";

fn condition(type_: &str, status: &str, reason: &str, message: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: Utc::now().to_rfc3339(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: None,
    }
}

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status changes.
pub fn set_condition(conditions: &mut Vec<Condition>, update: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == update.type_) {
        Some(existing) => {
            if existing.status != update.status {
                existing.last_transition_time = update.last_transition_time;
            }
            existing.status = update.status;
            existing.reason = update.reason;
            existing.message = update.message;
        }
        None => conditions.push(update),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

pub fn ready_condition(status: bool, reason: &str, message: &str) -> Condition {
    let status = if status {
        CONDITION_STATUS_TRUE
    } else {
        CONDITION_STATUS_FALSE
    };
    condition(CONDITION_TYPE_READY, status, reason, message)
}

pub fn progressing_condition(reason: &str, message: &str) -> Condition {
    condition(CONDITION_TYPE_PROGRESSING, CONDITION_STATUS_TRUE, reason, message)
}

pub fn degraded_condition(reason: &str, message: &str) -> Condition {
    condition(CONDITION_TYPE_DEGRADED, CONDITION_STATUS_TRUE, reason, message)
}

pub fn not_degraded_condition() -> Condition {
    condition(
        CONDITION_TYPE_DEGRADED,
        CONDITION_STATUS_FALSE,
        "NoIssues",
        "No degradation detected",
    )
}

/// Status to publish on the LogStorage after a reconcile pass
///
/// Conditions already on `previous` keep their transition time when their
/// status is unchanged.
pub fn status_for(
    previous: Option<&LogStorageStatus>,
    readiness: Readiness,
    result: &Result<Reconciliation, Error>,
) -> LogStorageStatus {
    let mut status = previous.cloned().unwrap_or_default();

    let (state, updates) = match result {
        Err(err) => (
            STATE_DEGRADED,
            vec![
                ready_condition(false, err.reason(), "LogStorage could not be rendered"),
                degraded_condition(err.reason(), &err.to_string()),
            ],
        ),
        Ok(rec) if rec.phase.is_terminating() => (
            STATE_TERMINATING,
            vec![
                ready_condition(false, "Terminating", "LogStorage is being deleted"),
                not_degraded_condition(),
            ],
        ),
        Ok(_) if readiness.all_ready() => (
            STATE_READY,
            vec![
                ready_condition(true, "AllReady", "Elasticsearch and Kibana are ready"),
                not_degraded_condition(),
            ],
        ),
        Ok(_) => (
            STATE_PROGRESSING,
            vec![
                ready_condition(false, "Waiting", "Waiting for Elasticsearch and Kibana"),
                progressing_condition("Rendered", "Manifests rendered, waiting for ECK"),
                not_degraded_condition(),
            ],
        ),
    };

    if state != STATE_PROGRESSING {
        status
            .conditions
            .retain(|c| c.type_ != CONDITION_TYPE_PROGRESSING);
    }
    for update in updates {
        set_condition(&mut status.conditions, update);
    }
    status.state = Some(state.to_string());
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn released() -> Result<Reconciliation, Error> {
        Ok(Reconciliation {
            phase: LifecyclePhase::Released,
            to_create: Vec::new(),
            to_delete: Vec::new(),
            finalizers: Vec::new(),
        })
    }

    fn provisioned() -> Result<Reconciliation, Error> {
        Ok(Reconciliation {
            phase: LifecyclePhase::Provisioning,
            to_create: Vec::new(),
            to_delete: Vec::new(),
            finalizers: Vec::new(),
        })
    }

    #[test]
    fn test_set_condition_adds_new() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, ready_condition(true, "AllReady", "ok"));
        assert_eq!(conditions.len(), 1);
        assert!(is_condition_true(&conditions, CONDITION_TYPE_READY));
    }

    #[test]
    fn test_set_condition_keeps_time_when_status_unchanged() {
        let mut conditions = vec![Condition {
            last_transition_time: "2024-01-01T00:00:00Z".to_string(),
            ..ready_condition(false, "Waiting", "waiting")
        }];
        set_condition(&mut conditions, ready_condition(false, "Waiting", "still waiting"));
        assert_eq!(conditions[0].last_transition_time, "2024-01-01T00:00:00Z");
        assert_eq!(conditions[0].message, "still waiting");

        set_condition(&mut conditions, ready_condition(true, "AllReady", "ready"));
        assert_ne!(conditions[0].last_transition_time, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_status_progressing_until_ready() {
        let waiting = status_for(None, Readiness::default(), &provisioned());
        assert_eq!(waiting.state.as_deref(), Some(STATE_PROGRESSING));
        assert!(is_condition_true(&waiting.conditions, CONDITION_TYPE_PROGRESSING));

        let ready = Readiness {
            elasticsearch: true,
            kibana: true,
        };
        let done = status_for(Some(&waiting), ready, &provisioned());
        assert_eq!(done.state.as_deref(), Some(STATE_READY));
        assert!(is_condition_true(&done.conditions, CONDITION_TYPE_READY));
        assert!(find_condition(&done.conditions, CONDITION_TYPE_PROGRESSING).is_none());
    }

    #[test]
    fn test_status_degraded_on_error() {
        let err = Error::validation("spec.nodes.count", "must not be negative", "fix it");
        let status = status_for(None, Readiness::default(), &Err(err));
        assert_eq!(status.state.as_deref(), Some(STATE_DEGRADED));
        let degraded = find_condition(&status.conditions, CONDITION_TYPE_DEGRADED).unwrap();
        assert_eq!(degraded.reason, "InvalidSpec");
        assert!(degraded.message.contains("spec.nodes.count"));
    }

    #[test]
    fn test_status_terminating() {
        let status = status_for(None, Readiness::default(), &released());
        assert_eq!(status.state.as_deref(), Some(STATE_TERMINATING));
        assert!(!is_condition_true(&status.conditions, CONDITION_TYPE_READY));
    }
}
