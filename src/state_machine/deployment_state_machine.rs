use super::{
    errors::{StateMachineError, StateMachineResult},
    events::DeploymentEvent,
    guards::{OperationCompleteGuard, ResourcesPlannedGuard, StateGuard},
    states::DeploymentStatus,
};
use crate::models::Deployment;
use chrono::Utc;
use tracing::{debug, info};

/// Deployment lifecycle state machine.
///
/// Edges: NEW→PLANNED→UP, UP→{ALERT, UNREACHABLE, DOWN}, degraded→UP|DELETED,
/// PLANNED|UP→DELETED, any non-DELETED→FAILED, FAILED→UP|DELETED.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentStateMachine;

impl DeploymentStateMachine {
    /// Apply `event` to `deployment`, running guards first
    pub fn transition(
        deployment: &mut Deployment,
        event: DeploymentEvent,
    ) -> StateMachineResult<DeploymentStatus> {
        let current = deployment.status;
        let target = Self::determine_target_state(current, &event)?;

        Self::check_guards(deployment, target, &event)?;

        deployment.status = target;
        deployment.updated_at = Utc::now();

        if current != target {
            info!(
                deployment_id = %deployment.id,
                from = %current,
                to = %target,
                event = event.event_type(),
                reason = event.error_message(),
                "Deployment status transition"
            );
        } else {
            debug!(deployment_id = %deployment.id, status = %target, "Deployment status unchanged");
        }

        Ok(target)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current: DeploymentStatus,
        event: &DeploymentEvent,
    ) -> StateMachineResult<DeploymentStatus> {
        use DeploymentStatus as S;

        let target = match (current, event) {
            (S::New, DeploymentEvent::Plan) => S::Planned,

            (S::Planned | S::Failed, DeploymentEvent::Complete) => S::Up,

            (S::Up, DeploymentEvent::Alert) => S::Alert,
            (S::Up, DeploymentEvent::Unreachable) => S::Unreachable,
            (S::Up, DeploymentEvent::Down) => S::Down,
            (S::Alert | S::Unreachable | S::Down, DeploymentEvent::Recover) => S::Up,

            (
                S::Planned | S::Up | S::Failed | S::Alert | S::Unreachable | S::Down,
                DeploymentEvent::Delete,
            ) => S::Deleted,

            (from, DeploymentEvent::Fail(_)) if from != S::Deleted => S::Failed,

            (from, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    fn check_guards(
        deployment: &Deployment,
        target: DeploymentStatus,
        event: &DeploymentEvent,
    ) -> StateMachineResult<()> {
        match (target, event) {
            (DeploymentStatus::Planned, DeploymentEvent::Plan) => {
                ResourcesPlannedGuard.check(deployment)?;
            }
            (DeploymentStatus::Up, DeploymentEvent::Complete)
            | (DeploymentStatus::Deleted, DeploymentEvent::Delete) => {
                OperationCompleteGuard.check(deployment)?;
            }
            _ => {}
        }
        Ok(())
    }
}
