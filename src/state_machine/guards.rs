use super::errors::{guard_failed, GuardResult};
use crate::models::Deployment;
use crate::state_machine::WorkflowStatus;

/// Trait for implementing state transition guards
pub trait StateGuard<T> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// A deployment may only be marked PLANNED once it has resources
pub struct ResourcesPlannedGuard;

impl StateGuard<Deployment> for ResourcesPlannedGuard {
    fn check(&self, deployment: &Deployment) -> GuardResult<()> {
        if deployment.resources.is_empty() {
            return Err(guard_failed(
                self.description(),
                format!("Deployment {} has no planned resources", deployment.id),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Deployment must have planned resources"
    }
}

/// UP and DELETED require the operation that produced them to be complete
pub struct OperationCompleteGuard;

impl StateGuard<Deployment> for OperationCompleteGuard {
    fn check(&self, deployment: &Deployment) -> GuardResult<()> {
        match &deployment.operation {
            Some(op) if op.status == WorkflowStatus::Complete => Ok(()),
            Some(op) => Err(guard_failed(
                self.description(),
                format!(
                    "Operation {} for deployment {} is {}",
                    op.workflow_id, deployment.id, op.status
                ),
            )),
            None => Err(guard_failed(
                self.description(),
                format!("Deployment {} has no operation", deployment.id),
            )),
        }
    }

    fn description(&self) -> &'static str {
        "Active operation must be complete"
    }
}
