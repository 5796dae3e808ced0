//! # Resource Graph Model
//!
//! Pure data structures for blueprints, environments, deployments and the
//! resources planned for them. Behavior is limited to invariant checks and
//! builders.

pub mod blueprint;
pub mod context;
pub mod deployment;
pub mod environment;
pub mod message;
pub mod operation;
pub mod resource;

pub use blueprint::{
    Blueprint, BlueprintOption, Component, Constraint, Interface, OptionTarget, RelationKind,
    Requirement, ServiceDefinition,
};
pub use context::RequestContext;
pub use deployment::{Deployment, PlanRecord, ResolvedRequirement, ServicePlan};
pub use environment::{Environment, ProviderBinding};
pub use message::{Message, MessageLevel};
pub use operation::{Operation, OperationError, WorkflowType};
pub use resource::{Relation, Resource, ResourceGraph, ResourceTemplate};
