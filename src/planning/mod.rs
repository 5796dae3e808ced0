//! # Deployment Planning
//!
//! Turns a NEW deployment into a resource graph.
//!
//! - [`planner`]: provider selection, template generation and the commit to PLANNED
//! - [`requirements`]: bounded-pass binding of requires/provides
//! - [`settings`]: layered resolution of resource settings
//! - [`dependency_check`]: relation cycle detection
//! - [`verification`]: optional concurrent provider access and limit checks

pub mod dependency_check;
pub mod planner;
pub mod requirements;
pub mod settings;
pub mod verification;

pub use dependency_check::check_circular_dependencies;
pub use planner::{PlanOptions, Planner};
pub use requirements::PendingRequirement;
pub use settings::{ResolvedSetting, SettingSource, SettingsResolver};
pub use verification::{verify_providers, VerificationRequest};
