//! Build planning and CI workflow assembly for greenline.
//!
//! - [`BuildPlanner`] resolves declared units into artifacts and
//!   applications, deciding once whether each one changed
//! - [`WorkflowAssembler`] turns them into side effects for one unit, or
//!   into a CI workflow covering every unit

pub mod assembler;
pub mod error;
pub mod planner;

pub use assembler::{CliInvocation, UnitRequest, WorkflowAssembler, render_workflow};
pub use error::{PlanError, PlanResult};
pub use planner::BuildPlanner;
