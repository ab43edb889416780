//! CrudExecutor and the structural validation collaborator it calls.

mod crud;
mod validation;
pub use crud::{parse_id, CrudExecutor};
pub use validation::{RuleSchema, Schema};
