pub mod actions;
pub mod machine;

pub use actions::{ActionPayload, ActionType};
pub use machine::{plan_transition, GuardContext, TransitionError, TransitionPlan, TransitionStamp};
