pub mod orchestrator;
pub mod registry;
pub mod resolver;

pub use orchestrator::{CreateTicketRequest, WorkflowError, WorkflowOrchestrator};
pub use registry::ApprovalRegistry;
pub use resolver::RecipientResolver;
