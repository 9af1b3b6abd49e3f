pub mod http;
pub mod status;
pub mod sync;
pub mod system;

pub use http::HttpWorkOrderSystem;
pub use status::external_status_code;
pub use sync::{SyncAdapter, SyncOutcome};
pub use system::{InMemoryWorkOrderSystem, WorkOrderError, WorkOrderSnapshot, WorkOrderSystem};
