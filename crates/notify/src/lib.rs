pub mod channel;
pub mod dispatch;
pub mod http;
pub mod queue;

pub use channel::{DeliveryError, NoopNotifier, NotificationMessage, Notifier, RecordingNotifier};
pub use dispatch::{DispatchSummary, NotificationDispatcher};
pub use http::HttpNotifier;
pub use queue::TaskQueue;
