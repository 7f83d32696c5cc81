//! The messaging engine: queues, topics, and the periodic housekeeping
//! ticker that drives visibility expiry, retention, and redrive.

pub mod queue;
pub mod ticker;
pub mod topic;

pub use queue::{QueueHandle, ReceivedMessage, SendMessageOutcome};
pub use ticker::spawn_ticker;
pub use topic::{PublishOutcome, TopicHandle};
