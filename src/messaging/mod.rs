pub mod kafka;
pub mod publisher;
pub mod relay;

pub use kafka::KafkaEventPublisher;
pub use publisher::{EventPublisher, LoggingPublisher, PublishError, RecordingPublisher};
pub use relay::{DrainReport, OutboxRelay, RelayConfig};
