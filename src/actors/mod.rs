pub mod relay_actor;

pub use relay_actor::{DrainNow, GetRelayStatus, OutboxRelayActor, RelayStatus};
