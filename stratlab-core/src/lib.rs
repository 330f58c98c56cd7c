//! StratLab Core — strategy specification, queue routing, platform configuration.
//!
//! This crate holds the types every other crate agrees on:
//! - `StrategySpec`: the serializable strategy contract sent to the engine
//! - `QueueName` / `RunMode`: closed enums for job routing and submission flags
//! - `PlatformConfig`: endpoints and cadence, built once at process start

pub mod config;
pub mod queue;
pub mod spec;

pub use config::{ConfigError, Endpoint, PlatformConfig};
pub use queue::{QueueName, RunMode, UnknownQueue, UnknownRunMode};
pub use spec::{json_kind, DataIndicator, DatasetBinding, SpecError, StrategySpec};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn spec_types_are_send_sync() {
        assert_send::<StrategySpec>();
        assert_sync::<StrategySpec>();
        assert_send::<SpecError>();
        assert_sync::<SpecError>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PlatformConfig>();
        assert_sync::<PlatformConfig>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }
}
