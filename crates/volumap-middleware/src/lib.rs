//! `volumap-middleware` – transport layer for the mapping frontend.
//!
//! Sensor traffic never reaches the dispatcher directly: producers publish
//! [`SensorEvent`][volumap_types::SensorEvent]s onto the topic-routed
//! [`EventBus`][bus::EventBus], and ingest tasks subscribe to the topics they
//! care about.  External sources are wrapped behind the
//! [`SensorAdapter`][adapter::SensorAdapter] trait; [`replay`] provides the
//! offline file-replay implementation.

pub mod adapter;
pub mod bus;
pub mod replay;

pub use adapter::SensorAdapter;
pub use bus::{EventBus, Topic, TopicReceiver};
pub use replay::ReplayAdapter;
