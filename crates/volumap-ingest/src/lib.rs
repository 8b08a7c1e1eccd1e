//! `volumap-ingest` – frame dispatch and map publication.
//!
//! Sits between the transport ([`volumap_middleware`]) and the occupancy
//! map:
//!
//! - [`engine`] – the [`MappingEngine`][engine::MappingEngine] seam the
//!   occupancy backend plugs into, plus the [`NullEngine`][engine::NullEngine]
//!   stand-in.
//! - [`dispatcher`] – [`FrameDispatcher`][dispatcher::FrameDispatcher]:
//!   gates disparity frames on calibration readiness, registers every frame
//!   into the world frame and forwards it to the engine.
//! - [`commands`] – runtime map services (reset, save/load, box occupancy,
//!   snapshot requests).
//! - [`publisher`] – [`MapPublisher`][publisher::MapPublisher]: periodic and
//!   on-demand emission of map snapshots onto the bus.

pub mod commands;
pub mod dispatcher;
pub mod engine;
pub mod publisher;

pub use commands::{CommandHandler, CommandOutcome};
pub use dispatcher::{DispatchOutcome, FrameDispatcher};
pub use engine::{MappingEngine, NullEngine};
pub use publisher::MapPublisher;
