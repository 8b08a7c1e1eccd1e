//! Map publication orchestration.
//!
//! Mirrors the map's service surface outward: on demand (via
//! [`crate::commands`]) or on a fixed timer, take a snapshot of the engine
//! and emit it on the [`Topic::MapSnapshots`] lane for visualisation and
//! downstream consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use volumap_middleware::{EventBus, Topic};
use volumap_types::{MapSnapshot, SensorEvent, SensorPayload};

use crate::engine::MappingEngine;

/// Emits occupancy-map snapshots onto the bus.
pub struct MapPublisher<E> {
    engine: Arc<Mutex<E>>,
    bus: EventBus,
    world_frame: String,
}

impl<E> Clone for MapPublisher<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            bus: self.bus.clone(),
            world_frame: self.world_frame.clone(),
        }
    }
}

impl<E: MappingEngine> MapPublisher<E> {
    pub fn new(engine: Arc<Mutex<E>>, bus: EventBus, world_frame: impl Into<String>) -> Self {
        Self {
            engine,
            bus,
            world_frame: world_frame.into(),
        }
    }

    /// Take a snapshot and publish it, returning the snapshot.
    ///
    /// Zero subscribers is normal (e.g. no visualiser attached).
    pub fn publish_all(&self) -> MapSnapshot {
        let snapshot = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(&self.world_frame);
        let receivers = self.bus.publish_to(
            Topic::MapSnapshots,
            SensorEvent::now(
                "volumap-ingest::publisher",
                SensorPayload::MapSnapshot(snapshot.clone()),
            ),
        );
        debug!(
            receivers,
            occupied = snapshot.occupied.len(),
            free = snapshot.free.len(),
            "published map snapshot"
        );
        snapshot
    }

    /// Publish periodically at `frequency_hz` until `shutdown` is set.
    ///
    /// A non-positive frequency disables periodic publication entirely;
    /// snapshots then only go out on demand.
    pub async fn run(self, frequency_hz: f64, shutdown: Arc<AtomicBool>) {
        if frequency_hz <= 0.0 {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / frequency_hz);
        info!(frequency_hz, "periodic map publication enabled");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the first
        // snapshot goes out one full period after startup.
        ticker.tick().await;

        while !shutdown.load(Ordering::Relaxed) {
            ticker.tick().await;
            self.publish_all();
        }
    }
}
