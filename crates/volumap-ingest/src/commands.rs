//! Runtime map services.
//!
//! The original node exposed these as service endpoints; here they are a
//! [`MapCommand`] handler the node (or an adapter) invokes directly.  Every
//! engine result is surfaced to the caller – including box-occupancy
//! mutations, which are easy to fire-and-forget by accident.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;
use volumap_types::geometry::Vec3;
use volumap_types::{MapCommand, MapError, MapSnapshot};

use crate::engine::MappingEngine;
use crate::publisher::MapPublisher;

/// What a successfully handled command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The command completed with no data to return.
    Done,
    /// The command produced a map snapshot for the caller.
    Snapshot(MapSnapshot),
}

/// Applies [`MapCommand`]s to the engine and the publication orchestrator.
pub struct CommandHandler<E> {
    engine: Arc<Mutex<E>>,
    publisher: MapPublisher<E>,
    world_frame: String,
}

impl<E: MappingEngine> CommandHandler<E> {
    pub fn new(
        engine: Arc<Mutex<E>>,
        publisher: MapPublisher<E>,
        world_frame: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            publisher,
            world_frame: world_frame.into(),
        }
    }

    /// Execute one command against the map.
    ///
    /// # Errors
    ///
    /// Propagates the engine's failure for persistence and box-occupancy
    /// operations; the caller decides how to report it.
    pub fn handle(&self, command: MapCommand) -> Result<CommandOutcome, MapError> {
        match command {
            MapCommand::Reset => {
                self.engine
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reset();
                info!("map reset");
                Ok(CommandOutcome::Done)
            }
            MapCommand::PublishAll => {
                self.publisher.publish_all();
                Ok(CommandOutcome::Done)
            }
            MapCommand::GetMap => {
                let snapshot = self
                    .engine
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .snapshot(&self.world_frame);
                Ok(CommandOutcome::Snapshot(snapshot))
            }
            MapCommand::Save { path } => {
                self.engine
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .save(&path)?;
                info!(path = %path.display(), "map saved");
                Ok(CommandOutcome::Done)
            }
            MapCommand::Load { path } => {
                self.engine
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .load(&path)?;
                info!(path = %path.display(), "map loaded");
                Ok(CommandOutcome::Done)
            }
            MapCommand::SetBoxOccupancy {
                center,
                size,
                occupied,
            } => {
                let center = Vec3::new(center[0], center[1], center[2]);
                let size = Vec3::new(size[0], size[1], size[2]);
                self.engine
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_box_occupancy(center, size, occupied)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}
