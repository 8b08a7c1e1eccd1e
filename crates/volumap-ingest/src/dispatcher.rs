//! Per-frame dispatch into the mapping engine.
//!
//! Each arriving observation is an independent callback: the dispatcher
//! checks calibration readiness (disparity only), resolves the sensor→world
//! transform at the frame stamp, and forwards the payload.  Any failure
//! drops that single frame; nothing here is fatal, and nothing blocks.
//!
//! Calibration and the transform provider are read-shared; once the
//! calibration latch has fired both are effectively immutable, so concurrent
//! disparity and point-cloud dispatches need no further coordination beyond
//! the engine mutex.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, error, warn};
use volumap_perception::calibration::CalibrationResolver;
use volumap_perception::transform::{TransformProvider, resolve};
use volumap_types::{DisparityFrame, PointCloudFrame};

use crate::engine::MappingEngine;

/// How often the "calibration not ready" warning may fire.
const NOT_READY_WARN_PERIOD: Duration = Duration::from_secs(1);

/// What happened to one dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame reached the mapping engine.
    Inserted,
    /// Disparity frame dropped: the reprojection matrix is not established.
    DroppedNotReady,
    /// Dropped: no sensor→world transform even under the latest-known
    /// fallback.
    DroppedNoTransform,
    /// Dropped: the mapping engine rejected the insertion.
    DroppedEngineFault,
}

/// Routes incoming frames to the mapping engine once their prerequisites
/// resolve.
pub struct FrameDispatcher<P, E> {
    calibration: Arc<RwLock<CalibrationResolver>>,
    provider: Arc<RwLock<P>>,
    engine: Arc<Mutex<E>>,
    world_frame: String,
    not_ready_warn: DefaultDirectRateLimiter,
}

impl<P: TransformProvider, E: MappingEngine> FrameDispatcher<P, E> {
    pub fn new(
        calibration: Arc<RwLock<CalibrationResolver>>,
        provider: Arc<RwLock<P>>,
        engine: Arc<Mutex<E>>,
        world_frame: impl Into<String>,
    ) -> Self {
        let quota = Quota::with_period(NOT_READY_WARN_PERIOD)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            calibration,
            provider,
            engine,
            world_frame: world_frame.into(),
            not_ready_warn: RateLimiter::direct(quota),
        }
    }

    /// The fixed world frame all observations are registered into.
    pub fn world_frame(&self) -> &str {
        &self.world_frame
    }

    /// Dispatch one disparity frame.
    ///
    /// Dropped with a rate-limited warning while calibration is not ready;
    /// dropped silently on transform failure (the resolver already reported
    /// the cause).
    pub fn on_disparity(&self, frame: &DisparityFrame) -> DispatchOutcome {
        let (reprojection, image_size) = {
            let calibration = self
                .calibration
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match calibration.matrix() {
                Ok(m) => (*m, calibration.image_size()),
                Err(_) => {
                    if self.not_ready_warn.check().is_ok() {
                        warn!("no camera calibration available yet, skipping disparity frame");
                    }
                    return DispatchOutcome::DroppedNotReady;
                }
            }
        };

        let resolution = {
            let provider = self.provider.read().unwrap_or_else(PoisonError::into_inner);
            match resolve(&*provider, &frame.frame_id, &self.world_frame, frame.stamp) {
                Ok(r) => r,
                Err(_) => return DispatchOutcome::DroppedNoTransform,
            }
        };

        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        match engine.insert_disparity(&resolution.transform, frame, &reprojection, image_size) {
            Ok(()) => {
                debug!(
                    frame_id = %frame.frame_id,
                    exact_stamp = resolution.exact,
                    "disparity frame inserted"
                );
                DispatchOutcome::Inserted
            }
            Err(e) => {
                error!(frame_id = %frame.frame_id, cause = %e, "mapping engine rejected disparity frame");
                DispatchOutcome::DroppedEngineFault
            }
        }
    }

    /// Dispatch one point cloud.
    ///
    /// Point clouds are pre-reprojected, so there is no calibration gate;
    /// only transform resolution can drop them.
    pub fn on_point_cloud(&self, cloud: &PointCloudFrame) -> DispatchOutcome {
        let resolution = {
            let provider = self.provider.read().unwrap_or_else(PoisonError::into_inner);
            match resolve(&*provider, &cloud.frame_id, &self.world_frame, cloud.stamp) {
                Ok(r) => r,
                Err(_) => return DispatchOutcome::DroppedNoTransform,
            }
        };

        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        match engine.insert_point_cloud(&resolution.transform, cloud) {
            Ok(()) => {
                debug!(
                    frame_id = %cloud.frame_id,
                    points = cloud.points.len(),
                    exact_stamp = resolution.exact,
                    "point cloud inserted"
                );
                DispatchOutcome::Inserted
            }
            Err(e) => {
                error!(frame_id = %cloud.frame_id, cause = %e, "mapping engine rejected point cloud");
                DispatchOutcome::DroppedEngineFault
            }
        }
    }
}
