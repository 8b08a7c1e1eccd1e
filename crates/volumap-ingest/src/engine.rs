//! The occupancy-map engine seam.
//!
//! The map itself – probability fusion, ray casting, serialization – lives
//! behind [`MappingEngine`].  This workspace only resolves what the engine
//! needs per observation (a world-frame transform, and for disparity frames
//! the reprojection matrix) and hands the payload over unmodified.

use std::path::Path;

use nalgebra::Matrix4;
use volumap_types::geometry::{Transform3D, Vec3};
use volumap_types::{DisparityFrame, ImageSize, MapError, MapSnapshot, PointCloudFrame};

/// The contract an occupancy-map backend must satisfy.
///
/// All operations are synchronous and side-effect-only; the caller
/// serializes access.
pub trait MappingEngine: Send {
    /// Insert a registered disparity image.
    ///
    /// `sensor_to_world` maps sensor-frame coordinates into the world frame,
    /// `reprojection` is the 4×4 disparity-to-3D matrix and
    /// `full_image_size` the expected uncropped sensor resolution.
    fn insert_disparity(
        &mut self,
        sensor_to_world: &Transform3D,
        frame: &DisparityFrame,
        reprojection: &Matrix4<f64>,
        full_image_size: ImageSize,
    ) -> Result<(), MapError>;

    /// Insert a registered point cloud.
    fn insert_point_cloud(
        &mut self,
        sensor_to_world: &Transform3D,
        cloud: &PointCloudFrame,
    ) -> Result<(), MapError>;

    /// Produce a snapshot of the current map, expressed in `frame_id`.
    fn snapshot(&self, frame_id: &str) -> MapSnapshot;

    /// Discard the entire map.
    fn reset(&mut self);

    /// Force an axis-aligned box of voxels to occupied or free.
    fn set_box_occupancy(
        &mut self,
        center: Vec3,
        size: Vec3,
        occupied: bool,
    ) -> Result<(), MapError>;

    /// Persist the map to `path`.
    fn save(&self, path: &Path) -> Result<(), MapError>;

    /// Replace the map with one loaded from `path`.
    fn load(&mut self, path: &Path) -> Result<(), MapError>;
}

// ────────────────────────────────────────────────────────────────────────────
// NullEngine
// ────────────────────────────────────────────────────────────────────────────

/// Counting stand-in used until a real occupancy backend is wired in.
///
/// Accepts every insertion and tracks how much arrived; snapshots are empty.
/// Persistence is unsupported and fails with [`MapError::Engine`].
#[derive(Debug, Default)]
pub struct NullEngine {
    disparity_frames: u64,
    point_clouds: u64,
    points: u64,
    box_requests: u64,
}

impl NullEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of disparity frames accepted so far.
    pub fn disparity_frames(&self) -> u64 {
        self.disparity_frames
    }

    /// Number of point clouds accepted so far.
    pub fn point_clouds(&self) -> u64 {
        self.point_clouds
    }
}

impl MappingEngine for NullEngine {
    fn insert_disparity(
        &mut self,
        _sensor_to_world: &Transform3D,
        _frame: &DisparityFrame,
        _reprojection: &Matrix4<f64>,
        _full_image_size: ImageSize,
    ) -> Result<(), MapError> {
        self.disparity_frames += 1;
        Ok(())
    }

    fn insert_point_cloud(
        &mut self,
        _sensor_to_world: &Transform3D,
        cloud: &PointCloudFrame,
    ) -> Result<(), MapError> {
        self.point_clouds += 1;
        self.points += cloud.points.len() as u64;
        Ok(())
    }

    fn snapshot(&self, frame_id: &str) -> MapSnapshot {
        MapSnapshot {
            frame_id: frame_id.to_string(),
            stamp: chrono::Utc::now(),
            resolution_m: 0.0,
            occupied: Vec::new(),
            free: Vec::new(),
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn set_box_occupancy(
        &mut self,
        _center: Vec3,
        _size: Vec3,
        _occupied: bool,
    ) -> Result<(), MapError> {
        self.box_requests += 1;
        Ok(())
    }

    fn save(&self, _path: &Path) -> Result<(), MapError> {
        Err(MapError::Engine(
            "null engine has no persistence backend".to_string(),
        ))
    }

    fn load(&mut self, _path: &Path) -> Result<(), MapError> {
        Err(MapError::Engine(
            "null engine has no persistence backend".to_string(),
        ))
    }
}
