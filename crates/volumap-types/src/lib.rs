//! `volumap-types` – shared data model for the volumetric mapping frontend.
//!
//! Every message that crosses a crate boundary lives here: sensor frame
//! envelopes, per-camera intrinsic descriptors, the rigid-transform geometry
//! primitives ([`geometry`]), map snapshots, the map service commands and the
//! workspace-wide [`MapError`] taxonomy.

pub mod geometry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::geometry::Transform3D;

/// Expected full-frame image dimensions in pixels.
///
/// Used to scale disparity images that arrive cropped or downsampled relative
/// to the calibrated sensor resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Which camera of the stereo pair an intrinsic descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraSide {
    Left,
    Right,
}

/// Per-camera calibration metadata.
///
/// The distortion model is opaque to this workspace: the coefficients are
/// carried along but never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicDescriptor {
    /// Focal length in pixels.
    pub focal_length: f64,
    /// Principal point column offset (pixels).
    pub cx: f64,
    /// Principal point row offset (pixels).
    pub cy: f64,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Stereo baseline in metres.  Zero for the left camera of a pair; the
    /// right camera reports its horizontal offset from the left.
    pub baseline_m: f64,
    /// Opaque distortion coefficients, forwarded unmodified.
    #[serde(default)]
    pub distortion: Vec<f64>,
}

/// A stereo disparity image awaiting registration into the world frame.
///
/// The pixel payload is opaque to this workspace and handed unmodified to the
/// mapping engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisparityFrame {
    /// Name of the sensor frame the image was captured in.
    pub frame_id: String,
    /// Capture timestamp.
    pub stamp: DateTime<Utc>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Raw disparity pixel data.
    pub data: Vec<u8>,
}

/// A pre-reprojected point cloud awaiting registration into the world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudFrame {
    /// Name of the sensor frame the cloud was captured in.
    pub frame_id: String,
    /// Capture timestamp.
    pub stamp: DateTime<Utc>,
    /// Cartesian points in the sensor frame, metres.
    pub points: Vec<[f32; 3]>,
}

/// A timestamped, frame-tagged sensor payload.
///
/// Exhaustive matching over the two payload kinds keeps dispatch free of
/// shape-sniffing on the payload itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "frame")]
pub enum FrameEnvelope {
    Disparity(DisparityFrame),
    PointCloud(PointCloudFrame),
}

impl FrameEnvelope {
    /// The sensor frame the payload was captured in.
    pub fn frame_id(&self) -> &str {
        match self {
            FrameEnvelope::Disparity(f) => &f.frame_id,
            FrameEnvelope::PointCloud(f) => &f.frame_id,
        }
    }

    /// The capture timestamp.
    pub fn stamp(&self) -> DateTime<Utc> {
        match self {
            FrameEnvelope::Disparity(f) => f.stamp,
            FrameEnvelope::PointCloud(f) => f.stamp,
        }
    }
}

/// A snapshot of the occupancy map, suitable for publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSnapshot {
    /// Reference frame the snapshot coordinates are expressed in.
    pub frame_id: String,
    /// Snapshot generation time.
    pub stamp: DateTime<Utc>,
    /// Voxel edge length in metres.
    pub resolution_m: f64,
    /// Centres of occupied voxels.
    pub occupied: Vec<geometry::Vec3>,
    /// Centres of known-free voxels.
    pub free: Vec<geometry::Vec3>,
}

/// Requests the node accepts against the mapping engine at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args")]
pub enum MapCommand {
    /// Discard the entire map.
    Reset,
    /// Emit a snapshot on the map-snapshot topic immediately.
    PublishAll,
    /// Return the current snapshot to the caller.
    GetMap,
    /// Persist the map to a file.
    Save { path: PathBuf },
    /// Replace the map with one loaded from a file.
    Load { path: PathBuf },
    /// Force an axis-aligned box of voxels to occupied or free.
    SetBoxOccupancy {
        center: [f64; 3],
        size: [f64; 3],
        occupied: bool,
    },
}

/// Unified event wrapper routed over the sensor bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. "volumap-node::replay"
    pub source: String,
    pub payload: SensorPayload,
}

impl SensorEvent {
    /// Wrap a payload with a fresh id and the current time.
    pub fn now(source: impl Into<String>, payload: SensorPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the sensor bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorPayload {
    /// A disparity image or point cloud to register and insert.
    Frame(FrameEnvelope),
    /// Calibration metadata for one side of the stereo pair.
    CameraInfo {
        side: CameraSide,
        descriptor: IntrinsicDescriptor,
    },
    /// A rigid transform edge between two named frames.  `stamp = None`
    /// declares a static transform valid at all times.
    Transform {
        parent: String,
        child: String,
        stamp: Option<DateTime<Utc>>,
        transform: Transform3D,
    },
    /// A published occupancy-map snapshot.
    MapSnapshot(MapSnapshot),
    /// Operational alert (e.g. operator shutdown).
    Alert { component: String, message: String },
}

/// Global error type spanning calibration, transform lookup, configuration
/// and mapping-engine failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapError {
    #[error("invalid reprojection coefficient count: expected 16, got {0}")]
    InvalidCoefficientCount(usize),

    #[error("transform lookup failed: {0}")]
    TransformLookup(String),

    #[error("calibration not ready")]
    CalibrationNotReady,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("mapping engine error: {0}")]
    Engine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> IntrinsicDescriptor {
        IntrinsicDescriptor {
            focal_length: 500.0,
            cx: 376.0,
            cy: 240.0,
            width: 752,
            height: 480,
            baseline_m: 0.12,
            distortion: vec![0.01, -0.02, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn intrinsic_descriptor_roundtrip() {
        let desc = descriptor();
        let json = serde_json::to_string(&desc).unwrap();
        let back: IntrinsicDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, back);
    }

    #[test]
    fn frame_envelope_tagged_roundtrip() {
        let envelope = FrameEnvelope::PointCloud(PointCloudFrame {
            frame_id: "cam0".to_string(),
            stamp: Utc::now(),
            points: vec![[1.0, 2.0, 3.0]],
        });
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"kind\":\"PointCloud\""));
        let back: FrameEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn frame_envelope_accessors_cover_both_variants() {
        let stamp = Utc::now();
        let disparity = FrameEnvelope::Disparity(DisparityFrame {
            frame_id: "cam0".to_string(),
            stamp,
            width: 752,
            height: 480,
            data: vec![0u8; 8],
        });
        assert_eq!(disparity.frame_id(), "cam0");
        assert_eq!(disparity.stamp(), stamp);

        let cloud = FrameEnvelope::PointCloud(PointCloudFrame {
            frame_id: "lidar".to_string(),
            stamp,
            points: vec![],
        });
        assert_eq!(cloud.frame_id(), "lidar");
    }

    #[test]
    fn map_command_roundtrip() {
        let cmd = MapCommand::SetBoxOccupancy {
            center: [0.0, 1.0, 2.0],
            size: [0.5, 0.5, 0.5],
            occupied: true,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: MapCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn sensor_event_now_fills_metadata() {
        let event = SensorEvent::now(
            "volumap-node::test",
            SensorPayload::Alert {
                component: "node".to_string(),
                message: "shutdown".to_string(),
            },
        );
        assert_eq!(event.source, "volumap-node::test");
        let json = serde_json::to_string(&event).unwrap();
        let back: SensorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
    }

    #[test]
    fn map_error_display() {
        let err = MapError::InvalidCoefficientCount(5);
        assert!(err.to_string().contains("expected 16, got 5"));

        let err2 = MapError::TransformLookup("frames never connected".to_string());
        assert!(err2.to_string().contains("frames never connected"));
    }
}
