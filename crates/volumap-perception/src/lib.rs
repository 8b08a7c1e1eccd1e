//! `volumap-perception` – sensor-registration layer.
//!
//! Resolves the two prerequisites every incoming observation needs before it
//! can be inserted into the occupancy map:
//!
//! - [`calibration`] – [`CalibrationResolver`][calibration::CalibrationResolver]:
//!   produces the 4×4 disparity-to-3D reprojection matrix, either from
//!   explicit configuration coefficients or derived from a pair of camera
//!   intrinsic descriptors, behind a one-shot readiness latch.
//! - [`transform`] – [`TfBuffer`][transform::TfBuffer] and
//!   [`resolve`][transform::resolve]: a timestamped frame graph and the
//!   exact-timestamp-then-latest lookup policy that registers each sensor
//!   frame into the world frame.

pub mod calibration;
pub mod transform;
