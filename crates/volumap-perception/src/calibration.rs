//! Stereo calibration acquisition.
//!
//! The mapping engine needs a 4×4 reprojection matrix `Q` to turn disparity
//! pixels into metric 3-D points.  `Q` can arrive two ways:
//!
//! - **Explicit** – sixteen coefficients supplied by configuration at
//!   startup, loaded row-major.
//! - **Derived** – computed from the last-received left and right camera
//!   intrinsic descriptors once both are present.
//!
//! Readiness is a one-shot latch: whichever path completes first wins, and
//! later intrinsic arrivals are stored but never recompute the matrix.  This
//! keeps the calibration stable for the lifetime of the run and prevents
//! mid-run drift.
//!
//! # Example
//!
//! ```rust
//! use volumap_perception::calibration::{CalibrationResolver, CalibrationState};
//! use volumap_types::ImageSize;
//!
//! let mut resolver = CalibrationResolver::new(ImageSize::new(752, 480));
//! assert_eq!(resolver.state(), CalibrationState::Unset);
//!
//! let coefficients: Vec<f64> = (0..16).map(f64::from).collect();
//! resolver.set_explicit(&coefficients).unwrap();
//! assert!(resolver.is_ready());
//! ```

use nalgebra::Matrix4;
use tracing::{info, warn};
use volumap_types::{CameraSide, ImageSize, IntrinsicDescriptor, MapError};

// ────────────────────────────────────────────────────────────────────────────
// Readiness state machine
// ────────────────────────────────────────────────────────────────────────────

/// Readiness of the reprojection matrix.
///
/// Transitions are `Unset → PendingIntrinsics → Ready` on the derived path,
/// or `Unset → Ready` directly when explicit coefficients are configured.
/// The `Ready` transition happens at most once per process lifetime unless
/// [`CalibrationResolver::reset`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// No calibration source has produced anything yet.
    Unset,
    /// At least one intrinsic descriptor has arrived; waiting for the other
    /// side of the stereo pair.
    PendingIntrinsics,
    /// The matrix is established and immutable.
    Ready,
}

/// Which source produced the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationSource {
    /// Sixteen coefficients from configuration.
    Explicit,
    /// Computed from the left/right intrinsic pair.
    Derived,
}

// ────────────────────────────────────────────────────────────────────────────
// CalibrationResolver
// ────────────────────────────────────────────────────────────────────────────

/// Owns the reprojection matrix and the readiness latch.
///
/// The two intrinsic descriptors are held as *last received* per side and
/// overwritten on every arrival; they only feed the matrix while the latch
/// is open.
#[derive(Debug, Clone)]
pub struct CalibrationResolver {
    state: CalibrationState,
    source: Option<CalibrationSource>,
    matrix: Matrix4<f64>,
    left: Option<IntrinsicDescriptor>,
    right: Option<IntrinsicDescriptor>,
    image_size: ImageSize,
}

impl CalibrationResolver {
    /// Create an unset resolver.
    ///
    /// `image_size` is the configured expected full-frame size; the derived
    /// path overwrites it with the left camera's reported dimensions.
    pub fn new(image_size: ImageSize) -> Self {
        Self {
            state: CalibrationState::Unset,
            source: None,
            matrix: Matrix4::identity(),
            left: None,
            right: None,
            image_size,
        }
    }

    /// Load the matrix from sixteen row-major coefficients and latch Ready.
    ///
    /// # Errors
    ///
    /// [`MapError::InvalidCoefficientCount`] when `coefficients.len() != 16`;
    /// the readiness state is left unchanged so the derived path can still
    /// complete later.
    pub fn set_explicit(&mut self, coefficients: &[f64]) -> Result<(), MapError> {
        if coefficients.len() != 16 {
            return Err(MapError::InvalidCoefficientCount(coefficients.len()));
        }
        self.matrix = Matrix4::from_row_slice(coefficients);
        self.state = CalibrationState::Ready;
        self.source = Some(CalibrationSource::Explicit);
        info!("reprojection matrix loaded from explicit coefficients");
        Ok(())
    }

    /// Store the left camera descriptor and derive the matrix if the pair is
    /// now complete.
    pub fn on_left_intrinsics(&mut self, descriptor: IntrinsicDescriptor) {
        self.store(CameraSide::Left, descriptor);
    }

    /// Store the right camera descriptor and derive the matrix if the pair is
    /// now complete.
    pub fn on_right_intrinsics(&mut self, descriptor: IntrinsicDescriptor) {
        self.store(CameraSide::Right, descriptor);
    }

    /// True once the matrix is established (either path).
    pub fn is_ready(&self) -> bool {
        self.state == CalibrationState::Ready
    }

    /// Current readiness state.
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Which source produced the matrix, once Ready.
    pub fn source(&self) -> Option<CalibrationSource> {
        self.source
    }

    /// The reprojection matrix.
    ///
    /// # Errors
    ///
    /// [`MapError::CalibrationNotReady`] before the latch has fired.
    pub fn matrix(&self) -> Result<&Matrix4<f64>, MapError> {
        if self.is_ready() {
            Ok(&self.matrix)
        } else {
            Err(MapError::CalibrationNotReady)
        }
    }

    /// The expected full-frame image size.
    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// Discard the matrix, stored descriptors and readiness.
    ///
    /// The only sanctioned way to re-calibrate a running process.
    pub fn reset(&mut self, image_size: ImageSize) {
        self.state = CalibrationState::Unset;
        self.source = None;
        self.matrix = Matrix4::identity();
        self.left = None;
        self.right = None;
        self.image_size = image_size;
    }

    fn store(&mut self, side: CameraSide, descriptor: IntrinsicDescriptor) {
        match side {
            CameraSide::Left => self.left = Some(descriptor),
            CameraSide::Right => self.right = Some(descriptor),
        }
        if self.state == CalibrationState::Ready {
            // Latch already fired: keep the stored descriptor but leave the
            // matrix untouched.
            return;
        }
        self.state = CalibrationState::PendingIntrinsics;
        self.try_derive();
    }

    /// Compute `Q` from the stored pair, if complete.
    ///
    /// Standard stereo rectification reprojection form: with left focal
    /// length `f`, left principal point `(cx, cy)`, right principal column
    /// `cx'` and baseline `b`,
    ///
    /// ```text
    ///     | 1  0  0    -cx      |
    /// Q = | 0  1  0    -cy      |
    ///     | 0  0  0     f       |
    ///     | 0  0  1/b  (cx'-cx)/b |
    /// ```
    ///
    /// Side effect: the expected full-frame size is updated to the left
    /// camera's reported dimensions.
    fn try_derive(&mut self) {
        let (Some(left), Some(right)) = (&self.left, &self.right) else {
            return;
        };
        let baseline = right.baseline_m;
        if baseline <= 0.0 {
            warn!(baseline, "non-positive stereo baseline, cannot derive reprojection matrix");
            return;
        }

        let f = left.focal_length;
        let cx = left.cx;
        let cy = left.cy;
        let cx_right = right.cx;

        let mut q = Matrix4::<f64>::zeros();
        q[(0, 0)] = 1.0;
        q[(0, 3)] = -cx;
        q[(1, 1)] = 1.0;
        q[(1, 3)] = -cy;
        q[(2, 3)] = f;
        q[(3, 2)] = 1.0 / baseline;
        q[(3, 3)] = (cx_right - cx) / baseline;

        self.matrix = q;
        self.image_size = ImageSize::new(left.width, left.height);
        self.state = CalibrationState::Ready;
        self.source = Some(CalibrationSource::Derived);
        info!(
            focal = f,
            baseline,
            width = left.width,
            height = left.height,
            "reprojection matrix derived from stereo intrinsics"
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
