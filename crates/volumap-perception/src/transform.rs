//! Frame-to-frame transform resolution.
//!
//! Two pieces live here:
//!
//! - [`TransformProvider`] / [`TfBuffer`] – the source of rigid transforms
//!   between named frames.  [`TfBuffer`] keeps a directed graph of frames
//!   with a timestamped history per edge (plus static edges valid at all
//!   times) and composes chains via BFS.  The trait seam lets tests and
//!   external transform services substitute their own provider.
//! - [`resolve`] – the lookup policy used at dispatch time: try the exact
//!   frame timestamp first, then fall back to the latest known transform
//!   with a degraded-accuracy warning.  The fallback exists so offline
//!   replay sources and static transform publishers, which do not maintain
//!   dense time history, still register their frames.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use volumap_perception::transform::{TfBuffer, resolve};
//! use volumap_types::geometry::{Transform3D, Vec3, Quaternion};
//!
//! let stamp = Utc::now();
//! let mut tf = TfBuffer::new();
//! tf.set_transform("world", "cam0", stamp,
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! let resolution = resolve(&tf, "cam0", "world", stamp).unwrap();
//! assert!(resolution.exact);
//! assert!((resolution.transform.translation.x - 1.0).abs() < 1e-9);
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use volumap_types::MapError;
use volumap_types::geometry::Transform3D;

/// Entries kept per edge before the oldest are discarded.
const MAX_EDGE_HISTORY: usize = 512;

// ────────────────────────────────────────────────────────────────────────────
// Provider seam
// ────────────────────────────────────────────────────────────────────────────

/// Which instant a lookup should be answered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTime {
    /// The transform as published at exactly this stamp.
    Exact(DateTime<Utc>),
    /// The most recent transform known, whatever its stamp.
    Latest,
}

/// A source of rigid transforms between named frames.
///
/// Both operations are synchronous and bounded: a provider must answer or
/// fail immediately, never block waiting for a transform to appear.
pub trait TransformProvider {
    /// Whether a transform from `from` to `to` is available at exactly
    /// `stamp`.
    fn can_transform(&self, from: &str, to: &str, stamp: DateTime<Utc>) -> bool {
        self.lookup(from, to, LookupTime::Exact(stamp)).is_ok()
    }

    /// The transform mapping points expressed in `from` into `to`.
    ///
    /// # Errors
    ///
    /// [`MapError::TransformLookup`] when the frames are not connected at the
    /// requested instant.
    fn lookup(&self, from: &str, to: &str, at: LookupTime) -> Result<Transform3D, MapError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Lookup policy
// ────────────────────────────────────────────────────────────────────────────

/// A successfully resolved transform, with its timestamp fidelity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// Maps points in the source frame into the target frame.
    pub transform: Transform3D,
    /// False when the latest-known fallback was taken instead of an exact
    /// timestamp match.
    pub exact: bool,
}

/// Resolve `from` → `to` at `stamp` with the two-step fallback policy.
///
/// 1. When the provider has the transform at the exact stamp, return it.
/// 2. Otherwise warn once and substitute the latest known transform.
///
/// A failure even under the fallback returns [`MapError::TransformLookup`];
/// callers treat that as "drop this frame", never as fatal.  There are no
/// retries beyond the single fallback step.
pub fn resolve(
    provider: &impl TransformProvider,
    from: &str,
    to: &str,
    stamp: DateTime<Utc>,
) -> Result<Resolution, MapError> {
    if provider.can_transform(from, to, stamp) {
        let transform = provider.lookup(from, to, LookupTime::Exact(stamp))?;
        return Ok(Resolution {
            transform,
            exact: true,
        });
    }

    warn!(%from, %to, %stamp, "no transform at requested stamp, using latest instead");
    match provider.lookup(from, to, LookupTime::Latest) {
        Ok(transform) => Ok(Resolution {
            transform,
            exact: false,
        }),
        Err(e) => {
            error!(%from, %to, cause = %e, "transform lookup failed");
            Err(e)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfBuffer
// ────────────────────────────────────────────────────────────────────────────

/// Timestamped history of one directed edge.
#[derive(Debug, Default, Clone)]
struct EdgeHistory {
    history: BTreeMap<DateTime<Utc>, Transform3D>,
    static_tf: Option<Transform3D>,
}

impl EdgeHistory {
    fn value_at(&self, at: LookupTime) -> Option<Transform3D> {
        match at {
            LookupTime::Exact(stamp) => {
                self.history.get(&stamp).copied().or(self.static_tf)
            }
            LookupTime::Latest => self
                .history
                .last_key_value()
                .map(|(_, tf)| *tf)
                .or(self.static_tf),
        }
    }
}

/// In-process [`TransformProvider`]: a graph of named frames with a
/// timestamped transform history per edge.
///
/// Frames are identified by arbitrary string names (e.g. `"world"`,
/// `"cam0"`).  Edges are registered parent → child but traversed in both
/// directions, inverting as needed, so `lookup("cam0", "world", …)` works
/// when only `world → cam0` was ever published.
///
/// Per edge only the most recent [`MAX_EDGE_HISTORY`] stamps are retained.
#[derive(Debug, Default, Clone)]
pub struct TfBuffer {
    /// `edges[(parent, child)]` – history in the published direction.
    edges: HashMap<(String, String), EdgeHistory>,
    /// Symmetric adjacency for BFS.
    neighbours: HashMap<String, HashSet<String>>,
}

impl TfBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the transform from `parent` to `child` at `stamp`.
    pub fn set_transform(
        &mut self,
        parent: &str,
        child: &str,
        stamp: DateTime<Utc>,
        transform: Transform3D,
    ) {
        let edge = self.edge_mut(parent, child);
        edge.history.insert(stamp, transform);
        while edge.history.len() > MAX_EDGE_HISTORY {
            edge.history.pop_first();
        }
    }

    /// Register a static transform from `parent` to `child`, valid at every
    /// instant.
    pub fn set_static(&mut self, parent: &str, child: &str, transform: Transform3D) {
        self.edge_mut(parent, child).static_tf = Some(transform);
    }

    fn edge_mut(&mut self, parent: &str, child: &str) -> &mut EdgeHistory {
        self.neighbours
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self.neighbours
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
        self.edges
            .entry((parent.to_string(), child.to_string()))
            .or_default()
    }

    /// The transform along the edge between `current` and `next` at `at`,
    /// inverted when only the opposite direction was published.
    fn edge_value(&self, current: &str, next: &str, at: LookupTime) -> Option<Transform3D> {
        if let Some(edge) = self.edges.get(&(current.to_string(), next.to_string()))
            && let Some(tf) = edge.value_at(at)
        {
            return Some(tf);
        }
        self.edges
            .get(&(next.to_string(), current.to_string()))
            .and_then(|edge| edge.value_at(at))
            .map(Transform3D::inverse)
    }

    /// BFS from `to` towards `from`, composing edge transforms, so the
    /// result maps points expressed in `from` into `to`.
    fn compose_chain(&self, from: &str, to: &str, at: LookupTime) -> Option<Transform3D> {
        if from == to {
            return Some(Transform3D::identity());
        }

        let mut queue: VecDeque<(String, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((to.to_string(), Transform3D::identity()));
        visited.insert(to.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            let Some(nexts) = self.neighbours.get(&current) else {
                continue;
            };
            for next in nexts {
                if visited.contains(next) {
                    continue;
                }
                let Some(edge_tf) = self.edge_value(&current, next, at) else {
                    continue;
                };
                let composed = accumulated.compose(edge_tf);
                if next == from {
                    return Some(composed);
                }
                visited.insert(next.clone());
                queue.push_back((next.clone(), composed));
            }
        }

        None
    }
}

impl TransformProvider for TfBuffer {
    fn lookup(&self, from: &str, to: &str, at: LookupTime) -> Result<Transform3D, MapError> {
        self.compose_chain(from, to, at).ok_or_else(|| {
            let instant = match at {
                LookupTime::Exact(stamp) => format!("at {stamp}"),
                LookupTime::Latest => "at any time".to_string(),
            };
            MapError::TransformLookup(format!("no transform from '{from}' to '{to}' {instant}"))
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::f64::consts::FRAC_1_SQRT_2;
    use volumap_types::geometry::{Quaternion, Vec3};

    fn translation(x: f64, y: f64, z: f64) -> Transform3D {
        Transform3D::new(Vec3::new(x, y, z), Quaternion::identity())
    }

    fn stamp() -> DateTime<Utc> {
        Utc::now()
    }

    // ── TfBuffer graph behaviour ────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfBuffer::new();
        let t = tf.lookup("world", "world", LookupTime::Latest).unwrap();
        assert_eq!(t, Transform3D::identity());
    }

    #[test]
    fn lookup_direct_edge() {
        let mut tf = TfBuffer::new();
        let s = stamp();
        tf.set_transform("world", "cam0", s, translation(1.0, 0.0, 0.0));

        let t = tf.lookup("cam0", "world", LookupTime::Exact(s)).unwrap();
        assert!((t.translation.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_reverse_direction_inverts() {
        let mut tf = TfBuffer::new();
        let s = stamp();
        tf.set_transform("world", "cam0", s, translation(1.0, 0.0, 0.0));

        let t = tf.lookup("world", "cam0", LookupTime::Exact(s)).unwrap();
        assert!((t.translation.x - -1.0).abs() < 1e-9);
    }

    #[test]
    fn lookup_composed_chain() {
        let mut tf = TfBuffer::new();
        let s = stamp();
        tf.set_transform("world", "base", s, translation(1.0, 0.0, 0.0));
        tf.set_transform("base", "cam0", s, translation(0.5, 0.0, 0.0));

        let t = tf.lookup("cam0", "world", LookupTime::Exact(s)).unwrap();
        assert!((t.translation.x - 1.5).abs() < 1e-9);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        // base sits at the world origin rotated 90° around Z; cam0 is 1 m
        // forward of base.  cam0's origin in world is therefore (0, 1, 0).
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let mut tf = TfBuffer::new();
        let s = stamp();
        tf.set_transform("world", "base", s, Transform3D::new(Vec3::zero(), q90z));
        tf.set_transform("base", "cam0", s, translation(1.0, 0.0, 0.0));

        let t = tf.lookup("cam0", "world", LookupTime::Exact(s)).unwrap();
        assert!(t.translation.x.abs() < 1e-9, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-9, "y={}", t.translation.y);
        assert!(t.translation.z.abs() < 1e-9);
    }

    #[test]
    fn lookup_disconnected_frames_fails() {
        let mut tf = TfBuffer::new();
        tf.set_transform("world", "base", stamp(), translation(1.0, 0.0, 0.0));

        let err = tf.lookup("ghost", "world", LookupTime::Latest).unwrap_err();
        assert!(matches!(err, MapError::TransformLookup(_)));
    }

    // ── Timestamp semantics ─────────────────────────────────────────────────

    #[test]
    fn exact_lookup_misses_other_stamps() {
        let mut tf = TfBuffer::new();
        let s = stamp();
        tf.set_transform("world", "cam0", s, translation(1.0, 0.0, 0.0));

        let later = s + TimeDelta::milliseconds(50);
        assert!(!tf.can_transform("cam0", "world", later));
        assert!(tf.can_transform("cam0", "world", s));
    }

    #[test]
    fn latest_returns_most_recent_stamp() {
        let mut tf = TfBuffer::new();
        let s = stamp();
        tf.set_transform("world", "cam0", s, translation(1.0, 0.0, 0.0));
        tf.set_transform(
            "world",
            "cam0",
            s + TimeDelta::milliseconds(100),
            translation(2.0, 0.0, 0.0),
        );

        let t = tf.lookup("cam0", "world", LookupTime::Latest).unwrap();
        assert!((t.translation.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn static_edge_answers_any_stamp() {
        let mut tf = TfBuffer::new();
        tf.set_static("base", "cam0", translation(0.5, 0.0, 0.0));

        assert!(tf.can_transform("cam0", "base", stamp()));
        let t = tf
            .lookup("cam0", "base", LookupTime::Exact(stamp()))
            .unwrap();
        assert!((t.translation.x - 0.5).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded() {
        let mut tf = TfBuffer::new();
        let s = stamp();
        for i in 0..(MAX_EDGE_HISTORY as i64 + 64) {
            tf.set_transform(
                "world",
                "cam0",
                s + TimeDelta::milliseconds(i),
                translation(i as f64, 0.0, 0.0),
            );
        }

        // The oldest entries were evicted; the newest survives.
        assert!(!tf.can_transform("cam0", "world", s));
        let t = tf.lookup("cam0", "world", LookupTime::Latest).unwrap();
        assert!((t.translation.x - (MAX_EDGE_HISTORY as f64 + 63.0)).abs() < 1e-9);
    }

    // ── Fallback policy ─────────────────────────────────────────────────────

    /// A provider double with a fixed exact-stamp answer and a fixed latest
    /// answer, independently controllable.
    struct FixedProvider {
        exact: Option<Transform3D>,
        latest: Option<Transform3D>,
    }

    impl TransformProvider for FixedProvider {
        fn lookup(&self, from: &str, to: &str, at: LookupTime) -> Result<Transform3D, MapError> {
            let answer = match at {
                LookupTime::Exact(_) => self.exact,
                LookupTime::Latest => self.latest,
            };
            answer.ok_or_else(|| {
                MapError::TransformLookup(format!("no transform from '{from}' to '{to}'"))
            })
        }
    }

    #[test]
    fn resolve_exact_match_is_not_degraded() {
        let provider = FixedProvider {
            exact: Some(translation(1.0, 0.0, 0.0)),
            latest: Some(translation(9.0, 0.0, 0.0)),
        };
        let r = resolve(&provider, "cam0", "world", stamp()).unwrap();
        assert!(r.exact);
        assert!((r.transform.translation.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resolve_falls_back_to_latest() {
        let provider = FixedProvider {
            exact: None,
            latest: Some(translation(2.0, 0.0, 0.0)),
        };
        let r = resolve(&provider, "cam0", "world", stamp()).unwrap();
        assert!(!r.exact, "fallback must be flagged as degraded");
        assert!((r.transform.translation.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn resolve_fails_when_frames_never_connected() {
        let provider = FixedProvider {
            exact: None,
            latest: None,
        };
        let err = resolve(&provider, "cam0", "world", stamp()).unwrap_err();
        assert!(matches!(err, MapError::TransformLookup(_)));
    }

    #[test]
    fn resolve_against_tf_buffer_fallback() {
        let mut tf = TfBuffer::new();
        let published = stamp();
        tf.set_transform("world", "cam0", published, translation(1.0, 0.0, 0.0));

        // A frame arrives 20 ms after the only published transform.
        let frame_stamp = published + TimeDelta::milliseconds(20);
        let r = resolve(&tf, "cam0", "world", frame_stamp).unwrap();
        assert!(!r.exact);
        assert!((r.transform.translation.x - 1.0).abs() < 1e-9);
    }
}
