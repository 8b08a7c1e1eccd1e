//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Traffic is partitioned into six [`Topic`] lanes so ingest tasks only
//! receive the messages they care about:
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::CameraInfo`] | Left/right intrinsic descriptors |
//! | [`Topic::Disparity`] | Stereo disparity frames |
//! | [`Topic::PointCloud`] | Pre-reprojected point clouds |
//! | [`Topic::Transforms`] | Frame-to-frame transform edges |
//! | [`Topic::MapSnapshots`] | Published occupancy-map snapshots |
//! | [`Topic::SystemAlerts`] | Operational alerts (shutdown, faults) |

use tokio::sync::broadcast;
use tracing::warn;
use volumap_types::{FrameEnvelope, SensorEvent, SensorPayload};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all first-class routing topics on the sensor bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Left/right camera intrinsic descriptors.
    CameraInfo,
    /// Stereo disparity frames awaiting registration.
    Disparity,
    /// Point clouds awaiting registration.
    PointCloud,
    /// Rigid transform edges feeding the TF buffer.
    Transforms,
    /// Occupancy-map snapshots emitted by the publication orchestrator.
    MapSnapshots,
    /// Operational alerts: faults, operator shutdown.
    SystemAlerts,
}

impl Topic {
    /// The topic a payload is routed to by convention.
    pub fn for_payload(payload: &SensorPayload) -> Topic {
        match payload {
            SensorPayload::Frame(FrameEnvelope::Disparity(_)) => Topic::Disparity,
            SensorPayload::Frame(FrameEnvelope::PointCloud(_)) => Topic::PointCloud,
            SensorPayload::CameraInfo { .. } => Topic::CameraInfo,
            SensorPayload::Transform { .. } => Topic::Transforms,
            SensorPayload::MapSnapshot(_) => Topic::MapSnapshots,
            SensorPayload::Alert { .. } => Topic::SystemAlerts,
        }
    }
}

/// Shared sensor bus.  Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    camera_info: broadcast::Sender<SensorEvent>,
    disparity: broadcast::Sender<SensorEvent>,
    point_cloud: broadcast::Sender<SensorEvent>,
    transforms: broadcast::Sender<SensorEvent>,
    map_snapshots: broadcast::Sender<SensorEvent>,
    system_alerts: broadcast::Sender<SensorEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (camera_info, _) = broadcast::channel(capacity);
        let (disparity, _) = broadcast::channel(capacity);
        let (point_cloud, _) = broadcast::channel(capacity);
        let (transforms, _) = broadcast::channel(capacity);
        let (map_snapshots, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            camera_info,
            disparity,
            point_cloud,
            transforms,
            map_snapshots,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Zero receivers is a normal condition (nobody is listening yet), not
    /// an error.
    pub fn publish_to(&self, topic: Topic, event: SensorEvent) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    /// Route `payload` to its conventional topic (see [`Topic::for_payload`])
    /// wrapped in a fresh [`SensorEvent`] from `source`.
    pub fn route(&self, source: &str, payload: SensorPayload) -> usize {
        let topic = Topic::for_payload(&payload);
        self.publish_to(topic, SensorEvent::now(source, payload))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<SensorEvent> {
        match topic {
            Topic::CameraInfo => &self.camera_info,
            Topic::Disparity => &self.disparity,
            Topic::PointCloud => &self.point_cloud,
            Topic::Transforms => &self.transforms,
            Topic::MapSnapshots => &self.map_snapshots,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<SensorEvent>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns `None` when the bus has shut down.  When the subscriber falls
    /// behind, the dropped messages are logged and reception continues from
    /// the oldest retained event; frame drops are acceptable here since the
    /// mapping pipeline treats each frame independently.
    pub async fn recv(&mut self) -> Option<SensorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use volumap_types::{DisparityFrame, PointCloudFrame};

    fn cloud_event(source: &str) -> SensorEvent {
        SensorEvent::now(
            source,
            SensorPayload::Frame(FrameEnvelope::PointCloud(PointCloudFrame {
                frame_id: "lidar".to_string(),
                stamp: Utc::now(),
                points: vec![[0.0, 0.0, 1.0]],
            })),
        )
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::PointCloud);

        let event = cloud_event("test");
        assert_eq!(bus.publish_to(Topic::PointCloud, event.clone()), 1);

        let received = rx.recv().await.expect("event");
        assert_eq!(received.id, event.id);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::PointCloud);
        let mut rx2 = bus.subscribe_to(Topic::PointCloud);

        let event = cloud_event("test");
        bus.publish_to(Topic::PointCloud, event.clone());

        assert_eq!(rx1.recv().await.expect("rx1").id, event.id);
        assert_eq!(rx2.recv().await.expect("rx2").id, event.id);
    }

    #[test]
    fn publish_without_subscribers_is_normal() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Disparity, cloud_event("test")), 0);
    }

    /// A subscriber on one topic must not receive events published to
    /// another; they are routed through separate channels.
    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let _cloud = bus.subscribe_to(Topic::PointCloud);

        bus.publish_to(Topic::PointCloud, cloud_event("test"));

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            alerts.recv(),
        )
        .await;
        assert!(result.is_err(), "alert subscriber must not see point clouds");
    }

    #[tokio::test]
    async fn route_picks_topic_from_payload() {
        let bus = EventBus::default();
        let mut disparity_rx = bus.subscribe_to(Topic::Disparity);

        let payload = SensorPayload::Frame(FrameEnvelope::Disparity(DisparityFrame {
            frame_id: "cam0".to_string(),
            stamp: Utc::now(),
            width: 16,
            height: 16,
            data: vec![0u8; 16],
        }));
        assert_eq!(bus.route("test", payload), 1);

        let received = disparity_rx.recv().await.expect("event");
        assert_eq!(received.source, "test");
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must skip
    /// the lost messages and keep receiving, not panic or block.
    #[tokio::test]
    async fn slow_subscriber_skips_lagged_events() {
        let bus = EventBus::new(8);
        let mut slow = bus.subscribe_to(Topic::PointCloud);

        for _ in 0..100 {
            bus.publish_to(Topic::PointCloud, cloud_event("flood"));
        }

        // Reception resumes from the oldest retained event.
        assert!(slow.recv().await.is_some());
    }
}
