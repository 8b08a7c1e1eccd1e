//! Offline replay of recorded sensor logs.
//!
//! A replay log is a newline-delimited JSON file where each line is one
//! serialized [`SensorEvent`].  The adapter yields the payloads in file
//! order; unparseable lines are logged and skipped rather than aborting the
//! replay.
//!
//! Replay sources are the main reason the transform-lookup fallback policy
//! exists: a recorded log rarely has a transform at the exact stamp of every
//! frame.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tracing::{error, info, warn};
use volumap_types::{SensorEvent, SensorPayload};

use crate::adapter::SensorAdapter;

/// Replays a newline-delimited JSON sensor log from disk.
pub struct ReplayAdapter {
    name: String,
    path: PathBuf,
}

impl ReplayAdapter {
    /// Create a replay source for `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            name: "volumap-middleware::replay".to_string(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse the log into payloads, skipping malformed lines.
    fn parse(raw: &str, path: &Path) -> Vec<SensorPayload> {
        let mut payloads = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SensorEvent>(line) {
                Ok(event) => payloads.push(event.payload),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        cause = %e,
                        "skipping malformed replay record"
                    );
                }
            }
        }
        payloads
    }
}

#[async_trait]
impl SensorAdapter for ReplayAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sensor_stream(&self) -> BoxStream<'static, SensorPayload> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %self.path.display(), cause = %e, "cannot read replay log");
                return stream::iter(Vec::new()).boxed();
            }
        };
        let payloads = Self::parse(&raw, &self.path);
        info!(
            path = %self.path.display(),
            records = payloads.len(),
            "replaying sensor log"
        );
        stream::iter(payloads).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;
    use volumap_types::{FrameEnvelope, PointCloudFrame};

    fn record(frame_id: &str) -> String {
        let event = SensorEvent::now(
            "test",
            SensorPayload::Frame(FrameEnvelope::PointCloud(PointCloudFrame {
                frame_id: frame_id.to_string(),
                stamp: Utc::now(),
                points: vec![],
            })),
        );
        serde_json::to_string(&event).unwrap()
    }

    #[tokio::test]
    async fn replays_records_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", record("a")).unwrap();
        writeln!(file, "{}", record("b")).unwrap();
        writeln!(file, "{}", record("c")).unwrap();

        let adapter = ReplayAdapter::new(file.path());
        let payloads: Vec<SensorPayload> = adapter.sensor_stream().await.collect().await;

        let ids: Vec<&str> = payloads
            .iter()
            .map(|p| match p {
                SensorPayload::Frame(envelope) => envelope.frame_id(),
                _ => panic!("unexpected payload"),
            })
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", record("a")).unwrap();
        writeln!(file, "{{ not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", record("b")).unwrap();

        let adapter = ReplayAdapter::new(file.path());
        let payloads: Vec<SensorPayload> = adapter.sensor_stream().await.collect().await;
        assert_eq!(payloads.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_yields_empty_stream() {
        let adapter = ReplayAdapter::new("/nonexistent/replay.jsonl");
        let payloads: Vec<SensorPayload> = adapter.sensor_stream().await.collect().await;
        assert!(payloads.is_empty());
    }
}
