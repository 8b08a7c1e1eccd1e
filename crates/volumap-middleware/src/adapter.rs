//! The adapter seam between external sensor sources and the bus.
//!
//! The mapping frontend never speaks a wire protocol directly.  An adapter
//! translates whatever the outside world produces – a live driver stack, a
//! recorded log, a bridge process – into a stream of
//! [`SensorPayload`][volumap_types::SensorPayload] values, which the node
//! routes onto the [`EventBus`][crate::bus::EventBus] topic by topic.
//!
//! - [`SensorAdapter`] – the trait every source must implement.
//! - [`ReplayAdapter`][crate::replay::ReplayAdapter] – replays a recorded
//!   newline-delimited JSON log file.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use volumap_types::SensorPayload;

/// An external source of sensor traffic.
///
/// # Contract
///
/// `sensor_stream` returns a finite or endless stream of payloads in arrival
/// order.  Adapters must not block inside the stream; a source with nothing
/// to deliver simply ends the stream (replay) or stays pending (live).
#[async_trait]
pub trait SensorAdapter: Send + Sync {
    /// Stable identifier for this source, used as the event `source` field.
    fn name(&self) -> &str;

    /// Translate inbound external data into a stream of payloads.
    async fn sensor_stream(&self) -> BoxStream<'static, SensorPayload>;
}
