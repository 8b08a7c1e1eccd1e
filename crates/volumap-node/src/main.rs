//! `volumap-node` – the volumetric mapping frontend process.
//!
//! Wires the pieces together:
//!
//! 1. Loads `volumap.toml` (path as first CLI argument, defaults applied
//!    when the file is absent).
//! 2. Builds the sensor [`EventBus`], the calibration resolver, the TF
//!    buffer and the frame dispatcher.
//! 3. Spawns one ingest task per bus topic: camera info feeds calibration,
//!    transform edges feed the TF buffer, disparity frames and point clouds
//!    are dispatched into the mapping engine.
//! 4. Runs the periodic snapshot publisher when configured, and replays a
//!    recorded sensor log when `replay_path` is set.
//! 5. Intercepts Ctrl-C for a graceful shutdown, publishing an alert on the
//!    bus first.

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{error, info, warn};

use volumap_ingest::{FrameDispatcher, MapPublisher, NullEngine};
use volumap_middleware::{EventBus, ReplayAdapter, SensorAdapter, Topic};
use volumap_perception::calibration::CalibrationResolver;
use volumap_perception::transform::TfBuffer;
use volumap_types::{CameraSide, FrameEnvelope, ImageSize, SensorPayload};

use crate::config::NodeConfig;

/// Initialise tracing-subscriber using `RUST_LOG` (defaults to "info").
/// Set `VOLUMAP_LOG_FORMAT=json` to emit newline-delimited JSON logs
/// suitable for log aggregators.
fn init_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("VOLUMAP_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }
}

fn load_config() -> NodeConfig {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("volumap.toml"));

    match config::load_from(&path) {
        Ok(Some(cfg)) => {
            info!(path = %path.display(), "configuration loaded");
            cfg
        }
        Ok(None) => {
            info!(path = %path.display(), "no configuration file, using defaults");
            let mut cfg = NodeConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(cause = %e, "invalid configuration");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cfg = load_config();

    let bus = EventBus::new(cfg.bus_capacity);
    let image_size = ImageSize::new(cfg.full_image_width, cfg.full_image_height);

    // ── Calibration ───────────────────────────────────────────────────────
    let calibration = Arc::new(RwLock::new(CalibrationResolver::new(image_size)));
    if let Some(coefficients) = &cfg.reprojection_coefficients {
        let mut cal = calibration.write().unwrap_or_else(PoisonError::into_inner);
        // A malformed coefficient list is reported but not fatal: the
        // derived path can still establish calibration at runtime.
        if let Err(e) = cal.set_explicit(coefficients) {
            error!(cause = %e, "explicit calibration rejected, waiting for camera intrinsics instead");
        }
    }

    // ── Core components ───────────────────────────────────────────────────
    let provider = Arc::new(RwLock::new(TfBuffer::new()));
    let engine = Arc::new(Mutex::new(NullEngine::new()));
    let dispatcher = Arc::new(FrameDispatcher::new(
        calibration.clone(),
        provider.clone(),
        engine.clone(),
        cfg.world_frame.clone(),
    ));
    let publisher = MapPublisher::new(engine.clone(), bus.clone(), cfg.world_frame.clone());

    info!(
        world_frame = %cfg.world_frame,
        calibrated = calibration.read().unwrap_or_else(PoisonError::into_inner).is_ready(),
        "volumap node starting"
    );

    // ── Shutdown handling ─────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let bus = bus.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            bus.route(
                "volumap-node",
                SensorPayload::Alert {
                    component: "node".to_string(),
                    message: "operator shutdown".to_string(),
                },
            );
        }) {
            warn!(cause = %e, "cannot install ctrl-c handler");
        }
    }

    // ── Ingest tasks ──────────────────────────────────────────────────────
    {
        let calibration = calibration.clone();
        let mut rx = bus.subscribe_to(Topic::CameraInfo);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let SensorPayload::CameraInfo { side, descriptor } = event.payload {
                    let mut cal = calibration.write().unwrap_or_else(PoisonError::into_inner);
                    match side {
                        CameraSide::Left => cal.on_left_intrinsics(descriptor),
                        CameraSide::Right => cal.on_right_intrinsics(descriptor),
                    }
                }
            }
        });
    }
    {
        let provider = provider.clone();
        let mut rx = bus.subscribe_to(Topic::Transforms);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let SensorPayload::Transform {
                    parent,
                    child,
                    stamp,
                    transform,
                } = event.payload
                {
                    let mut tf = provider.write().unwrap_or_else(PoisonError::into_inner);
                    match stamp {
                        Some(stamp) => tf.set_transform(&parent, &child, stamp, transform),
                        None => tf.set_static(&parent, &child, transform),
                    }
                }
            }
        });
    }
    {
        let dispatcher = dispatcher.clone();
        let mut rx = bus.subscribe_to(Topic::Disparity);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let SensorPayload::Frame(FrameEnvelope::Disparity(frame)) = event.payload {
                    dispatcher.on_disparity(&frame);
                }
            }
        });
    }
    {
        let dispatcher = dispatcher.clone();
        let mut rx = bus.subscribe_to(Topic::PointCloud);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let SensorPayload::Frame(FrameEnvelope::PointCloud(cloud)) = event.payload {
                    dispatcher.on_point_cloud(&cloud);
                }
            }
        });
    }

    // ── Periodic publication ──────────────────────────────────────────────
    tokio::spawn(
        publisher
            .clone()
            .run(cfg.map_publish_frequency_hz, shutdown.clone()),
    );

    // ── Replay or live operation ──────────────────────────────────────────
    if let Some(path) = &cfg.replay_path {
        let adapter = ReplayAdapter::new(path);
        let mut stream = adapter.sensor_stream().await;
        while let Some(payload) = stream.next().await {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            bus.route(adapter.name(), payload);
            // Let the ingest tasks keep pace with the replay burst.
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        publisher.publish_all();
        info!("replay complete");
        shutdown.store(true, Ordering::SeqCst);
    }

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("volumap node stopped");
}
