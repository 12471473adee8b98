use anyhow::{Context, Result};
use facewatch_core::{
    AlertSink, CooldownTracker, CsvEventRecorder, Gallery, GalleryManifest, OnnxEmbedder,
    Pipeline, SharedCooldown, SurveillanceLoop,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod alert;
mod camera_source;
mod config;
mod dbus_interface;
mod preview;

use alert::{BellAlertSink, CommandAlertSink};
use camera_source::CameraOpener;
use config::{BusKind, Config};
use dbus_interface::{FaceWatchService, BUS_NAME, OBJECT_PATH};
use preview::PreviewAnnotator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facewatchd starting");

    let config = Config::from_env();

    let mut embedder = OnnxEmbedder::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    tracing::info!(model_dir = %config.model_dir.display(), "models loaded");

    let sources = GalleryManifest::load_sources(&config.gallery_manifest)?;
    let gallery = Gallery::load(&sources, &mut embedder).context("building gallery")?;
    tracing::info!(
        identities = ?gallery.identities(),
        entries = gallery.len(),
        "gallery loaded"
    );
    if gallery.is_empty() {
        tracing::warn!("gallery is empty; every face will be reported as Unknown");
    }

    let alert: Arc<dyn AlertSink> = match &config.alert_sound {
        Some(sound) => Arc::new(CommandAlertSink::new(&config.alert_player, sound)),
        None => Arc::new(BellAlertSink),
    };
    if let Some(parent) = config.event_log.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let pipeline = Pipeline::new(
        Arc::new(gallery),
        Arc::new(SharedCooldown::new(CooldownTracker::from_secs(
            config.cooldown_secs,
        ))),
        Arc::new(CsvEventRecorder::new(&config.event_log)),
        alert,
    );
    let opener = CameraOpener::new(
        &config.camera_device,
        config.camera_width,
        config.camera_height,
        config.warmup_frames,
    );
    let surveillance = Arc::new(SurveillanceLoop::new(
        pipeline,
        opener,
        embedder,
        PreviewAnnotator::new(config.preview_path.clone()),
    ));

    let service = FaceWatchService::new(Arc::clone(&surveillance), config.event_log.clone());
    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(
        bus = ?config.bus,
        device = %config.camera_device,
        event_log = %config.event_log.display(),
        "facewatchd ready"
    );

    if config.autostart {
        let s = Arc::clone(&surveillance);
        match tokio::task::spawn_blocking(move || s.start()).await? {
            Ok(_) => tracing::info!("surveillance autostarted"),
            Err(e) => tracing::error!(error = %e, "autostart failed; waiting for Start()"),
        }
    }

    wait_for_shutdown().await?;
    tracing::info!("facewatchd shutting down");

    if let Err(e) = tokio::task::spawn_blocking(move || surveillance.stop()).await? {
        tracing::warn!(error = %e, "capture worker ended with an error");
    }
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}
