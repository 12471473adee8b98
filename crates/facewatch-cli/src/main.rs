use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facewatch_core::{paths, read_events, Gallery, GalleryManifest, OnnxEmbedder};
use facewatch_hw::Camera;
use std::path::PathBuf;

#[zbus::proxy(
    interface = "org.freedesktop.FaceWatch1",
    default_service = "org.freedesktop.FaceWatch1",
    default_path = "/org/freedesktop/FaceWatch1"
)]
trait FaceWatch {
    async fn start(&self) -> zbus::Result<bool>;
    async fn stop(&self) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
    async fn recent_events(&self, limit: u32) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facewatch", about = "facewatch surveillance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start surveillance
    Start,
    /// Stop surveillance
    Stop,
    /// Show daemon status
    Status,
    /// Show recently recorded matches
    Events {
        /// Read this event log directly instead of asking the daemon
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of events to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u32,
    },
    /// Enroll a gallery manifest and report what would be loaded
    CheckGallery {
        /// Path to the gallery TOML manifest
        manifest: PathBuf,
        /// Directory containing det_10g.onnx and w600k_r50.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Run camera diagnostics
    Test {
        /// V4L2 device to test [default: $FACEWATCH_CAMERA_DEVICE or /dev/video0]
        #[arg(short, long)]
        device: Option<String>,
        /// Save the captured frame; the format follows the file extension
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let proxy = connect(cli.system).await?;
            if proxy.start().await? {
                println!("Surveillance started");
            } else {
                println!("Surveillance already running");
            }
        }
        Commands::Stop => {
            let proxy = connect(cli.system).await?;
            if proxy.stop().await? {
                println!("Surveillance stopped");
            } else {
                println!("Surveillance was not running");
            }
        }
        Commands::Status => {
            let proxy = connect(cli.system).await?;
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Events { log, limit } => match log {
            Some(path) => {
                let events = read_events(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let skip = events.len().saturating_sub(limit as usize);
                for e in &events[skip..] {
                    println!("{}  {:<20} {}", e.timestamp_field(), e.identity, e.confidence_field());
                }
            }
            None => {
                let proxy = connect(cli.system).await?;
                let events: Vec<serde_json::Value> =
                    serde_json::from_str(&proxy.recent_events(limit).await?)?;
                for e in &events {
                    println!(
                        "{}  {:<20} {}",
                        e["timestamp"].as_str().unwrap_or("?"),
                        e["identity"].as_str().unwrap_or("?"),
                        e["confidence"].as_str().unwrap_or("?"),
                    );
                }
            }
        },
        Commands::CheckGallery {
            manifest,
            model_dir,
        } => {
            let model_dir = model_dir.unwrap_or_else(|| paths::model_dir(&paths::env_var));
            let sources = GalleryManifest::load_sources(&manifest)?;
            println!("{} reference image(s) in {}", sources.len(), manifest.display());

            let mut embedder = OnnxEmbedder::load(&model_dir)
                .with_context(|| format!("loading models from {}", model_dir.display()))?;
            let gallery = Gallery::load(&sources, &mut embedder)?;
            for entry in gallery.entries() {
                println!(
                    "  {:<20} {}-dim embedding",
                    entry.identity,
                    entry.embedding.dimension()
                );
            }
            println!("Gallery OK: {} entries", gallery.len());
        }
        Commands::Test { device, save } => {
            let device = device
                .or_else(|| paths::env_var("FACEWATCH_CAMERA_DEVICE"))
                .unwrap_or_else(|| "/dev/video0".to_string());
            camera_test(&device, save)?
        }
    }

    Ok(())
}

async fn connect(system: bool) -> Result<FaceWatchProxy<'static>> {
    let conn = if system {
        zbus::Connection::system().await?
    } else {
        zbus::Connection::session().await?
    };
    FaceWatchProxy::new(&conn)
        .await
        .context("connecting to facewatchd")
}

fn camera_test(device: &str, save: Option<PathBuf>) -> Result<()> {
    println!("Running camera diagnostics...");

    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for d in &devices {
        println!("  {}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }

    let mut camera = Camera::open(device, 640, 480)?;
    println!(
        "Opened {}: {}x{} {:?}",
        camera.device_path,
        camera.width,
        camera.height,
        camera.pixel_format()
    );
    camera.discard_warmup(4)?;
    let frame = camera.capture_frame()?;
    println!(
        "Captured frame #{}: brightness {:.1}{}",
        frame.sequence,
        frame.avg_brightness(),
        if frame.is_dark { " (dark)" } else { "" }
    );

    if let Some(path) = save {
        if path.extension().is_none() {
            bail!("--save needs a file name with an extension, e.g. frame.jpg");
        }
        frame
            .image
            .save(&path)
            .with_context(|| format!("saving {}", path.display()))?;
        println!("Saved {}", path.display());
    }
    Ok(())
}
