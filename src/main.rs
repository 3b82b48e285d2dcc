use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use drone_watch::logging::init_logging;
use drone_watch::{
    Annotator, DetectorBackend, FolderWatcher, LogLevel, ResultSender, WatchSettings,
    WatcherConfig, build_detector,
};

#[derive(Parser, Debug)]
#[command(name = "drone-watch")]
#[command(about = "Watch a drone camera folder, detect objects and forward results over UDP")]
struct Cli {
    /// Drone whose capture folder to watch (e.g. 1, 2, 3)
    #[arg(long, alias = "drone_id", value_name = "ID")]
    drone_id: u32,

    /// JSON config file; flags below override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root directory holding the per-drone capture folders
    #[arg(long, alias = "watch_root", value_name = "DIR")]
    watch_root: Option<PathBuf>,

    /// Detection model (.rten)
    #[arg(long, alias = "model_path", value_name = "FILE")]
    model_path: Option<PathBuf>,

    /// Class names, one per line
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// External detector program; switches to the command backend
    #[arg(long, value_name = "PROGRAM")]
    detector_command: Option<String>,

    /// Address of the simulation receiving results
    #[arg(long, alias = "ue5_ip", value_name = "IP")]
    target_ip: Option<String>,

    #[arg(long, alias = "ue5_port", value_name = "PORT")]
    target_port: Option<u16>,

    /// Confidence a detection must exceed to be sent
    #[arg(long, value_name = "CONF")]
    threshold: Option<f64>,

    /// TrueType font for label text on annotated images
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    /// Do not save annotated images
    #[arg(long)]
    no_annotate: bool,

    /// Process the current folder contents once and exit
    #[arg(long)]
    once: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Also write daily-rotated logs to this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut WatcherConfig) {
        if let Some(root) = &self.watch_root {
            config.watch_root = root.clone();
        }
        if let Some(model) = &self.model_path {
            config.model.model_path = model.clone();
        }
        if let Some(labels) = &self.labels {
            config.model.labels_path = Some(labels.clone());
        }
        if let Some(command) = &self.detector_command {
            config.model.backend = DetectorBackend::Command;
            config.model.command = Some(command.clone());
        }
        if let Some(ip) = &self.target_ip {
            config.target_ip = ip.clone();
        }
        if let Some(port) = self.target_port {
            config.target_port = port;
        }
        if let Some(threshold) = self.threshold {
            config.confidence_threshold = threshold;
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }
        if self.no_annotate {
            config.annotate = false;
        }
        if self.verbose {
            config.log_level = LogLevel::Debug;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => WatcherConfig::load(path)?,
        None => WatcherConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let _guard = init_logging(config.log_level, cli.log_dir.as_deref());

    info!("drone-watch v{} - drone {}", env!("CARGO_PKG_VERSION"), cli.drone_id);
    info!("Watch root: {}", config.watch_root.display());
    match config.model.backend {
        DetectorBackend::Rten => info!("Model: {}", config.model.model_path.display()),
        DetectorBackend::Command => info!(
            "Detector command: {}",
            config.model.command.as_deref().unwrap_or_default()
        ),
    }
    info!("Target: {}:{}", config.target_ip, config.target_port);

    let folder = config.drone_folder(cli.drone_id);
    if !folder.is_dir() {
        error!("No folder for drone {}: {}", cli.drone_id, folder.display());
        anyhow::bail!("folder for drone {} not found: {}", cli.drone_id, folder.display());
    }
    info!("Found target folder: {}", folder.display());

    let detector = build_detector(&config.model)?;
    let sender = ResultSender::new(&config.target_ip, config.target_port)?;

    let mut watcher = FolderWatcher::new(
        folder,
        cli.drone_id,
        detector,
        sender,
        WatchSettings::from_config(&config),
    )?;

    if config.annotate {
        let annotator = Annotator::new(config.font_path.as_deref(), config.output_subdir.clone())?;
        if !annotator.has_font() {
            info!("No font configured; annotated images will have no label text");
        }
        watcher = watcher.with_annotator(annotator);
    }

    if cli.once {
        let report = watcher.poll_once()?;
        info!(
            "Processed {} of {} files, sent {} results, {} deferred",
            report.processed, report.pending, report.sent, report.deferred
        );
        return Ok(());
    }

    watcher.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore_aliases() {
        let cli = Cli::try_parse_from([
            "drone-watch",
            "--drone_id",
            "3",
            "--ue5_ip",
            "10.0.0.2",
            "--ue5_port",
            "9000",
        ])
        .unwrap();

        let mut config = WatcherConfig::default();
        cli.apply(&mut config);
        assert_eq!(cli.drone_id, 3);
        assert_eq!(config.target_ip, "10.0.0.2");
        assert_eq!(config.target_port, 9000);
    }

    #[test]
    fn test_detector_command_switches_backend() {
        let cli = Cli::try_parse_from([
            "drone-watch",
            "--drone-id",
            "1",
            "--detector-command",
            "yolo-detect",
            "--no-annotate",
        ])
        .unwrap();

        let mut config = WatcherConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.model.backend, DetectorBackend::Command);
        assert_eq!(config.model.command.as_deref(), Some("yolo-detect"));
        assert!(!config.annotate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_drone_id_required() {
        assert!(Cli::try_parse_from(["drone-watch"]).is_err());
    }
}
