mod app;
mod dimensions;
mod logging;
mod render;

use anyhow::{Context, Result};
use app::SenselApp;
use clap::Parser;
use senselview::{
    ChannelBuffers, LibSensel, PollOutcome, SensorDriver, SensorSession, SessionConfig,
    SimulatedConfig, SimulatedDriver,
};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "senselview", about = "Sensel force pad reader and viewer")]
struct Cli {
    /// Reacquire the device when no poll has succeeded for this long
    #[arg(long, default_value_t = 2500)]
    stale_timeout_ms: u64,

    /// Frames read per tick; the rest wait for the next tick
    #[arg(long, default_value_t = 5)]
    max_frames: usize,

    /// Ticks per second in headless mode
    #[arg(short, long, default_value_t = 60.0)]
    rate: f64,

    /// Stop after this many ticks (headless mode only)
    #[arg(long)]
    ticks: Option<u64>,

    /// Path to the Sensel shared library
    #[arg(long, env = "SENSEL_LIBRARY")]
    library: Option<PathBuf>,

    /// Use a synthetic device instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Open a window showing the force heatmap and contacts
    #[arg(long)]
    view: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            stale_timeout: Duration::from_millis(self.stale_timeout_ms),
            max_frames_per_tick: self.max_frames,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    if cli.simulate {
        run(SimulatedDriver::new(SimulatedConfig::default()), &cli)
    } else {
        let driver = match &cli.library {
            Some(path) => LibSensel::load(path),
            None => LibSensel::load_default(),
        }
        .context("unable to load the Sensel library (use --library or --simulate)")?;
        run(driver, &cli)
    }
}

fn run<D: SensorDriver + 'static>(driver: D, cli: &Cli) -> Result<()> {
    let session = SensorSession::new(driver, cli.session_config());
    if cli.view {
        run_viewer(session)
    } else {
        run_headless(session, cli.rate, cli.ticks);
        Ok(())
    }
}

fn run_headless<D: SensorDriver>(mut session: SensorSession<D>, rate: f64, ticks: Option<u64>) {
    let period = Duration::from_secs_f64(1.0 / rate.max(0.1));
    let mut buffers = ChannelBuffers::default();
    let mut tick: u64 = 0;

    while ticks.map_or(true, |limit| tick < limit) {
        let started = Instant::now();
        if let Some(samples) = session.output_descriptor().num_samples {
            if buffers.num_samples() != samples {
                buffers.resize(samples);
            }
        }

        match session.poll(started, &mut buffers.sink()) {
            PollOutcome::Read {
                consumed,
                projection: Some(p),
                ..
            } => {
                let contacts: Vec<_> = buffers.contact_triples().collect();
                info!(
                    tick,
                    frames = consumed,
                    total_force = buffers.force.iter().sum::<f32>(),
                    contacts = ?contacts,
                    dropped = p.contacts_dropped,
                    "frame"
                );
            }
            PollOutcome::Reacquired { acquired } => {
                info!(tick, acquired, table = ?session.info_table(), "reacquired");
            }
            outcome => debug!(tick, ?outcome, "no new frame"),
        }

        tick += 1;
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
}

fn run_viewer<D: SensorDriver + 'static>(session: SensorSession<D>) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 460.0])
            .with_min_inner_size([320.0, 240.0])
            .with_title("Senselview - Force Pad Viewer"),
        ..Default::default()
    };

    eframe::run_native(
        "Senselview",
        options,
        Box::new(move |_cc| Ok(Box::new(SenselApp::new(session)))),
    )
    .map_err(|e| anyhow::anyhow!("failed to run viewer: {}", e))
}
