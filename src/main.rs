//! Terminal entry point: CLI, config, outputs and the event loop.
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use sqnc::{ui, App, AudioOutput, Config, Engine, KeyMap, MidiOutputDevice, Sequencer};

const ENV_SQNC_LOG: &str = "SQNC_LOG";

#[derive(Debug, Parser)]
#[command(name = "sqnc", version, about = "Terminal step sequencer")]
struct Cli {
    /// Config file (defaults to $SQNC_CONFIG, then ./sqnc.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// MIDI output port index, see --list-ports
    #[arg(long)]
    port: Option<usize>,

    /// Initial tempo in BPM
    #[arg(long)]
    tempo: Option<f64>,

    /// Print available MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Disable the audio preview
    #[arg(long)]
    no_audio: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        for (i, name) in MidiOutputDevice::available_ports().iter().enumerate() {
            println!("{i}: {name}");
        }
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    init_logging(&config)?;

    let mut sequencer = Sequencer::new(config.tracks, config.steps);
    sequencer.set_tempo(cli.tempo.unwrap_or(config.tempo));

    if let Some(port) = cli.port.or(config.midi_port) {
        let mut midi = MidiOutputDevice::new();
        match midi.connect(port) {
            Ok(()) => sequencer.add_sink(Box::new(midi)),
            Err(e) => tracing::warn!(port, error = %e, "midi unavailable"),
        }
    }

    // The stream stops when the output is dropped.
    let _audio = if config.audio_preview && !cli.no_audio {
        match AudioOutput::new() {
            Ok(output) => {
                sequencer.add_sink(Box::new(output.voice()));
                Some(output)
            }
            Err(e) => {
                tracing::warn!(error = %e, "audio preview unavailable");
                None
            }
        }
    } else {
        None
    };

    let keymap = KeyMap::new().context("Invalid key bindings")?;
    let mut app = App::new(sequencer, keymap);

    let mut terminal = setup_terminal().context("Failed to setup terminal")?;
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = teardown();
        default_hook(info);
    }));

    let result = ui::run(
        &mut terminal,
        &mut app,
        Duration::from_millis(config.refresh_ms),
    );
    teardown().context("Failed to restore terminal")?;

    result.context("Terminal loop failed")
}

/// Logs go to `log_file` only; the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<()> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(ENV_SQNC_LOG)
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let entered = io::stdout()
        .execute(EnterAlternateScreen)
        .and_then(|_| Terminal::new(CrosstermBackend::new(io::stdout())));
    match entered {
        Ok(terminal) => Ok(terminal),
        Err(e) => {
            let _ = disable_raw_mode();
            Err(e.into())
        }
    }
}

/// Leave raw mode and the alternate screen. Also runs from the panic hook.
fn teardown() -> io::Result<()> {
    disable_raw_mode()?;
    io::stdout()
        .execute(LeaveAlternateScreen)?
        .execute(cursor::Show)?;
    Ok(())
}
