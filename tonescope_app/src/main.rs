//! Tonescope terminal front end.
//!
//! Plays the configured tone on the default output device and logs a coarse
//! trace of the display ring at display cadence. Keys are read from stdin
//! (see `input`).
//!
//! ## Command line
//!
//! - `tonescope [CONFIG]`: config file, `tonescope.json` by default
//! - `--headless N`: render N callbacks through the manual host, no device

mod input;
mod trace;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use crossbeam::channel::tick;
use crossbeam::select;
use tonescope_backend::{AudioHost, CpalHost, ManualHost, Session};
use tonescope_core::{TonescopeConfig, load_config};

use input::Input;
use trace::render_trace;

const DEFAULT_CONFIG_PATH: &str = "tonescope.json";

struct Args {
    config_path: PathBuf,
    headless_callbacks: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut headless_callbacks = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--headless" => {
                let count = args.next().context("--headless needs a callback count")?;
                headless_callbacks = Some(
                    count
                        .parse::<u64>()
                        .with_context(|| format!("invalid callback count {count:?}"))?,
                );
            }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            path => config_path = PathBuf::from(path),
        }
    }

    Ok(Args {
        config_path,
        headless_callbacks,
    })
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config = load_config(&args.config_path)
        .with_context(|| format!("failed to load {}", args.config_path.display()))?;

    match args.headless_callbacks {
        Some(callbacks) => run_headless(&config, callbacks),
        None => run_interactive(&config),
    }
}

fn run_interactive(config: &TonescopeConfig) -> anyhow::Result<()> {
    let mut session = Session::from_config(CpalHost::new(), config);
    session
        .initialize_from_config(config)
        .context("failed to open audio output")?;
    if config.playback.autoplay {
        session.play()?;
    }
    log::info!("run_interactive: keys c + - u d space q");

    let inputs = input::spawn_stdin_reader().context("failed to start key reader")?;
    let frame_rate = f64::from(config.display.frame_rate_hz.max(1));
    let ticker = tick(Duration::from_secs_f64(1.0 / frame_rate));
    let mut frame: u64 = 0;

    loop {
        select! {
            recv(inputs) -> input => match input {
                Ok(Input::Control(event)) => {
                    if let Err(e) = session.handle_event(event) {
                        log::warn!("run_interactive: {event:?}: {e}");
                    }
                }
                Ok(Input::Quit) | Err(_) => break,
            },
            recv(ticker) -> _ => {
                frame += 1;
                session.log_diagnostics();
                if config.display.trace_every > 0 && frame % u64::from(config.display.trace_every) == 0 {
                    log_trace(&session, config.display.columns);
                }
            }
        }
    }

    session.log_summary("exit: ");
    session.stop();
    Ok(())
}

fn run_headless(config: &TonescopeConfig, callbacks: u64) -> anyhow::Result<()> {
    let host = ManualHost::new();
    let driver = host.driver();
    let mut session = Session::from_config(host, config);
    session.initialize_from_config(config)?;
    session.play()?;

    for _ in 0..callbacks {
        if driver.pump_callback().is_none() {
            bail!("manual host is not running");
        }
    }

    session.log_diagnostics();
    log_trace(&session, config.display.columns);
    session.log_summary("headless: ");
    session.stop();
    Ok(())
}

fn log_trace<H: AudioHost>(session: &Session<H>, columns: usize) {
    if let Some(snapshot) = session.display_snapshot() {
        log::info!(
            "{:>8} {:>5} Hz |{}|",
            session.waveform().name(),
            session.frequency(),
            render_trace(&snapshot, columns, session.amplitude())
        );
    }
}
