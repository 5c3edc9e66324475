use std::{
    io::{self, BufReader},
    path::PathBuf,
    time::Duration,
};

use anyhow::{bail, Context};
use clap::Parser;
use zaru_gesture::{
    controller::{self, Controller},
    keys::{KeyInjector, LogKeys},
    profile::Profile,
    source::{BackgroundSource, DetectorProcess, LandmarkSource},
};

const PROFILE_ENV: &str = "ZARU_GESTURE_PROFILE";

/// Control games with hand gestures.
///
/// Reads hand landmarks (one JSON object per frame) from a detector process or from stdin, and
/// injects key presses for the recognized gestures.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Built-in profile to use (`runner` or `vehicle`).
    #[arg(long, conflicts_with = "config")]
    profile: Option<String>,

    /// Load the profile from a TOML file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Detector command to spawn. Reads landmarks from stdin if not given.
    #[arg(long)]
    detector: Option<String>,

    /// Only log key events instead of sending them.
    #[arg(long)]
    dry_run: bool,

    /// Don't flip landmarks horizontally.
    #[arg(long)]
    no_mirror: bool,

    /// Override the profile's cooldown (0 disables it).
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// How long tapped keys are held down.
    #[arg(long, default_value_t = 100)]
    tap_ms: u64,
}

fn main() -> anyhow::Result<()> {
    zaru_gesture::init_logger!();

    let args = Args::parse();
    let profile = load_profile(&args)?;
    log::info!(
        "using profile `{}` ({} bindings, cooldown {:?})",
        profile.name,
        profile.bindings.len(),
        profile.cooldown,
    );

    let keys = key_injector(&args)?;
    let mut controller = Controller::new(&profile, keys)?;

    let mut source = match &args.detector {
        Some(command) => DetectorProcess::spawn(command, profile.min_presence)?.into_background()?,
        None => {
            log::info!("reading landmarks from stdin");
            let stdin = LandmarkSource::new(BufReader::new(io::stdin()), profile.min_presence);
            BackgroundSource::spawn(stdin)?
        }
    };

    // Held keys have to be released on Ctrl-C and SIGTERM too.
    let shutdown = source.shutdown_handle();
    ctrlc::set_handler(move || shutdown.request()).context("failed to install signal handler")?;

    controller::run(&mut source, &mut controller)
}

fn load_profile(args: &Args) -> anyhow::Result<Profile> {
    let mut profile = match (&args.config, &args.profile) {
        (Some(path), _) => Profile::load(path)?,
        (None, Some(name)) => builtin(name)?,
        (None, None) => match std::env::var(PROFILE_ENV) {
            Ok(name) => builtin(&name).with_context(|| format!("invalid `{PROFILE_ENV}`"))?,
            Err(_) => Profile::runner(),
        },
    };

    if args.no_mirror {
        profile.mirror = false;
    }
    if let Some(ms) = args.cooldown_ms {
        profile.cooldown = (ms > 0).then(|| Duration::from_millis(ms));
    }
    Ok(profile)
}

fn builtin(name: &str) -> anyhow::Result<Profile> {
    match Profile::builtin(name) {
        Some(profile) => Ok(profile),
        None => bail!(
            "unknown profile `{name}`, expected one of {:?}",
            Profile::BUILTIN
        ),
    }
}

fn key_injector(args: &Args) -> anyhow::Result<Box<dyn KeyInjector>> {
    if args.dry_run {
        Ok(Box::new(LogKeys))
    } else {
        os_keys(Duration::from_millis(args.tap_ms))
    }
}

#[cfg(feature = "enigo")]
fn os_keys(tap_duration: Duration) -> anyhow::Result<Box<dyn KeyInjector>> {
    let keys = zaru_gesture::keys::EnigoKeys::new()?.tap_duration(tap_duration);
    Ok(Box::new(keys))
}

#[cfg(not(feature = "enigo"))]
fn os_keys(_tap_duration: Duration) -> anyhow::Result<Box<dyn KeyInjector>> {
    bail!("built without the `enigo` feature, only `--dry-run` is supported")
}
