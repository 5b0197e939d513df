use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use morse_ime::cw::{CwEngine, DecoderOptions, SpeedLevel};
use morse_ime::input::replay::{script_for_text, ReplayScript, ReplaySource};
use morse_ime::input::{KeyMap, KeySource};
use morse_ime::runtime::Runtime;
use morse_ime::sink::TerminalSink;
use morse_ime::Settings;

#[derive(Parser)]
#[command(name = "morse-ime", version, about = "Type with Morse code on any key")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a keying script through the decoder and print the result
    Replay {
        script: PathBuf,
        /// Speed level 1 (slow) to 9 (fast); overrides the settings file
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=9))]
        speed: Option<u8>,
    },
    /// Print a keying script that types TEXT
    Script {
        text: String,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=9))]
        speed: Option<u8>,
    },
    /// Show the thresholds of every speed level
    Profiles,
    /// Decode a MIDI keyer live
    #[cfg(feature = "midi")]
    Midi {
        #[arg(long)]
        device: Option<String>,
    },
    /// List MIDI input devices
    #[cfg(feature = "midi")]
    MidiDevices,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };

    match cli.command {
        Command::Replay { script, speed } => replay(&settings, &script, speed),
        Command::Script { text, speed } => {
            let level = speed_or_settings(speed, &settings)?;
            let script = script_for_text(&text, &level.profile())?;
            println!("{}", script.to_json()?);
            Ok(())
        }
        Command::Profiles => {
            print_profiles();
            Ok(())
        }
        #[cfg(feature = "midi")]
        Command::Midi { device } => midi(settings, cli.config.as_deref(), device),
        #[cfg(feature = "midi")]
        Command::MidiDevices => {
            for name in morse_ime::input::midi::list_devices() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn speed_or_settings(speed: Option<u8>, settings: &Settings) -> Result<SpeedLevel> {
    match speed {
        Some(level) => SpeedLevel::new(level).context("invalid --speed"),
        None => Ok(settings.speed()),
    }
}

fn replay(settings: &Settings, path: &Path, speed: Option<u8>) -> Result<()> {
    let script = ReplayScript::load(path)?;
    let source = ReplaySource::new(path.display().to_string(), &script)?;
    let level = speed_or_settings(speed, settings)?;

    let text = run_engine(Box::new(source), settings.keymap.clone(), level, settings, |_| {})?;
    info!("replay produced {} characters", text.chars().count());
    Ok(())
}

/// Run the loop with a terminal sink; returns the final document
fn run_engine(
    source: Box<dyn KeySource>,
    keymap: KeyMap,
    level: SpeedLevel,
    settings: &Settings,
    on_speed_change: impl FnMut(SpeedLevel),
) -> Result<String> {
    let options = DecoderOptions {
        timebase: source.timebase(),
        ..settings.decoder_options()
    };
    let mut engine = CwEngine::new(TerminalSink::new(io::stdout()), keymap, level, options);

    let runtime = Runtime::new();
    let summary = runtime
        .run(source, &mut engine, on_speed_change)
        .context("key capture failed")?;

    println!();
    io::stdout().flush()?;
    info!(
        "{} key events, {} boundaries, {} passed through, {} sink failures",
        summary.events, summary.boundaries, summary.passed_through, summary.sink_failures
    );
    Ok(engine.sink().buffer().text())
}

fn print_profiles() {
    println!("level  dit(ms)  char(ms)  word(ms)  ~wpm");
    for level in SpeedLevel::all() {
        let p = level.profile();
        println!(
            "{:>5}  {:>7}  {:>8}  {:>8}  {:>4.0}",
            level,
            p.dit_threshold.as_millis(),
            p.char_boundary.as_millis(),
            p.word_boundary.as_millis(),
            p.estimate_wpm()
        );
    }
}

#[cfg(feature = "midi")]
fn midi(mut settings: Settings, config: Option<&Path>, device: Option<String>) -> Result<()> {
    use morse_ime::input::midi::MidiSource;

    let device = device
        .or_else(|| settings.midi_device.clone())
        .context("no MIDI device given and none in settings")?;
    let source = MidiSource::new(device, settings.midi_cancel_note);
    let keymap = source.keymap();
    let level = settings.speed();

    let persist = settings.clone();
    run_engine(Box::new(source), keymap, level, &persist, |level| {
        settings.speed_level = level.get();
        let saved = match config {
            Some(path) => settings.save_to(path),
            None => settings.save(),
        };
        if let Err(err) = saved {
            log::warn!("[settings] could not persist speed level: {}", err);
        }
    })?;
    Ok(())
}
