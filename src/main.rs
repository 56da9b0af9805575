// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pitchtrainer::chroma::{Chroma, ChromaSet};
use pitchtrainer::config::Trainer;
use pitchtrainer::controller::{self, Controller, Driver};
use pitchtrainer::samples::{AvailabilityCache, FileStore, SampleStore};
use pitchtrainer::session::{Session, SessionSettings, SessionStatus};
use pitchtrainer::stats::{self, StatsSummary};
use pitchtrainer::storage::LocalStorage;
use pitchtrainer::triallog::{self, TrialLog};
use pitchtrainer::{audio, midi};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An absolute pitch trainer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the trainer.
    Start {
        /// The path to the trainer config.
        config_path: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Lists the built-in chroma sets.
    Sets {},
    /// Probes every configured instrument and note and reports which samples exist.
    Assets {
        /// The path to the trainer config.
        config_path: String,
    },
    /// Prints the stats of the stored trial log.
    Stats {
        /// The path to the trainer config.
        config_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_path } => {
            let config = Trainer::deserialize(&PathBuf::from(&config_path))?;
            start(config).await?;
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Sets {} => {
            println!("Chroma sets:");
            for (index, set) in ChromaSet::builtin().iter().enumerate() {
                println!("{:>3}: {}", index, set.label());
            }
        }
        Commands::Assets { config_path } => {
            let config = Trainer::deserialize(&PathBuf::from(&config_path))?;
            assets(&config).await;
        }
        Commands::Stats { config_path } => {
            let config = Trainer::deserialize(&PathBuf::from(&config_path))?;
            let log = TrialLog::load(LocalStorage::new(&config.storage()));
            let today = triallog::today();

            let mut exercise_types: Vec<String> =
                log.entries().iter().map(stats::entry_exercise_type).collect();
            exercise_types.retain(|exercise_type| !exercise_type.is_empty());
            exercise_types.sort();
            exercise_types.dedup();

            let window = config.exercise().recent_window();
            let overview = StatsSummary::compute(log.entries(), "", &today, window);
            println!("Total trials: {}", overview.total_trials);
            println!("Total trials today: {}", overview.trials_today);
            for exercise_type in exercise_types {
                let summary = StatsSummary::compute(log.entries(), &exercise_type, &today, window);
                // The first two lines repeat the overview.
                for line in summary.lines().iter().skip(2) {
                    println!("{}", line);
                }
            }
        }
    }

    Ok(())
}

/// Runs the trainer until the controller closes.
async fn start(config: Trainer) -> Result<(), Box<dyn Error>> {
    let device = audio::get_device(config.audio())?;
    let mixer = device.mixer();
    info!(device = device.to_string(), "Audio device ready.");

    let store: Arc<dyn SampleStore> = Arc::new(FileStore::new(
        &config.assets(),
        config.format(),
        mixer.sample_rate(),
    ));
    let storage = LocalStorage::new(&config.storage());
    let settings = SessionSettings::from_config(&config)?;
    let label_style = settings.label_style;
    let session = Session::new(settings, store, mixer, storage)?;

    let mut drivers: Vec<Arc<dyn Driver>> =
        vec![Arc::new(controller::keyboard::Driver::new(label_style))];
    if let Some(midi) = config.midi() {
        let midi_device = midi::get_device(midi.device())?;
        info!(device = midi_device.name(), "MIDI device ready.");
        drivers.push(Arc::new(controller::midi::Driver::new(midi_device)));
    }

    let mut status_rx = session.subscribe();
    print_status(&status_rx.borrow_and_update());
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            print_status(&status_rx.borrow_and_update());
        }
    });

    Controller::new(session, drivers).join().await?;
    // Keep the device open until the controller is done with the mixer.
    drop(device);
    Ok(())
}

fn print_status(status: &SessionStatus) {
    println!();
    println!("[{}] {}", status.phase, status.chroma_set);
    if let Some(feedback) = &status.feedback {
        if feedback.correct {
            println!("Correct: {}", feedback.target);
        } else {
            println!("Incorrect: you chose {}, it was {}", feedback.chosen, feedback.target);
        }
    }
    println!("Answers: {}", status.buttons.join("  "));
    let mut toggles = Vec::new();
    if status.reduced_range {
        toggles.push("reduced range".to_string());
    }
    if status.special_exercise {
        toggles.push("special exercise".to_string());
    }
    if let Some(answer_set) = &status.answer_set {
        toggles.push(format!("answer set {}", answer_set));
    }
    if !toggles.is_empty() {
        println!("Options: {}", toggles.join(", "));
    }
    for line in &status.stats {
        println!("{}", line);
    }
}

/// Reports sample availability per instrument, and the drones.
async fn assets(config: &Trainer) {
    let store = Arc::new(FileStore::new(
        &config.assets(),
        config.format(),
        config.audio().sample_rate(),
    ));
    let availability = AvailabilityCache::new(store.clone());

    println!("Samples under {}:", config.assets().display());
    for instrument in config.instruments() {
        let range = instrument.range();
        let mut missing = Vec::new();
        for note in range.min()..=range.max() {
            if !availability.exists(instrument.name(), note).await {
                missing.push(note.to_string());
            }
        }
        let total = usize::from(range.max() - range.min()) + 1;
        println!(
            "- {} ({}): {}/{} available",
            instrument.name(),
            range,
            total - missing.len(),
            total
        );
        if !missing.is_empty() {
            println!("  Missing notes: {}", missing.join(", "));
        }
    }

    let missing_drones: Vec<&str> = Chroma::all()
        .filter(|chroma| !store.drone_path(*chroma).is_file())
        .map(|chroma| chroma.label())
        .collect();
    if missing_drones.is_empty() {
        println!("- Drones: all available");
    } else {
        println!("- Drones missing: {}", missing_drones.join(", "));
    }
}
