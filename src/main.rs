use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kickwise_lib::{
    chat::format_report, inference::save_classifier, inference::Classifier, init_logging,
    AppState, CountingMethod, SessionStatus,
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Fetal movement counting and assessment
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (JSON); defaults to ./kickwise.json
    #[arg(long, global = true, env = "KICKWISE_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a fetal-movement question or count report
    Chat {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Run a counting session on stdin: Enter records a kick, `q` cancels
    Count {
        /// Count for a fixed number of minutes instead of to 10 kicks
        #[arg(long)]
        fixed: Option<u32>,
    },
    /// Load the classifier and print where its weights came from
    ModelInfo,
    /// Write an untrained classifier artifact into a directory
    InitModel {
        dir: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    match args.command {
        Command::InitModel { dir, seed } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            save_classifier(&Classifier::untrained(&mut rng), &dir)?;
            println!("Wrote untrained classifier to {}", dir.display());
        }
        Command::Chat { text } => {
            let state = AppState::new(args.settings)?;
            let text = text.join(" ");
            match state.service.respond_to_chat(&text).await {
                Some(reply) => println!("{reply}"),
                None => println!("No fetal movement question detected."),
            }
        }
        Command::ModelInfo => {
            let state = AppState::new(args.settings)?;
            let info = state.service.model_info().await;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Count { fixed } => {
            let state = AppState::new(args.settings)?;
            run_count(&state, fixed).await?;
        }
    }

    Ok(())
}

async fn run_count(state: &AppState, fixed: Option<u32>) -> Result<()> {
    let method = match fixed {
        Some(_) => CountingMethod::FixedDuration,
        None => CountingMethod::CountToTarget,
    };
    let sessions = &state.sessions;
    sessions.start(method, fixed).await?;

    let mut updates = sessions.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Press Enter for each kick; type q and Enter to cancel.");

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(input) if input.trim().eq_ignore_ascii_case("q") => {
                    sessions.cancel().await?;
                    println!("Session cancelled.");
                    return Ok(());
                }
                Some(_) => match sessions.record_event().await {
                    Ok(snapshot) => println!(
                        "Kicks: {} ({}s)",
                        snapshot.state.kick_count(),
                        snapshot.elapsed_ms / 1000
                    ),
                    Err(err) => println!("{err}"),
                },
                None => {
                    sessions.shutdown().await;
                    return Ok(());
                }
            },
            changed = updates.changed() => changed?,
        }

        if sessions.snapshot().await.state.status == SessionStatus::ReadyToSubmit {
            break;
        }
    }

    let outcome = sessions.submit().await?;
    println!(
        "{}",
        format_report(
            &outcome.assessment,
            outcome.session.kick_count,
            outcome.duration_minutes
        )
    );
    Ok(())
}
