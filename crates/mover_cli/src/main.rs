//! Mover CLI
//!
//! Scenario file → scripted simulation → report / rollback verification

#[cfg(feature = "cli")]
use anyhow::Result;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "mover_cli")]
#[command(about = "Run and verify scripted mover scenarios", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print the final state of every actor
    Run {
        /// Scenario file (.json / .yaml)
        #[arg(long)]
        scenario: PathBuf,

        /// Independent actors simulated in parallel
        #[arg(long, default_value = "1")]
        actors: usize,

        /// Write the report as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run a scenario, roll back halfway, replay and compare digests
    Verify {
        /// Scenario file (.json / .yaml)
        #[arg(long)]
        scenario: PathBuf,
    },

    /// Print the JSON schema of scenario files
    Schema,
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { scenario, actors, out } => {
            let loaded = mover_cli::load_scenario(&scenario)?;
            println!("Running '{}' ({} frames x {} actors)", loaded.name, loaded.frames, actors);

            let report = mover_cli::run_scenario(&loaded, actors)?;
            print_run_report(&report);

            if let Some(out_path) = out {
                save_report(&out_path, &report)?;
            }
        }

        Commands::Verify { scenario } => {
            let loaded = mover_cli::load_scenario(&scenario)?;
            println!("Verifying '{}' ({} frames)", loaded.name, loaded.frames);

            let report = mover_cli::verify_scenario(&loaded)?;
            println!("   Rolled back to:  frame {}", report.rollback_frame);
            println!("   Resimulated:     {} frames", report.resimulated_frames);
            println!("   Expected:        {}", report.expected_sha256);
            println!("   Actual:          {}", report.actual_sha256);

            if report.is_match() {
                println!("\nResimulation matches");
            } else {
                anyhow::bail!("Resimulation diverged - sync state digest mismatch!");
            }
        }

        Commands::Schema => {
            println!("{}", mover_cli::scenario_schema()?);
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn print_run_report(report: &mover_cli::RunReport) {
    println!("\nScenario '{}' finished", report.scenario);
    for actor in &report.actors {
        println!("   Actor {}:", actor.actor);
        println!("      Mode:          {}", actor.mode);
        println!(
            "      Location:      ({:.2}, {:.2}, {:.2})",
            actor.location[0], actor.location[1], actor.location[2]
        );
        println!(
            "      Velocity:      ({:.2}, {:.2}, {:.2})",
            actor.velocity[0], actor.velocity[1], actor.velocity[2]
        );
        println!("      Layered moves: {}", actor.active_layered_moves);
        println!("      Modifiers:     {}", actor.active_modifiers);
        println!("      Events:        {}", actor.events);
        println!("      Checksum:      {}", actor.sync_state_sha256);
    }
}

#[cfg(feature = "cli")]
fn save_report(path: &PathBuf, report: &mover_cli::RunReport) -> Result<()> {
    let report_json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, report_json)?;
    println!("\nReport saved to: {}", path.display());
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("mover_cli is not available. Enable the 'cli' feature to use it.");
    std::process::exit(1);
}
