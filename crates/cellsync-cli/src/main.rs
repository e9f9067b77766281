//! cellsync CLI - inspect and replay live notebooks.

mod replay;
mod segment;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cellsync")]
#[command(about = "Cell segmentation and session sync for live notebooks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cells discovered in a file
    Segment {
        /// Path to the notebook source
        file: String,
    },

    /// Drive a notebook through a JSON script of edits, syncs and session events
    Replay {
        /// Path to the script (.json)
        script: String,

        /// Only remap cells on edit; segment on explicit reparse steps
        #[arg(long)]
        deferred_parse: bool,

        /// Send delete commands for cells the session never saw
        #[arg(long)]
        delete_unsent: bool,

        /// Make the first N sends fail
        #[arg(long, default_value = "0")]
        fail_sends: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Segment { file } => segment::execute(&file)?,

        Commands::Replay {
            script,
            deferred_parse,
            delete_unsent,
            fail_sends,
        } => {
            let options = replay::ReplayOptions {
                deferred_parse,
                delete_unsent,
                fail_sends,
            };
            replay::execute(&script, &options)?;
        }
    }

    Ok(())
}
