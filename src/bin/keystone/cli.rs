use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Checkpoint runner: executes a manifest's checkpoints against a run root.
#[derive(Parser, Debug)]
#[command(name = "keystone", version, about = "Checkpoint execution engine CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Run the manifest's checkpoints (optionally from / up to a checkpoint)
    Run {
        /// Run root (dataset in <path>/data, snapshots in <path>/.snapshots)
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        manifest: PathBuf,
        /// Start at this checkpoint instead of the first one
        #[arg(long)]
        start_from: Option<String>,
        /// Stop (PAUSED) right before this checkpoint
        #[arg(long)]
        pause_before: Option<String>,
        /// Validate only: checkpoints run in dry mode, no snapshots
        #[arg(long)]
        dry_run: bool,
        /// Continue past failures (overrides the manifest's stop_on_error)
        #[arg(long)]
        keep_going: bool,
        /// Snapshot policy: every_checkpoint | boundaries | never
        #[arg(long)]
        policy: Option<String>,
        /// Wait for a concurrent run on the same root instead of failing
        #[arg(long)]
        wait: bool,
        #[arg(long)]
        json: bool,
    },
    /// Roll back to a checkpoint's snapshot and run from there
    Resume {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        manifest: PathBuf,
        /// Checkpoint to resume at (must have a snapshot)
        #[arg(long = "from")]
        from: String,
        #[arg(long)]
        pause_before: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        keep_going: bool,
        #[arg(long)]
        policy: Option<String>,
        #[arg(long)]
        wait: bool,
        #[arg(long)]
        json: bool,
    },
    /// List checkpoints that currently have a valid snapshot
    Resumable {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the registered checkpoints of a manifest
    List {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Import a manifest and print the resulting DOC
    Doc {
        #[arg(long)]
        manifest: PathBuf,
        /// Print the persistent subtree as XML instead of a tree listing
        #[arg(long)]
        xml: bool,
    },
}
