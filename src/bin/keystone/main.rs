use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};

use keystone::EngineError;

mod cli;
mod cmd_doc;
mod cmd_list;
mod cmd_resumable;
mod cmd_resume;
mod cmd_run;
mod util;

/// Exit code when there is no snapshot to resume from.
const EXIT_NO_RESUME_POINT: i32 = 2;

fn init_logger() {
    // RUST_LOG wins; default is info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if let Some(EngineError::NoResumePoint(name)) = e.downcast_ref::<EngineError>() {
                eprintln!("nothing to resume: no snapshot for checkpoint '{}'", name);
                std::process::exit(EXIT_NO_RESUME_POINT);
            }
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Run { path, manifest, start_from, pause_before, dry_run, keep_going, policy, wait, json } =>
            cmd_run::exec(cmd_run::RunArgs {
                path,
                manifest,
                start_from,
                pause_before,
                dry_run,
                keep_going,
                policy,
                wait,
                json,
            }),

        cli::Cmd::Resume { path, manifest, from, pause_before, dry_run, keep_going, policy, wait, json } =>
            cmd_resume::exec(cmd_resume::ResumeArgs {
                path,
                manifest,
                from,
                pause_before,
                dry_run,
                keep_going,
                policy,
                wait,
                json,
            }),

        cli::Cmd::Resumable { path, manifest, json } =>
            cmd_resumable::exec(path, manifest, json),

        cli::Cmd::List { manifest, json } =>
            cmd_list::exec(manifest, json),

        cli::Cmd::Doc { manifest, xml } =>
            cmd_doc::exec(manifest, xml),
    }
}
