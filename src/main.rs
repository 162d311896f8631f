//! Quire - incremental rendering, execution freezing and live preview for
//! markdown and notebook projects.

mod cli;
mod config;
mod core;
mod embed;
mod freeze;
mod freshness;
mod logger;
mod project;
mod render;
mod serve;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        log!("error"; "{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let session = core::BuildSession::from_env(cli.profile.as_deref());

    match &cli.command {
        Commands::Render { args } => {
            logger::set_quiet(args.quiet);
            cli::render::run_render(args, session)
        }
        Commands::Preview { args } => cli::preview::run_preview(args, session),
    }
}
