//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Incremental renderer and live preview for markdown and notebook projects
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Active configuration profiles (comma separated, overrides QUIRE_PROFILE)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Render files or the whole project
    #[command(visible_alias = "r")]
    Render {
        #[command(flatten)]
        args: RenderArgs,
    },

    /// Render, serve and live-reload the project
    #[command(visible_alias = "p")]
    Preview {
        #[command(flatten)]
        args: PreviewArgs,
    },
}

/// Render command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    /// Inputs to render. If omitted, renders the project in the current directory.
    #[arg(value_name = "FILES", value_hint = clap::ValueHint::AnyPath)]
    pub files: Vec<PathBuf>,

    /// Render only this format
    #[arg(short, long, value_name = "FORMAT")]
    pub to: Option<String>,

    /// Output directory (relative to project root)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Keep-alive seconds for execution daemons (0 disables them)
    #[arg(long, value_name = "N")]
    pub execute_daemon: Option<u32>,

    /// Working directory for code execution
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub execute_dir: Option<PathBuf>,

    /// Remove the output directory before a full render
    #[arg(short, long)]
    pub clean: bool,

    /// Reuse frozen execution results even where freezing is off
    #[arg(long)]
    pub use_freezer: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Preview command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct PreviewArgs {
    /// Project directory (or a file inside it)
    #[arg(value_name = "PATH", value_hint = clap::ValueHint::AnyPath)]
    pub path: Option<PathBuf>,

    /// Port number to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Don't open a browser
    #[arg(long)]
    pub no_browse: bool,

    /// Only reload clients when inputs change, never re-render them
    #[arg(long)]
    pub no_watch_inputs: bool,

    /// Keep clients on their page instead of following the changed output
    #[arg(long)]
    pub no_navigate: bool,

    /// Initial render: none, default or a format name
    #[arg(long, default_value = "default", value_name = "none|default|FORMAT")]
    pub render: String,

    /// Seconds without clients before the server stops (0 = never)
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_args() {
        let cli = Cli::parse_from([
            "quire", "--profile", "prod", "render", "a.qmd", "b.qmd", "--to", "html", "--clean",
        ]);
        assert_eq!(cli.profile.as_deref(), Some("prod"));
        let Commands::Render { args } = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.files, vec![PathBuf::from("a.qmd"), PathBuf::from("b.qmd")]);
        assert_eq!(args.to.as_deref(), Some("html"));
        assert!(args.clean);
        assert!(!args.use_freezer);
    }

    #[test]
    fn test_preview_args() {
        let cli = Cli::parse_from(["quire", "preview", "site", "--port", "5000", "--no-browse", "--render", "none"]);
        let Commands::Preview { args } = cli.command else {
            panic!("expected preview");
        };
        assert_eq!(args.path, Some(PathBuf::from("site")));
        assert_eq!(args.port, Some(5000));
        assert!(args.no_browse);
        assert!(!args.no_watch_inputs);
        assert_eq!(args.render, "none");
    }
}
