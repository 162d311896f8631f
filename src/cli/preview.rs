//! `quire preview`: render, serve and live-reload a project.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use super::{PreviewArgs, project_root};
use crate::core::BuildSession;
use crate::serve::{InitialRender, PreviewOptions, preview};

pub fn run_preview(args: &PreviewArgs, session: Arc<BuildSession>) -> Result<()> {
    let path = args.path.clone().unwrap_or_else(|| PathBuf::from("."));
    let root = project_root(&path)?;

    let options = PreviewOptions {
        port: args.port,
        host: args.host,
        browse: args.no_browse.then_some(false),
        watch_inputs: args.no_watch_inputs.then_some(false),
        timeout: args.timeout,
        render: InitialRender::parse(&args.render),
        navigate: !args.no_navigate,
        flags: Default::default(),
    };
    preview(&root, session, options)
}
