// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command dispatch: argv in, interactive runner or shell command out.

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use slog::Drain;

use crate::cli::App;
use crate::config::Config;
use crate::runner::Runner;
use crate::screen::TextScreen;

pub fn exec() -> Result<()> {
    let app = App::parse();
    let config = Config::from_file(&app.config)?;

    match app.command {
        Some(command) => {
            let log = setup_log(&log_path()?, WithStderr::Yes)?;
            command.exec(&log, &config)
        }
        None => {
            // Do not expose log messages via standard error since
            // they'd show up on top of the screen.
            let log = setup_log(&log_path()?, WithStderr::No)?;
            Runner::new(&log, &config, Box::new(TextScreen::new()))?.run()
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum WithStderr {
    Yes,
    No,
}

fn setup_log(
    path: &Utf8Path,
    with_stderr: WithStderr,
) -> Result<slog::Logger> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("error opening log file {path}"))?;

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();

    let drain = match with_stderr {
        WithStderr::Yes => {
            let stderr_drain = stderr_env_drain("RUST_LOG");
            let drain = slog::Duplicate::new(drain, stderr_drain).fuse();
            slog_async::Async::new(drain).build().fuse()
        }
        WithStderr::No => slog_async::Async::new(drain).build().fuse(),
    };

    Ok(slog::Logger::root(drain, slog::o!()))
}

fn log_path() -> Result<Utf8PathBuf> {
    match std::env::var("GANTRY_LOG_PATH") {
        Ok(path) => Ok(path.into()),
        Err(std::env::VarError::NotPresent) => Ok("/tmp/gantry.log".into()),
        Err(std::env::VarError::NotUnicode(_)) => {
            bail!("GANTRY_LOG_PATH is not valid unicode");
        }
    }
}

fn stderr_env_drain(
    env_var: &str,
) -> impl Drain<Ok = (), Err = slog::Never> {
    let stderr_decorator = slog_term::TermDecorator::new().build();
    let stderr_drain =
        slog_term::FullFormat::new(stderr_decorator).build().fuse();
    let mut builder = slog_envlogger::LogBuilder::new(stderr_drain);
    if let Ok(s) = std::env::var(env_var) {
        builder = builder.parse(&s);
    } else {
        // Log at the info level by default.
        builder = builder.filter(None, slog::FilterLevel::Info);
    }
    builder.build()
}
