//! Common library for `booksync`: discovery-and-copy pipeline plus runtime and logging setup
//!
//! # Overview
//!
//! A sync run finds document files (by extension) under one or more source directory trees and
//! copies the ones not yet present into a single flat destination directory. Files are matched
//! against the destination by base name only; nothing is ever overwritten.
//!
//! # Pipeline
//!
//! - [`scan`] - one scanner task per source tree feeding a shared, bounded file stream
//! - [`copy`] - one copy worker per discovered file, folding outcomes into atomic counters
//! - [`sync`] - wires the two together and emits the final skipped/copied statistics
//! - [`report`] - drains the error and statistics streams on the caller's side
//!
//! Every error is non-fatal to the run: it's sent on the error stream as it happens and the run
//! continues. The caller decides whether the run failed, normally if any error was seen.
//!
//! # Example
//!
//! ```rust,no_run
//! use common::{Extensions, Settings, SourceSpec};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handle = common::sync(
//!     vec![SourceSpec::new("/home/reader/Documents", Extensions::parse(["epub", "pdf"])?)],
//!     Settings {
//!         destination: "/media/reader/KOBOeReader".into(),
//!         dry_run: true,
//!         max_copy_tasks: 0,
//!     },
//!     throttle::Throttle::unlimited(),
//! );
//! let report = common::report::drain(handle, |event| println!("{event:?}")).await?;
//! assert!(report.success());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod copy;
pub mod error;
pub mod matcher;
pub mod progress;
pub mod report;
pub mod scan;
pub mod stats;
pub mod sync;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, Settings, SourceSpec};
pub use error::Error;
pub use matcher::{Extension, Extensions};
pub use progress::{Progress, ProgressPrinter, Summary};
pub use stats::{Stat, StatKind};
pub use sync::{sync, SyncHandle};

fn init_tracing(output: &OutputConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_level()));
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize logging: {error}");
    }
}

/// Sets up logging and a tokio runtime, then runs `func` to completion.
///
/// Returns `None` if the runtime couldn't be built or `func` failed; the error is printed to
/// stderr unless `output.quiet` is set. On success the result is printed when a summary was
/// requested.
pub fn run<Fut, Summary>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_tracing(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to create the tokio runtime: {error}");
            }
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}
