//! Caller-side aggregation of a sync run's error and statistics streams

use anyhow::Context;

use crate::error::Error;
use crate::progress::Summary;
use crate::stats::{Stat, StatKind};
use crate::sync::SyncHandle;

/// Something observed on one of the two outward streams, handed out as soon as it arrives.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Stat(&'a Stat),
    Error(&'a Error),
}

#[derive(Debug)]
pub struct Report {
    /// Statistics in the order they were received.
    pub stats: Vec<Stat>,
    pub errors: Vec<Error>,
    pub summary: Summary,
}

impl Report {
    /// A run succeeded when no error was observed at all.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Sum of all stats of the given kind.
    pub fn count(&self, kind: StatKind) -> u64 {
        self.stats
            .iter()
            .filter(|stat| stat.kind == kind)
            .map(|stat| stat.count)
            .sum()
    }
}

/// Drains both streams of `handle` concurrently until they close, then waits for the pipeline.
pub async fn drain(
    handle: SyncHandle,
    mut observe: impl FnMut(Event<'_>),
) -> anyhow::Result<Report> {
    let SyncHandle {
        mut errors,
        mut stats,
        join,
        ..
    } = handle;
    let mut report_stats = vec![];
    let mut report_errors = vec![];
    let mut errors_open = true;
    let mut stats_open = true;
    while errors_open || stats_open {
        tokio::select! {
            error = errors.recv(), if errors_open => match error {
                Some(error) => {
                    observe(Event::Error(&error));
                    report_errors.push(error);
                }
                None => errors_open = false,
            },
            stat = stats.recv(), if stats_open => match stat {
                Some(stat) => {
                    observe(Event::Stat(&stat));
                    report_stats.push(stat);
                }
                None => stats_open = false,
            },
        }
    }
    let summary = join.await.context("sync pipeline task failed")?;
    Ok(Report {
        stats: report_stats,
        errors: report_errors,
        summary,
    })
}
