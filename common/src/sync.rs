//! The discovery-and-copy pipeline
//!
//! ```text
//! scanners --files--> copy workers --outcomes--> counters --> final stats
//!     \                    \
//!      +--- errors, stats --+---------------------------------> caller
//! ```
//!
//! A run goes through `Discovering -> Copying -> Finalizing -> Done`. Discovery and copying
//! overlap: workers start as soon as the first file is found. Copying ends once the file stream
//! is closed and every worker has been joined. Only then are the skipped and copied totals
//! emitted and the stats stream closed.

use anyhow::anyhow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::config::{Settings, SourceSpec};
use crate::copy;
use crate::error::Error;
use crate::progress::{Progress, Summary};
use crate::scan;
use crate::stats::Stat;

pub const STATS_CHANNEL_BOUND: usize = 128;
pub const ERRORS_CHANNEL_BOUND: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovering,
    Copying,
    Finalizing,
    Done,
}

/// A running sync.
///
/// Both streams are bounded: the caller has to drain `errors` and `stats` concurrently (see
/// [`crate::report::drain`]) or the pipeline stalls. Each stream closes once the pipeline no
/// longer writes to it; `stats` closes only after the final totals were sent.
pub struct SyncHandle {
    pub errors: mpsc::Receiver<Error>,
    pub stats: mpsc::Receiver<Stat>,
    pub join: tokio::task::JoinHandle<Summary>,
    progress: Arc<Progress>,
}

impl SyncHandle {
    /// Live counters of the run, e.g. for progress reporting.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }
}

/// Starts synchronizing `sources` into `settings.destination`.
///
/// Paths are expected to be validated, existing directories. Must be called from within a
/// tokio runtime.
pub fn sync(
    sources: Vec<SourceSpec>,
    settings: Settings,
    throttle: throttle::Throttle,
) -> SyncHandle {
    let (errors_tx, errors_rx) = mpsc::channel(ERRORS_CHANNEL_BOUND);
    let (stats_tx, stats_rx) = mpsc::channel(STATS_CHANNEL_BOUND);
    let progress = Arc::new(Progress::new());
    let join = tokio::spawn(run_pipeline(
        sources,
        settings,
        throttle,
        errors_tx,
        stats_tx,
        progress.clone(),
    ));
    SyncHandle {
        errors: errors_rx,
        stats: stats_rx,
        join,
        progress,
    }
}

/// Logs an error when some discovered file didn't end up with an outcome.
fn check_balanced(summary: &Summary) {
    if !summary.is_balanced() {
        tracing::error!("outcomes don't add up to discovered files: {:?}", summary);
    }
}

#[instrument(skip_all, fields(destination = ?settings.destination, dry_run = settings.dry_run))]
async fn run_pipeline(
    sources: Vec<SourceSpec>,
    settings: Settings,
    throttle: throttle::Throttle,
    errors: mpsc::Sender<Error>,
    stats: mpsc::Sender<Stat>,
    progress: Arc<Progress>,
) -> Summary {
    let replenish = tokio::spawn({
        let throttle = throttle.clone();
        async move { throttle.run_replenish_thread().await }
    });
    tracing::debug!(phase = ?Phase::Discovering, "starting {} scanners", sources.len());
    let discovery = scan::discover(
        sources,
        errors.clone(),
        stats.clone(),
        progress.clone(),
        throttle.clone(),
    );
    tracing::debug!(phase = ?Phase::Copying, "consuming discovered files");
    let counts = copy::copy_all(
        discovery.files,
        &settings,
        errors.clone(),
        progress.clone(),
        throttle,
    )
    .await;
    // the file stream is closed by now, so the closer has already finished
    match discovery.join.await {
        Ok(discovered) => tracing::debug!("discovered {} files in total", discovered),
        Err(error) => {
            let error = Error::discovery(
                &settings.destination,
                anyhow!("discovery coordinator did not complete: {error}"),
            );
            if errors.send(error).await.is_err() {
                tracing::warn!("error stream closed, discovery coordinator failure lost");
            }
        }
    }
    replenish.abort();
    tracing::debug!(phase = ?Phase::Finalizing, ?counts, "emitting totals");
    for stat in [
        Stat::skipped(counts.skipped),
        Stat::copied(counts.copied, settings.dry_run),
    ] {
        if stats.send(stat).await.is_err() {
            tracing::warn!("stats stream closed, final totals lost");
        }
    }
    drop(stats);
    let summary = progress.summary();
    check_balanced(&summary);
    tracing::debug!(phase = ?Phase::Done, "sync finished");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Extensions;
    use crate::report::{drain, Report};
    use crate::stats::StatKind;
    use crate::testutils;
    use tracing_test::traced_test;

    fn books() -> Extensions {
        Extensions::parse([".epub", ".pdf"]).unwrap()
    }

    async fn run(sources: Vec<SourceSpec>, destination: &std::path::Path, dry_run: bool) -> Report {
        let handle = sync(
            sources,
            Settings {
                destination: destination.to_owned(),
                dry_run,
                max_copy_tasks: 0,
            },
            throttle::Throttle::unlimited(),
        );
        drain(handle, |_| {}).await.unwrap()
    }

    fn setup_flat(existing: &[&str]) -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir(&src).unwrap();
        std::fs::create_dir(&dst).unwrap();
        std::fs::write(src.join("a.epub"), "a").unwrap();
        std::fs::write(src.join("b.pdf"), "b").unwrap();
        std::fs::write(src.join("c.txt"), "c").unwrap();
        for name in existing {
            std::fs::write(dst.join(name), "existing").unwrap();
        }
        (tmp, src, dst)
    }

    #[tokio::test]
    #[traced_test]
    async fn copies_matching_files_into_empty_destination() {
        let (_tmp, src, dst) = setup_flat(&[]);
        let report = run(vec![SourceSpec::new(&src, books())], &dst, false).await;
        assert!(report.success());
        assert_eq!(report.count(StatKind::Discovered), 2);
        assert_eq!(report.count(StatKind::Skipped), 0);
        assert_eq!(report.count(StatKind::Copied), 2);
        assert_eq!(
            testutils::list_dir(&dst).unwrap(),
            vec!["a.epub".to_string(), "b.pdf".to_string()]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn existing_destination_file_is_skipped() {
        let (_tmp, src, dst) = setup_flat(&["a.epub"]);
        let report = run(vec![SourceSpec::new(&src, books())], &dst, false).await;
        assert!(report.success());
        assert_eq!(report.count(StatKind::Skipped), 1);
        assert_eq!(report.count(StatKind::Copied), 1);
        assert_eq!(std::fs::read_to_string(dst.join("a.epub")).unwrap(), "existing");
        assert_eq!(std::fs::read_to_string(dst.join("b.pdf")).unwrap(), "b");
    }

    #[tokio::test]
    #[traced_test]
    async fn final_stats_come_last_in_order() {
        let tmp = testutils::setup_library().unwrap();
        let library = tmp.path().join("library");
        let other = tmp.path().join("other");
        std::fs::create_dir(&other).unwrap();
        std::fs::write(other.join("z.pdf"), "z").unwrap();
        let dst = tmp.path().join("dst");
        std::fs::create_dir(&dst).unwrap();
        let report = run(
            vec![SourceSpec::new(&library, books()), SourceSpec::new(&other, books())],
            &dst,
            false,
        )
        .await;
        let kinds: Vec<StatKind> = report.stats.iter().map(|stat| stat.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StatKind::Discovered,
                StatKind::Discovered,
                StatKind::Skipped,
                StatKind::Copied
            ]
        );
        assert_eq!(report.summary.discovered, 5);
        assert_eq!(report.summary.copied, 5);
        assert!(report.summary.is_balanced());
    }

    #[tokio::test]
    #[traced_test]
    async fn second_run_skips_everything() {
        let tmp = testutils::setup_library().unwrap();
        let library = tmp.path().join("library");
        let dst = tmp.path().join("dst");
        std::fs::create_dir(&dst).unwrap();
        let first = run(vec![SourceSpec::new(&library, books())], &dst, false).await;
        assert_eq!(first.count(StatKind::Copied), 4);
        let second = run(vec![SourceSpec::new(&library, books())], &dst, false).await;
        assert!(second.success());
        assert_eq!(second.count(StatKind::Copied), 0);
        assert_eq!(second.count(StatKind::Skipped), 4);
    }

    #[tokio::test]
    #[traced_test]
    async fn dry_run_has_no_side_effects() {
        let (_tmp, src, dst) = setup_flat(&["a.epub"]);
        let before = testutils::list_dir(&dst).unwrap();
        let report = run(vec![SourceSpec::new(&src, books())], &dst, true).await;
        assert!(report.success());
        assert_eq!(report.count(StatKind::WouldCopy), 1);
        assert_eq!(report.count(StatKind::Copied), 0);
        assert_eq!(report.count(StatKind::Skipped), 1);
        assert_eq!(testutils::list_dir(&dst).unwrap(), before);
        assert_eq!(std::fs::read_to_string(dst.join("a.epub")).unwrap(), "existing");
    }

    #[tokio::test]
    #[traced_test]
    async fn errors_do_not_stop_the_run() {
        let (tmp, src, dst) = setup_flat(&[]);
        let report = run(
            vec![
                SourceSpec::new(tmp.path().join("missing"), books()),
                SourceSpec::new(&src, books()),
            ],
            &dst,
            false,
        )
        .await;
        assert!(!report.success());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.count(StatKind::Copied), 2);
    }

    #[test]
    #[traced_test]
    fn unbalanced_summary_is_logged() {
        check_balanced(&Summary {
            discovered: 3,
            copied: 1,
            skipped: 1,
            failed: 1,
            bytes_copied: 0,
        });
        assert!(!logs_contain("don't add up"));
        check_balanced(&Summary {
            discovered: 3,
            copied: 1,
            ..Default::default()
        });
        assert!(logs_contain("don't add up"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[traced_test]
    async fn many_files_many_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("dst");
        std::fs::create_dir(&dst).unwrap();
        let mut sources = vec![];
        for s in 0..4 {
            let dir = tmp.path().join(format!("src{s}"));
            for d in 0..5 {
                let sub = dir.join(format!("d{d}"));
                std::fs::create_dir_all(&sub).unwrap();
                for f in 0..30 {
                    std::fs::write(sub.join(format!("{s}-{d}-{f}.epub")), "x").unwrap();
                }
            }
            sources.push(SourceSpec::new(&dir, books()));
        }
        let report = run(sources, &dst, false).await;
        assert!(report.success());
        assert_eq!(report.count(StatKind::Discovered), 600);
        assert_eq!(report.count(StatKind::Copied), 600);
        assert_eq!(testutils::list_dir(&dst).unwrap().len(), 600);
    }
}
