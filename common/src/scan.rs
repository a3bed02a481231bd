//! Discovery of matching files across source directory trees
//!
//! Each [`SourceSpec`] gets its own scanner task. Within a tree, sub-directories are walked
//! concurrently. Every matching regular file is sent on the shared file stream. Symbolic links
//! are never followed or emitted. Errors for individual entries go to the error stream and the
//! walk carries on with the remaining entries.
//!
//! [`discover`] owns the shared stream: the background closer task waits for every scanner to
//! finish and only then drops the last sender, so the stream closes exactly once and only
//! after all producers are done.

use anyhow::{anyhow, Context};
use async_recursion::async_recursion;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::config::SourceSpec;
use crate::error::Error;
use crate::matcher;
use crate::progress::Progress;
use crate::stats::Stat;

pub const FILES_CHANNEL_BOUND: usize = 128;

/// Everything a scanner reports through.
#[derive(Clone)]
pub struct ScanContext {
    pub files: mpsc::Sender<std::path::PathBuf>,
    pub errors: mpsc::Sender<Error>,
    pub stats: mpsc::Sender<Stat>,
    pub progress: Arc<Progress>,
    pub throttle: throttle::Throttle,
}

impl ScanContext {
    async fn report(&self, spec: &SourceSpec, source: anyhow::Error) {
        tracing::debug!("discovery error: {:#}", &source);
        if self
            .errors
            .send(Error::discovery(&spec.path, source))
            .await
            .is_err()
        {
            tracing::warn!("error stream closed, discovery error for {:?} lost", &spec.path);
        }
    }
}

/// Walks one source tree, returning the number of files sent on the file stream.
///
/// Exactly one discovery [`Stat`] is emitted for the tree, whether or not errors occurred.
#[instrument(skip(spec, ctx), fields(root = ?spec.path))]
pub async fn scan(spec: Arc<SourceSpec>, ctx: ScanContext) -> u64 {
    let count = scan_dir(&spec, &spec.path, &ctx).await;
    tracing::debug!("found {} matching files", count);
    if ctx
        .stats
        .send(Stat::discovered(&spec.category, count))
        .await
        .is_err()
    {
        tracing::warn!("stats stream closed, discovery count for {:?} lost", &spec.path);
    }
    count
}

#[async_recursion]
async fn scan_dir(spec: &Arc<SourceSpec>, dir: &std::path::Path, ctx: &ScanContext) -> u64 {
    ctx.throttle.get_ops_token().await;
    let mut count = 0;
    let mut subdirs = vec![];
    let mut found = vec![];
    {
        // the directory handle counts against the open files limit until enumeration is done
        let _open_file_guard = ctx.throttle.open_file_permit().await;
        let mut entries = match tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("cannot open directory {dir:?} for reading"))
        {
            Ok(entries) => entries,
            Err(error) => {
                ctx.report(spec, error).await;
                return 0;
            }
        };
        loop {
            let entry = match entries
                .next_entry()
                .await
                .with_context(|| format!("failed traversing directory {dir:?}"))
            {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    ctx.report(spec, error).await;
                    break;
                }
            };
            let entry_path = entry.path();
            // DirEntry::file_type does not traverse symlinks
            let file_type = match entry
                .file_type()
                .await
                .with_context(|| format!("failed reading file type of {entry_path:?}"))
            {
                Ok(file_type) => file_type,
                Err(error) => {
                    ctx.report(spec, error).await;
                    continue;
                }
            };
            if file_type.is_dir() {
                subdirs.push(entry_path);
            } else if file_type.is_file() {
                if matcher::matches(&entry_path, &spec.extensions) {
                    tracing::trace!("found {:?}", &entry_path);
                    found.push(entry_path);
                }
            } else if file_type.is_symlink() {
                tracing::trace!("not following symlink {:?}", &entry_path);
            }
        }
    }
    // no directory handle may be held while blocked on a full file stream
    for file in found {
        if let Err(mpsc::error::SendError(file)) = ctx.files.send(file).await {
            ctx.report(spec, anyhow!("file stream closed before {file:?} could be queued"))
                .await;
            return count;
        }
        ctx.progress.discovered.inc();
        count += 1;
    }
    let mut join_set = tokio::task::JoinSet::new();
    for subdir in subdirs {
        let spec = spec.clone();
        let ctx = ctx.clone();
        let do_scan = || async move { scan_dir(&spec, &subdir, &ctx).await };
        join_set.spawn(do_scan());
    }
    while let Some(res) = join_set.join_next().await {
        match res {
            Ok(subdir_count) => count += subdir_count,
            Err(error) => {
                ctx.report(
                    spec,
                    anyhow!("scanning a sub-directory of {dir:?} failed: {error}"),
                )
                .await;
            }
        }
    }
    count
}

/// Output of [`discover`].
pub struct Discovery {
    /// Shared stream of discovered files, closed once every scanner has finished.
    pub files: mpsc::Receiver<std::path::PathBuf>,
    /// Completes with the total number of discovered files right after the stream closes.
    pub join: tokio::task::JoinHandle<u64>,
}

/// Starts one scanner per source and multiplexes their files onto a single stream.
///
/// Must be called from within a tokio runtime.
pub fn discover(
    specs: Vec<SourceSpec>,
    errors: mpsc::Sender<Error>,
    stats: mpsc::Sender<Stat>,
    progress: Arc<Progress>,
    throttle: throttle::Throttle,
) -> Discovery {
    let (files_tx, files_rx) = mpsc::channel(FILES_CHANNEL_BOUND);
    // every scanner is registered here before the closer starts waiting on them
    let mut scanners = Vec::with_capacity(specs.len());
    for spec in specs {
        let root = spec.path.clone();
        let ctx = ScanContext {
            files: files_tx.clone(),
            errors: errors.clone(),
            stats: stats.clone(),
            progress: progress.clone(),
            throttle: throttle.clone(),
        };
        scanners.push((root, tokio::spawn(scan(Arc::new(spec), ctx))));
    }
    drop(stats);
    let join = tokio::spawn(async move {
        let mut total = 0;
        for (root, scanner) in scanners {
            match scanner.await {
                Ok(count) => total += count,
                Err(error) => {
                    let error = Error::discovery(
                        &root,
                        anyhow!("scanner for {root:?} did not complete: {error}"),
                    );
                    if errors.send(error).await.is_err() {
                        tracing::warn!("error stream closed, scanner failure for {:?} lost", &root);
                    }
                }
            }
        }
        tracing::debug!("all scanners finished, closing the file stream");
        drop(files_tx);
        total
    });
    Discovery {
        files: files_rx,
        join,
    }
}
