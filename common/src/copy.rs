//! Copying discovered files into the flat destination directory
//!
//! A copy worker never overwrites anything: the destination is checked for an existing file of
//! the same name and, when the bytes really are copied, the destination is created with
//! `O_EXCL` so that two workers racing on the same base name can't both write it.

use anyhow::{anyhow, Context};
use futures::FutureExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::config::Settings;
use crate::error::Error;
use crate::progress::Progress;

/// Permissions of newly created destination files (before umask).
const DESTINATION_MODE: u32 = 0o644;

/// One discovered file to bring over to the destination directory.
#[derive(Debug, Clone)]
pub struct CopyTask {
    pub src: std::path::PathBuf,
    pub destination: std::path::PathBuf,
    pub dry_run: bool,
}

impl CopyTask {
    /// `destination / basename(src)`
    pub fn dst(&self) -> anyhow::Result<std::path::PathBuf> {
        let name = self
            .src
            .file_name()
            .ok_or_else(|| anyhow!("source {:?} has no file name", &self.src))?;
        Ok(self.destination.join(name))
    }
}

/// Terminal result of a single [`CopyTask`].
#[derive(Debug)]
pub enum Outcome {
    /// File was copied, or would have been in a dry run (`bytes` is 0 then).
    Copied { bytes: u64 },
    /// A file of the same name already existed at the destination.
    Skipped,
    Failed(Error),
}

/// Reports a dry-run action
fn report_dry_run_copy(src: &std::path::Path, dst: &std::path::Path) {
    println!("would copy {:?} -> {:?}", src, dst);
}

/// Removes a destination file left behind by a failed transfer so a later run retries it.
async fn remove_partial(dst: &std::path::Path) {
    if let Err(error) = tokio::fs::remove_file(dst).await {
        tracing::warn!("failed removing partially copied {:?}: {}", dst, error);
    }
}

async fn try_copy(task: &CopyTask, throttle: &throttle::Throttle) -> anyhow::Result<Outcome> {
    let dst = task.dst()?;
    throttle.get_ops_token().await;
    match tokio::fs::symlink_metadata(&dst).await {
        Ok(_) => {
            tracing::debug!("{:?} already exists, skipping", &dst);
            return Ok(Outcome::Skipped);
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed checking whether {dst:?} already exists"));
        }
    }
    if task.dry_run {
        report_dry_run_copy(&task.src, &dst);
        return Ok(Outcome::Copied { bytes: 0 });
    }
    let _open_file_guard = throttle.open_file_permit().await;
    tracing::debug!("opening 'src' for reading and 'dst' for writing");
    let mut reader = tokio::fs::File::open(&task.src)
        .await
        .with_context(|| format!("cannot open {:?} for reading", &task.src))?;
    // another worker may have created dst since the check above, create_new refuses to clobber it
    let mut writer = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(DESTINATION_MODE)
        .open(&dst)
        .await
        .with_context(|| format!("cannot create {dst:?} for writing"))?;
    let transfer = async {
        let bytes = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        Ok::<u64, std::io::Error>(bytes)
    }
    .await;
    match transfer {
        Ok(bytes) => {
            tracing::debug!("copied {} bytes", bytes);
            Ok(Outcome::Copied { bytes })
        }
        Err(error) => {
            drop(writer);
            remove_partial(&dst).await;
            Err(error).with_context(|| format!("failed copying {:?} to {:?}", &task.src, &dst))
        }
    }
}

/// Copies one file, always producing exactly one [`Outcome`]. Never retries.
#[instrument(skip(throttle))]
pub async fn copy_file(task: &CopyTask, throttle: &throttle::Throttle) -> Outcome {
    match try_copy(task, throttle).await {
        Ok(outcome) => outcome,
        Err(error) => Outcome::Failed(Error::copy(&task.src, error)),
    }
}

/// Runs a copy worker, turning a panic into a [`Outcome::Failed`] for `src`.
async fn catch_panic(
    src: &std::path::Path,
    worker: impl std::future::Future<Output = Outcome>,
) -> Outcome {
    match std::panic::AssertUnwindSafe(worker).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => Outcome::Failed(Error::copy(
            src,
            anyhow!("copy worker for {:?} panicked", src),
        )),
    }
}

/// Folds an outcome into the run's counters; failures go to the error stream instead.
async fn record(outcome: Outcome, progress: &Progress, errors: &mpsc::Sender<Error>) {
    match outcome {
        Outcome::Copied { bytes } => {
            progress.copied.inc();
            progress.bytes_copied.add(bytes);
        }
        Outcome::Skipped => progress.skipped.inc(),
        Outcome::Failed(error) => {
            progress.failed.inc();
            tracing::debug!("copy failed: {:#}", &error);
            if let Err(mpsc::error::SendError(error)) = errors.send(error).await {
                tracing::warn!("error stream closed, copy error lost: {:#}", &error);
            }
        }
    }
}

/// Final counts of [`copy_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyCounts {
    pub skipped: u64,
    pub copied: u64,
    pub failed: u64,
}

/// Starts one copy worker per file received until the stream closes, then waits for all of
/// them.
///
/// With `settings.max_copy_tasks == 0` every file gets its own task right away; otherwise no
/// more than that many workers are in flight and the stream is read only as workers finish.
pub async fn copy_all(
    mut files: mpsc::Receiver<std::path::PathBuf>,
    settings: &Settings,
    errors: mpsc::Sender<Error>,
    progress: Arc<Progress>,
    throttle: throttle::Throttle,
) -> CopyCounts {
    let mut join_set = tokio::task::JoinSet::new();
    while let Some(src) = files.recv().await {
        if settings.max_copy_tasks > 0 && join_set.len() >= settings.max_copy_tasks {
            if let Some(Err(error)) = join_set.join_next().await {
                // workers catch their own panics so this is only reachable on cancellation
                tracing::error!("copy worker did not complete: {}", error);
            }
        }
        let task = CopyTask {
            src,
            destination: settings.destination.clone(),
            dry_run: settings.dry_run,
        };
        let progress = progress.clone();
        let errors = errors.clone();
        let throttle = throttle.clone();
        let do_copy = || async move {
            let outcome = catch_panic(&task.src, copy_file(&task, &throttle)).await;
            record(outcome, &progress, &errors).await;
        };
        join_set.spawn(do_copy());
    }
    while let Some(res) = join_set.join_next().await {
        if let Err(error) = res {
            tracing::error!("copy worker did not complete: {}", error);
        }
    }
    CopyCounts {
        skipped: progress.skipped.get(),
        copied: progress.copied.get(),
        failed: progress.failed.get(),
    }
}
