//! Resource throttling for the discovery and copy stages of a sync run
//!
//! Two independent limits are provided, both disabled when configured with `0`:
//!
//! 1. **Open files limit** - caps the number of file and directory handles held open at once.
//!    A permit is taken before opening a handle and given back when the guard is dropped.
//! 2. **Operations throttle** - caps the number of filesystem operations per second using a
//!    token bucket that a background task refills.
//!
//! Unlike a process-wide limiter, a [`Throttle`] is a value: each sync run owns its own
//! instance (cheap to clone, clones share the same budget), so several runs in one process
//! don't interfere with each other.
//!
//! ```rust,no_run
//! use throttle::{Throttle, ThrottleConfig};
//!
//! # async fn example() {
//! let throttle = Throttle::new(&ThrottleConfig {
//!     max_open_files: Some(1024),
//!     ops_throttle: 500,
//! });
//! let replenish = tokio::spawn({
//!     let throttle = throttle.clone();
//!     async move { throttle.run_replenish_thread().await }
//! });
//! throttle.get_ops_token().await;
//! let _guard = throttle.open_file_permit().await;
//! // open the file here
//! replenish.abort();
//! # }
//! ```

mod semaphore;

/// Throttling configuration for resource control
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottleConfig {
    /// Maximum number of open files (None = 80% of system limit, Some(0) = no limit)
    pub max_open_files: Option<usize>,
    /// Operations per second throttle (0 = no throttle)
    pub ops_throttle: usize,
}

/// Returns 80% of the soft `RLIMIT_NOFILE` limit or `0` (no limit) if it can't be read.
pub fn default_max_open_files() -> usize {
    match nix::sys::resource::getrlimit(nix::sys::resource::Resource::RLIMIT_NOFILE) {
        Ok((soft, _hard)) => {
            // RLIM_INFINITY would overflow the semaphore
            let limit = usize::try_from(soft)
                .unwrap_or(usize::MAX)
                .min(tokio::sync::Semaphore::MAX_PERMITS);
            std::cmp::max(1, limit / 10 * 8)
        }
        Err(error) => {
            tracing::warn!("failed reading open files limit, not limiting: {}", error);
            0
        }
    }
}

/// Splits an operations-per-second rate into (tokens, interval) so refills stay fine-grained.
fn replenish_schedule(ops_per_sec: usize) -> (usize, std::time::Duration) {
    if ops_per_sec >= 10 {
        (ops_per_sec / 10, std::time::Duration::from_millis(100))
    } else {
        (ops_per_sec, std::time::Duration::from_secs(1))
    }
}

pub struct OpenFileGuard {
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

#[derive(Debug, Clone, Default)]
pub struct Throttle {
    open_files: semaphore::Semaphore,
    ops: semaphore::Semaphore,
    ops_per_sec: usize,
}

impl Throttle {
    pub fn new(config: &ThrottleConfig) -> Self {
        let max_open_files = config
            .max_open_files
            .unwrap_or_else(default_max_open_files);
        let (ops_tokens, _) = replenish_schedule(config.ops_throttle);
        tracing::debug!(
            "throttle: max open files {}, ops/s {}",
            max_open_files,
            config.ops_throttle
        );
        Self {
            open_files: semaphore::Semaphore::new(max_open_files),
            ops: semaphore::Semaphore::new(ops_tokens),
            ops_per_sec: config.ops_throttle,
        }
    }

    /// No limits at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub async fn open_file_permit(&self) -> OpenFileGuard {
        OpenFileGuard {
            _permit: self.open_files.acquire().await,
        }
    }

    pub async fn get_ops_token(&self) {
        self.ops.consume().await;
    }

    /// Refills the operations budget forever; returns immediately when ops aren't throttled.
    pub async fn run_replenish_thread(&self) {
        if !self.ops.is_enabled() {
            return;
        }
        let (tokens, interval) = replenish_schedule(self.ops_per_sec);
        self.ops.run_replenish_thread(tokens, interval).await;
    }

    pub fn available_open_files(&self) -> Option<usize> {
        self.open_files.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_scales_down_large_rates() {
        assert_eq!(
            replenish_schedule(500),
            (50, std::time::Duration::from_millis(100))
        );
        assert_eq!(
            replenish_schedule(3),
            (3, std::time::Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn unlimited_never_blocks() {
        let throttle = Throttle::unlimited();
        for _ in 0..1000 {
            throttle.get_ops_token().await;
        }
        let _guards: Vec<_> = take_permits(&throttle, 100).await;
        assert_eq!(throttle.available_open_files(), None);
    }

    async fn take_permits(throttle: &Throttle, count: usize) -> Vec<OpenFileGuard> {
        let mut guards = Vec::with_capacity(count);
        for _ in 0..count {
            guards.push(throttle.open_file_permit().await);
        }
        guards
    }

    #[tokio::test]
    async fn open_file_permits_are_returned_on_drop() {
        let throttle = Throttle::new(&ThrottleConfig {
            max_open_files: Some(2),
            ops_throttle: 0,
        });
        let first = throttle.open_file_permit().await;
        let second = throttle.open_file_permit().await;
        assert_eq!(throttle.available_open_files(), Some(0));
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            throttle.open_file_permit(),
        )
        .await;
        assert!(blocked.is_err());
        drop(first);
        assert_eq!(throttle.available_open_files(), Some(1));
        drop(second);
        assert_eq!(throttle.available_open_files(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn ops_tokens_are_replenished() {
        let throttle = Throttle::new(&ThrottleConfig {
            max_open_files: Some(0),
            ops_throttle: 2,
        });
        throttle.get_ops_token().await;
        throttle.get_ops_token().await;
        let replenish = tokio::spawn({
            let throttle = throttle.clone();
            async move { throttle.run_replenish_thread().await }
        });
        let start = tokio::time::Instant::now();
        throttle.get_ops_token().await;
        assert!(start.elapsed() >= std::time::Duration::from_secs(1));
        replenish.abort();
    }
}
