use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
}

impl Counter {
    pub fn add(&self, value: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Counters of a single sync run, shared with its tasks through an `Arc`.
///
/// Counters only ever grow, so a plain atomic add is enough; nothing reads-modifies-writes
/// them under a lock.
#[derive(Debug)]
pub struct Progress {
    pub discovered: Counter,
    pub copied: Counter,
    pub skipped: Counter,
    pub failed: Counter,
    pub bytes_copied: Counter,
    start_time: std::time::Instant,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            discovered: Default::default(),
            copied: Default::default(),
            skipped: Default::default(),
            failed: Default::default(),
            bytes_copied: Default::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            discovered: self.discovered.get(),
            copied: self.copied.get(),
            skipped: self.skipped.get(),
            failed: self.failed.get(),
            bytes_copied: self.bytes_copied.get(),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// Final counts of a completed run; `copied + skipped + failed == discovered`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub discovered: u64,
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes_copied: u64,
}

impl Summary {
    pub fn is_balanced(&self) -> bool {
        self.copied + self.skipped + self.failed == self.discovered
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files discovered: {}\n\
            files copied: {}\n\
            files skipped: {}\n\
            files failed: {}\n\
            bytes copied: {}",
            self.discovered,
            self.copied,
            self.skipped,
            self.failed,
            bytesize::ByteSize(self.bytes_copied),
        )
    }
}

pub struct ProgressPrinter<'a> {
    progress: &'a Progress,
    last_done: u64,
    last_update: std::time::Instant,
}

impl<'a> ProgressPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        Self {
            progress,
            last_done: Self::done(progress),
            last_update: std::time::Instant::now(),
        }
    }

    fn done(progress: &Progress) -> u64 {
        progress.copied.get() + progress.skipped.get() + progress.failed.get()
    }

    pub fn print(&mut self) -> String {
        let time_now = std::time::Instant::now();
        let done = Self::done(self.progress);
        let discovered = self.progress.discovered.get();
        let total_duration_secs = self.progress.get_duration().as_secs_f64();
        let curr_duration_secs = (time_now - self.last_update).as_secs_f64();
        let average_rate = rate(done, total_duration_secs);
        let current_rate = rate(done.saturating_sub(self.last_done), curr_duration_secs);
        self.last_done = done;
        self.last_update = time_now;
        format!(
            "-----------------------\n\
            discovered: {:>10}\n\
            pending:    {:>10}\n\
            average:    {:>10.2} files/s\n\
            current:    {:>10.2} files/s\n\
            -----------------------\n\
            copied:     {:>10}\n\
            skipped:    {:>10}\n\
            failed:     {:>10}\n\
            bytes:      {:>10}",
            discovered,
            discovered.saturating_sub(done),
            average_rate,
            current_rate,
            self.progress.copied.get(),
            self.progress.skipped.get(),
            self.progress.failed.get(),
            bytesize::ByteSize(self.progress.bytes_copied.get()),
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(count: u64, secs: f64) -> f64 {
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}
