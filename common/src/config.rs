//! Configuration types for a sync run and for the process running it

use crate::matcher::Extensions;

/// One source directory tree and the extensions it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub path: std::path::PathBuf,
    /// Human readable label used for the discovery statistic of this source.
    pub category: String,
    pub extensions: Extensions,
}

impl SourceSpec {
    /// Spec labeled `documents found in <path>`.
    pub fn new(path: impl Into<std::path::PathBuf>, extensions: Extensions) -> Self {
        let path = path.into();
        let category = format!("documents found in {}", path.display());
        Self {
            path,
            category,
            extensions,
        }
    }
}

/// Settings shared by every copy worker of a run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Flat directory receiving every discovered file, named by its base name.
    pub destination: std::path::PathBuf,
    /// Report what would be copied without touching the destination.
    pub dry_run: bool,
    /// Maximum number of copy workers in flight (0 = one worker per discovered file).
    pub max_copy_tasks: usize,
}

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
