use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::instrument;

const DEFAULT_EXTENSIONS: [&str; 2] = [".epub", ".pdf"];
const DEFAULT_PROGRESS_DELAY: &str = "10s";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "booksync",
    version,
    about = "Copy e-books and documents that aren't on the e-reader yet",
    long_about = "`booksync` finds documents by extension under one or more source directories and copies \
the ones that are missing into a single destination directory, typically a mounted e-reader.

Files are matched against the destination by name only: a file that already exists there is never \
overwritten, even if its contents differ. Sub-directories are not recreated at the destination, every \
file lands directly in it.

EXAMPLES:
    # Preview what would be copied to the default destination
    booksync --dry-run

    # Copy EPUBs and PDFs from two directories onto a mounted Kobo
    booksync --destination /media/reader/KOBOeReader --source ~/Documents --source ~/Downloads

    # Copy only MOBI files
    booksync --destination /mnt/kindle/documents --extension mobi

    # PDFs from one directory, EPUBs and MOBIs from another
    booksync --source ~/Papers:pdf --source ~/Books:epub,mobi

EXIT CODES:
    0 - All files were copied or already present
    1 - Invalid arguments or at least one error during the sync"
)]
struct Args {
    // Sync options
    /// Directory receiving the files [default: /media/<user>/KOBOeReader]
    #[arg(long, value_name = "DIR", help_heading = "Sync options")]
    destination: Option<std::path::PathBuf>,

    /// Directory to search for documents (can be specified multiple times) [default: ~/Documents]
    ///
    /// Extensions for this directory alone can be appended after a colon, e.g.
    /// "~/Books:epub,pdf"; they replace the --extension set for that directory.
    #[arg(long = "source", value_name = "DIR[:EXT,...]", action = clap::ArgAction::Append, help_heading = "Sync options")]
    sources: Vec<std::path::PathBuf>,

    /// File extension to synchronize, with or without the leading dot (can be specified multiple
    /// times) [default: .epub .pdf]
    ///
    /// Matching is case-sensitive: ".epub" does not match "BOOK.EPUB".
    #[arg(long = "extension", value_name = "EXT", action = clap::ArgAction::Append, help_heading = "Sync options")]
    extensions: Vec<String>,

    /// Only report what would be copied, don't touch the destination
    #[arg(long, help_heading = "Sync options")]
    dry_run: bool,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Sets the delay between progress updates (default: 10s)
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Maximum number of open files, 0 means no limit, leaving unspecified means using 80% of max open files system limit
    #[arg(long, value_name = "N", help_heading = "Performance & throttling")]
    max_open_files: Option<usize>,

    /// Throttle the number of operations per second, 0 means no throttle
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    ops_throttle: usize,

    /// Maximum number of files copied at the same time, 0 means one task per discovered file
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    max_copy_tasks: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

/// Validated inputs of a sync run.
#[derive(Debug)]
struct Config {
    sources: Vec<common::SourceSpec>,
    settings: common::Settings,
    progress_delay: Option<std::time::Duration>,
}

fn current_user() -> Result<nix::unistd::User> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .context("failed looking up the current user")?
        .ok_or_else(|| anyhow!("no user entry found for the current user"))
}

fn default_destination(user: &nix::unistd::User) -> std::path::PathBuf {
    std::path::Path::new("/media")
        .join(&user.name)
        .join("KOBOeReader")
}

fn default_sources(user: &nix::unistd::User) -> Vec<std::path::PathBuf> {
    vec![user.dir.join("Documents")]
}

fn check_accessible_dir(path: &std::path::Path, what: &str) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("the {what} directory {path:?} is not accessible"))?;
    if !metadata.is_dir() {
        return Err(anyhow!("the {what} path {path:?} is not a directory"));
    }
    Ok(())
}

/// Splits `DIR[:EXT,...]` into the directory and its own extensions, if any.
///
/// An argument naming an existing path is always taken as a plain directory.
fn split_source(
    arg: &std::path::Path,
) -> Result<(std::path::PathBuf, Option<common::Extensions>)> {
    if arg.exists() {
        return Ok((arg.to_owned(), None));
    }
    let Some((dir, list)) = arg.to_str().and_then(|arg| arg.rsplit_once(':')) else {
        return Ok((arg.to_owned(), None));
    };
    if dir.is_empty() || list.contains('/') {
        return Ok((arg.to_owned(), None));
    }
    let extensions = common::Extensions::parse(list.split(',').filter(|ext| !ext.is_empty()))
        .with_context(|| format!("invalid extensions for source {dir:?}"))?;
    if extensions.is_empty() {
        return Err(anyhow!(
            "no extensions given for source {dir:?}, at least one extension must be given"
        ));
    }
    Ok((std::path::PathBuf::from(dir), Some(extensions)))
}

fn resolve(args: &Args) -> Result<Config> {
    let destination = match &args.destination {
        Some(destination) => destination.clone(),
        None => default_destination(&current_user()?),
    };
    let source_dirs = if args.sources.is_empty() {
        default_sources(&current_user()?)
    } else {
        args.sources.clone()
    };
    let extensions = if args.extensions.is_empty() {
        common::Extensions::parse(DEFAULT_EXTENSIONS)?
    } else {
        common::Extensions::parse(&args.extensions).context("invalid --extension")?
    };
    check_accessible_dir(&destination, "destination")?;
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::with_capacity(source_dirs.len());
    for arg in source_dirs {
        let (dir, own_extensions) = split_source(&arg)?;
        check_accessible_dir(&dir, "source")?;
        let canonical = std::fs::canonicalize(&dir)
            .with_context(|| format!("failed resolving source directory {dir:?}"))?;
        if !seen.insert(canonical) {
            return Err(anyhow!("duplicate source directory: {dir:?}"));
        }
        let extensions = own_extensions.unwrap_or_else(|| extensions.clone());
        sources.push(common::SourceSpec::new(dir, extensions));
    }
    let progress_delay = if args.progress || args.progress_delay.is_some() {
        let delay = args
            .progress_delay
            .as_deref()
            .unwrap_or(DEFAULT_PROGRESS_DELAY);
        Some(
            humantime::parse_duration(delay)
                .with_context(|| format!("invalid --progress-delay {delay:?}"))?,
        )
    } else {
        None
    };
    Ok(Config {
        sources,
        settings: common::Settings {
            destination,
            dry_run: args.dry_run,
            max_copy_tasks: args.max_copy_tasks,
        },
        progress_delay,
    })
}

#[instrument]
async fn async_main(
    config: Config,
    throttle_config: throttle::ThrottleConfig,
    quiet: bool,
    summary: bool,
) -> Result<common::Summary> {
    let throttle = throttle::Throttle::new(&throttle_config);
    let handle = common::sync(config.sources, config.settings, throttle);
    let printer = config.progress_delay.map(|delay| {
        let progress = handle.progress();
        tokio::spawn(async move {
            let mut printer = common::ProgressPrinter::new(&progress);
            loop {
                tokio::time::sleep(delay).await;
                eprintln!("{}", printer.print());
            }
        })
    });
    let report = common::report::drain(handle, |event| match event {
        common::report::Event::Stat(stat) => println!("{stat}"),
        common::report::Event::Error(error) => {
            if !quiet {
                eprintln!("{error:#}");
            }
        }
    })
    .await;
    if let Some(printer) = printer {
        printer.abort();
    }
    let report = report?;
    if !report.success() {
        if summary {
            return Err(anyhow!(
                "booksync encountered errors\n\n{}",
                &report.summary
            ));
        }
        return Err(anyhow!("booksync encountered errors"));
    }
    Ok(report.summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let config = match resolve(&args) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error:#}");
            std::process::exit(1);
        }
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let throttle_config = throttle::ThrottleConfig {
        max_open_files: args.max_open_files,
        ops_throttle: args.ops_throttle,
    };
    let func = move || async_main(config, throttle_config, args.quiet, args.summary);
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
