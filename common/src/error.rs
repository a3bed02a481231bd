/// Error reported on the error stream of a sync run.
///
/// # Logging Convention
/// The Display implementation shows the full error chain, so it can be logged with any format
/// specifier:
/// ```ignore
/// tracing::error!("sync failed: {}", &error);   // ✅ Shows full chain
/// tracing::error!("sync failed: {:#}", &error); // ✅ Shows full chain
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Walking a source tree failed for one entry or for the whole tree.
    #[error("{source:#}")]
    Discovery {
        root: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },
    /// Copying a single discovered file failed.
    #[error("{source:#}")]
    Copy {
        src: std::path::PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    #[must_use]
    pub fn discovery(root: &std::path::Path, source: anyhow::Error) -> Self {
        Error::Discovery {
            root: root.to_owned(),
            source,
        }
    }

    #[must_use]
    pub fn copy(src: &std::path::Path, source: anyhow::Error) -> Self {
        Error::Copy {
            src: src.to_owned(),
            source,
        }
    }

    /// Source tree root for discovery errors, source file for copy errors.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Error::Discovery { root, .. } => root,
            Error::Copy { src, .. } => src,
        }
    }

    /// The underlying I/O error kind, if the failure came from the filesystem.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        let source = match self {
            Error::Discovery { source, .. } | Error::Copy { source, .. } => source,
        };
        source
            .chain()
            .find_map(|cause| cause.downcast_ref::<std::io::Error>())
            .map(std::io::Error::kind)
    }
}
