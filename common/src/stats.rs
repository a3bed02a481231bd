/// What a [`Stat`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// Files discovered in one source tree.
    Discovered,
    /// Files not copied because a file of the same name already existed at the destination.
    Skipped,
    /// Files copied to the destination.
    Copied,
    /// Files a dry run would have copied.
    WouldCopy,
}

/// A labeled count reported on the statistics stream of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: StatKind,
    pub category: String,
    pub count: u64,
}

impl Stat {
    pub fn discovered(category: &str, count: u64) -> Self {
        Self {
            kind: StatKind::Discovered,
            category: category.to_owned(),
            count,
        }
    }

    pub fn skipped(count: u64) -> Self {
        Self {
            kind: StatKind::Skipped,
            category: "files not copied because they already existed at the destination"
                .to_owned(),
            count,
        }
    }

    /// Copied count, labeled as "would copy" for dry runs.
    pub fn copied(count: u64, dry_run: bool) -> Self {
        if dry_run {
            Self {
                kind: StatKind::WouldCopy,
                category: "files that would be copied".to_owned(),
                count,
            }
        } else {
            Self {
                kind: StatKind::Copied,
                category: "files copied".to_owned(),
                count,
            }
        }
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.count)
    }
}
