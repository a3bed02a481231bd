//! Extension matching for discovered files
//!
//! Matching is an exact comparison of the final extension of a file name (with the leading
//! dot) against a configured set. There is no case folding and no wildcard support, so
//! `a.EPUB` does not match `.epub`.

use anyhow::anyhow;
use std::ffi::{OsStr, OsString};

/// A single file extension, always stored with its leading dot, e.g. `.epub`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Extension(OsString);

impl Extension {
    pub fn as_os_str(&self) -> &OsStr {
        &self.0
    }
}

impl std::str::FromStr for Extension {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.strip_prefix('.').unwrap_or(s);
        if bare.is_empty() {
            return Err(anyhow!("empty extension is not allowed"));
        }
        if bare.contains('/') {
            return Err(anyhow!("extension {:?} contains a path separator", s));
        }
        if bare.contains('.') {
            return Err(anyhow!(
                "extension {:?} has more than one component, only the final extension of a file name is matched",
                s
            ));
        }
        Ok(Self(OsString::from(format!(".{bare}"))))
    }
}

impl std::fmt::Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

/// Set of extensions a source contributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    set: std::collections::BTreeSet<Extension>,
}

impl Extensions {
    /// Parses each value as an [`Extension`], accepting both `epub` and `.epub`.
    pub fn parse<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> anyhow::Result<Self> {
        let set = values
            .into_iter()
            .map(|value| value.as_ref().parse::<Extension>())
            .collect::<anyhow::Result<_>>()?;
        Ok(Self { set })
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn contains(&self, dotted: &OsStr) -> bool {
        self.set.iter().any(|ext| ext.as_os_str() == dotted)
    }
}

impl std::fmt::Display for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let list: Vec<String> = self.set.iter().map(ToString::to_string).collect();
        write!(f, "{}", list.join(", "))
    }
}

/// Does `path`'s final extension belong to `extensions`.
///
/// Files without an extension (including dot-files such as `.epub`) never match.
pub fn matches(path: &std::path::Path, extensions: &Extensions) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let mut dotted = OsString::with_capacity(ext.len() + 1);
    dotted.push(".");
    dotted.push(ext);
    extensions.contains(&dotted)
}
