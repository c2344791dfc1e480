//! Client path resolution.
//!
//! Every path a client hands us is treated as hostile until it has been
//! decoded, joined under the served root, lexically cleaned and checked to
//! still live under that root. Resolution never touches the filesystem;
//! whether the path exists is the caller's problem.

use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("malformed path encoding: {0:?}")]
    Malformed(String),
    #[error("path escapes the served root: {0:?}")]
    Escapes(String),
    #[error("invalid path: {0:?}")]
    Invalid(String),
    #[error("root must be an absolute path: {0}")]
    RelativeRoot(PathBuf),
}

/// Joins client-supplied paths under a fixed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathError> {
        let root = root.as_ref();
        if !root.is_absolute() {
            return Err(PathError::RelativeRoot(root.to_path_buf()));
        }
        Ok(Self {
            root: clean(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decode a URL-escaped path, then resolve it.
    ///
    /// A decoding failure is reported as [`PathError::Malformed`], kept apart
    /// from traversal so callers can tell a bad filename from an attack.
    pub fn resolve_escaped(&self, escaped: &str) -> Result<PathBuf, PathError> {
        let decoded = decode(escaped)?;
        self.resolve(&decoded)
    }

    /// Resolve an already decoded path under the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        self.resolve_parts(&[relative])
    }

    /// Resolve several client-supplied parts joined in order, e.g. a
    /// destination directory followed by a filename.
    pub fn resolve_parts(&self, parts: &[&str]) -> Result<PathBuf, PathError> {
        let mut joined = self.root.clone();
        for part in parts {
            if part.contains('\0') {
                return Err(PathError::Invalid(part.to_string()));
            }
            // join semantics: a leading separator on a part does not
            //  replace what came before it
            for component in Path::new(part).components() {
                match component {
                    Component::Prefix(_) | Component::RootDir => {}
                    other => joined.push(other.as_os_str()),
                }
            }
        }

        let cleaned = clean(&joined);
        if !cleaned.starts_with(&self.root) {
            return Err(PathError::Escapes(parts.join("/")));
        }
        Ok(cleaned)
    }
}

/// Lexically clean an absolute path: drop `.`, fold `..` into its parent and
/// collapse redundant separators. `..` at the filesystem root stays at the
/// root.
pub fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(cleaned.components().next_back(), Some(Component::Normal(_))) {
                    cleaned.pop();
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Strictly percent-decode a URL path.
///
/// Every `%` must introduce two hex digits and the decoded bytes must be
/// UTF-8. `+` is kept literally since this is a path, not a form value.
pub fn decode(escaped: &str) -> Result<String, PathError> {
    let malformed = || PathError::Malformed(escaped.to_string());

    // percent_decode passes stray `%` through untouched
    let bytes = escaped.as_bytes();
    for (i, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'%') {
        match bytes.get(i + 1..i + 3) {
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {}
            _ => return Err(malformed()),
        }
    }

    percent_decode_str(escaped)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| malformed())
}
