//! Lexical path resolution against an explicit working directory.

use std::path::{Component, Path, PathBuf};

/// Resolve `raw` against `cwd`, expanding `~` to the user's home directory.
///
/// Purely lexical: nothing is read from disk. Empty-input defaults belong to
/// the caller.
#[must_use]
pub fn resolve(raw: &str, cwd: &Path) -> PathBuf {
    resolve_with_home(raw, cwd, dirs::home_dir().as_deref())
}

/// [`resolve`] with an explicit home directory.
#[must_use]
pub fn resolve_with_home(raw: &str, cwd: &Path, home: Option<&Path>) -> PathBuf {
    let expanded = match (raw, home) {
        ("~", Some(home)) => home.to_path_buf(),
        (raw, Some(home)) if raw.starts_with("~/") => home.join(&raw[2..]),
        (raw, _) => PathBuf::from(raw),
    };

    if expanded.is_absolute() {
        normalize(&expanded)
    } else {
        normalize(&cwd.join(expanded))
    }
}

/// Collapse `.`, `..` and repeated separators without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
