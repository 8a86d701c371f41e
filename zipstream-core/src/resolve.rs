use crate::error::JobError;
use std::path::{Path, PathBuf};

/// An absolute, root-confined location plus its root-relative logical name.
///
/// Only `resolve` constructs these, so holding one is proof the path was
/// validated against the root.
#[derive(Clone, Debug)]
pub struct ResolvedPath {
    abs: PathBuf,
    rel: String,
}

impl ResolvedPath {
    pub fn abs(&self) -> &Path {
        &self.abs
    }

    /// Root-relative name with `/` separators; empty for the root itself.
    pub fn rel(&self) -> &str {
        &self.rel
    }
}

/// Validate and normalize a user-supplied relative path against `root`.
///
/// Accepts `/` and `\` as separators, collapses `.` and `..` lexically, and
/// treats a leading separator as anchored at `root` rather than the
/// filesystem root. Fails with `InvalidPath` on NUL bytes, on any `..` that
/// would climb above `root`, and on targets that do not exist.
pub fn resolve(root: &Path, raw: &str) -> Result<ResolvedPath, JobError> {
    if raw.contains('\0') {
        return Err(invalid(raw, "contains NUL byte"));
    }

    let mut stack: Vec<&str> = Vec::new();
    for comp in raw.split(['/', '\\']) {
        match comp {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(invalid(raw, "escapes the archive root"));
                }
            }
            name => stack.push(name),
        }
    }

    let rel = stack.join("/");
    let mut abs = root.to_path_buf();
    for comp in &stack {
        abs.push(comp);
    }

    // Existence check without following a final symlink; the walk applies
    // the symlink policy itself.
    if std::fs::symlink_metadata(&abs).is_err() {
        return Err(invalid(raw, "no such file or directory"));
    }

    Ok(ResolvedPath { abs, rel })
}

fn invalid(raw: &str, reason: &str) -> JobError {
    JobError::InvalidPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    }
}
