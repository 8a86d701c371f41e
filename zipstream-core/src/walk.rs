use crate::config::{ArchiveConfig, SymlinkPolicy};
use crate::resolve::ResolvedPath;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File { size: u64 },
    /// Permission denied, vanished mid-walk, or any other per-entry I/O
    /// failure. The consumer decides whether this skips or aborts.
    Unreadable { reason: String },
    /// A followed symlink led back into the current descent path.
    Cycle { ancestor: PathBuf },
}

/// One node of the walk, in emission order.
#[derive(Clone, Debug)]
pub struct WalkedEntry {
    /// `/`-separated path relative to the archived directory.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub kind: EntryKind,
    pub mode: u32,
    pub mtime: i64,
}

impl WalkedEntry {
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }
}

/// Lazy depth-first walk: siblings in lexical name order, parents before
/// children, so an unchanged tree always enumerates identically. One walker
/// per job; never shared.
pub struct Walker {
    base: PathBuf,
    inner: Box<dyn Iterator<Item = walkdir::Result<walkdir::DirEntry>> + Send>,
    follow_links: bool,
}

impl Walker {
    pub fn new(target: &ResolvedPath, cfg: &ArchiveConfig) -> Self {
        let base = target.abs().to_path_buf();
        let follow_links = matches!(
            cfg.symlinks,
            SymlinkPolicy::Follow | SymlinkPolicy::ErrorOnCycle
        );

        let mut walk = WalkDir::new(&base)
            .follow_links(follow_links)
            .sort_by_file_name();
        if let Some(depth) = cfg.max_depth {
            walk = walk.max_depth(depth);
        }

        let include_hidden = cfg.include_hidden;
        let inner = walk
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || include_hidden || !is_hidden(e.file_name()));

        Self {
            base,
            inner: Box::new(inner),
            follow_links,
        }
    }

    fn rel_of(&self, p: &Path) -> String {
        let rel = p.strip_prefix(&self.base).unwrap_or(p);
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        parts.join("/")
    }
}

impl Iterator for Walker {
    type Item = WalkedEntry;

    fn next(&mut self) -> Option<WalkedEntry> {
        loop {
            let item = self.inner.next()?;
            let entry = match item {
                Ok(e) => e,
                Err(err) => {
                    let abs = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let rel_path = self.rel_of(&abs);
                    let kind = match err.loop_ancestor() {
                        Some(anc) => EntryKind::Cycle {
                            ancestor: anc.to_path_buf(),
                        },
                        None => EntryKind::Unreadable {
                            reason: err
                                .io_error()
                                .map(|e| e.to_string())
                                .unwrap_or_else(|| err.to_string()),
                        },
                    };
                    return Some(WalkedEntry {
                        rel_path,
                        abs_path: abs,
                        kind,
                        mode: 0,
                        mtime: 0,
                    });
                }
            };

            // The archived directory itself is not an entry; a file target
            // archives as a single entry under its own name.
            if entry.depth() == 0 && entry.file_type().is_dir() {
                continue;
            }

            let ft = entry.file_type();
            if ft.is_symlink() && !self.follow_links {
                tracing::debug!(path = %entry.path().display(), "skipping symlink");
                continue;
            }

            let abs_path = entry.path().to_path_buf();
            let rel_path = if entry.depth() == 0 {
                abs_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            } else {
                self.rel_of(&abs_path)
            };

            let md = match entry.metadata() {
                Ok(md) => md,
                Err(err) => {
                    return Some(WalkedEntry {
                        rel_path,
                        abs_path,
                        kind: EntryKind::Unreadable {
                            reason: err.to_string(),
                        },
                        mode: 0,
                        mtime: 0,
                    });
                }
            };

            let kind = if ft.is_dir() {
                EntryKind::Dir
            } else if ft.is_file() {
                EntryKind::File { size: md.len() }
            } else {
                // sockets, fifos, device nodes
                tracing::debug!(path = %abs_path.display(), "skipping special file");
                continue;
            };

            return Some(WalkedEntry {
                rel_path,
                abs_path,
                kind,
                mode: mode_from(&md),
                mtime: mtime_from(&md),
            });
        }
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn mode_from(_md: &std::fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        _md.permissions().mode()
    }
    #[cfg(not(unix))]
    {
        if _md.is_dir() { 0o040755 } else { 0o100644 }
    }
}

fn mtime_from(md: &std::fs::Metadata) -> i64 {
    md.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;
    use std::fs;
    use tempfile::TempDir;

    fn walk_rels(dir: &TempDir, cfg: &ArchiveConfig) -> Vec<String> {
        let target = resolve(dir.path(), "").unwrap();
        Walker::new(&target, cfg).map(|e| e.rel_path).collect()
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("beta/inner")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::write(dir.path().join("zz.txt"), b"z").unwrap();
        fs::write(dir.path().join("alpha/b.txt"), b"b").unwrap();
        fs::write(dir.path().join("alpha/a.txt"), b"a").unwrap();
        fs::write(dir.path().join("beta/inner/deep.txt"), b"d").unwrap();
        fs::write(dir.path().join(".hidden"), b"h").unwrap();
        dir
    }

    #[test]
    fn order_is_lexical_depth_first_and_stable() {
        let dir = sample_tree();
        let cfg = ArchiveConfig::default();
        let first = walk_rels(&dir, &cfg);
        assert_eq!(
            first,
            [
                "alpha",
                "alpha/a.txt",
                "alpha/b.txt",
                "beta",
                "beta/inner",
                "beta/inner/deep.txt",
                "zz.txt",
            ]
        );
        // unchanged tree, identical enumeration
        assert_eq!(first, walk_rels(&dir, &cfg));
    }

    #[test]
    fn hidden_entries_follow_policy() {
        let dir = sample_tree();
        let mut cfg = ArchiveConfig::default();
        assert!(!walk_rels(&dir, &cfg).contains(&".hidden".to_string()));

        cfg.include_hidden = true;
        assert!(walk_rels(&dir, &cfg).contains(&".hidden".to_string()));
    }

    #[test]
    fn max_depth_bounds_the_walk() {
        let dir = sample_tree();
        let cfg = ArchiveConfig {
            max_depth: Some(1),
            ..Default::default()
        };
        let rels = walk_rels(&dir, &cfg);
        assert!(rels.contains(&"beta".to_string()));
        assert!(!rels.iter().any(|r| r.contains('/')));
    }

    #[test]
    fn file_entries_carry_sizes() {
        let dir = sample_tree();
        let target = resolve(dir.path(), "").unwrap();
        let entry = Walker::new(&target, &ArchiveConfig::default())
            .find(|e| e.rel_path == "zz.txt")
            .unwrap();
        assert_eq!(entry.kind, EntryKind::File { size: 1 });
        assert!(entry.mtime > 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped_by_default_and_followed_on_request() {
        let dir = sample_tree();
        std::os::unix::fs::symlink(dir.path().join("zz.txt"), dir.path().join("link.txt"))
            .unwrap();

        let cfg = ArchiveConfig::default();
        assert!(!walk_rels(&dir, &cfg).contains(&"link.txt".to_string()));

        let cfg = ArchiveConfig {
            symlinks: SymlinkPolicy::Follow,
            ..Default::default()
        };
        assert!(walk_rels(&dir, &cfg).contains(&"link.txt".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_is_reported_not_hung() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("loop")).unwrap();
        fs::write(dir.path().join("loop/ok.txt"), b"ok").unwrap();
        std::os::unix::fs::symlink(dir.path().join("loop"), dir.path().join("loop/back"))
            .unwrap();

        let cfg = ArchiveConfig {
            symlinks: SymlinkPolicy::Follow,
            ..Default::default()
        };
        let target = resolve(dir.path(), "").unwrap();
        let entries: Vec<_> = Walker::new(&target, &cfg).collect();

        assert!(entries
            .iter()
            .any(|e| matches!(e.kind, EntryKind::Cycle { .. })));
        // the sibling file still walks
        assert!(entries.iter().any(|e| e.rel_path == "loop/ok.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_yields_an_unreadable_entry() {
        use std::os::unix::fs::PermissionsExt;

        let dir = sample_tree();
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("secret.txt"), b"s").unwrap();
        fs::set_permissions(&blocked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&blocked).is_ok() {
            // root ignores the mode bits; nothing to test
            fs::set_permissions(&blocked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let target = resolve(dir.path(), "").unwrap();
        let entries: Vec<_> = Walker::new(&target, &ArchiveConfig::default()).collect();

        fs::set_permissions(&blocked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(entries
            .iter()
            .any(|e| matches!(e.kind, EntryKind::Unreadable { .. })));
        // siblings after the bad entry still walk
        assert!(entries.iter().any(|e| e.rel_path == "zz.txt"));
    }
}
