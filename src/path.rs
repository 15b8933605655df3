//! Guest path resolution.
//!
//! The mapper owns the preopen table: an ordered set of guest-prefix to
//! host-prefix pairs, rooted at `/`. Resolving a guest path selects the
//! mapping with the longest matching prefix, splices the host prefix in,
//! collapses `.` and `..` lexically, and then walks the result component by
//! component so that every symlink expansion is re-checked against the
//! selected preopen's canonical root. A path that escapes -- via `..` or via
//! a symlink pointing outside -- fails with `Notcapable`.

use crate::wasi::{Errno, Lookupflags};
use crate::{Error, Result};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

const MAX_SYMLINK_EXPANSIONS: usize = 128;

/// The reserved guest prefix: `/dev` names virtual devices, never host files.
pub(crate) const DEV_PREFIX: &str = "/dev";

pub(crate) struct PathMapper {
    mappings: RwLock<BTreeMap<String, PathBuf>>,
}

impl PathMapper {
    /// Create a mapper with the mandatory root mapping `/` -> `host_root`.
    pub fn new(host_root: PathBuf) -> Self {
        let mut mappings = BTreeMap::new();
        mappings.insert("/".to_owned(), host_root);
        Self {
            mappings: RwLock::new(mappings),
        }
    }

    /// Bind `guest_prefix` to `host_prefix`. The guest prefix is normalized
    /// to start with `/` and not end with one; `/dev` and its subpaths are
    /// reserved. The host prefix must name an existing absolute directory
    /// and is stored canonicalized so containment checks compare real paths.
    pub fn add_mapping(&self, guest_prefix: &str, host_prefix: &Path) -> Result<()> {
        let guest = normalize_prefix(guest_prefix)?;
        if guest == DEV_PREFIX || guest.starts_with("/dev/") {
            return Err(Errno::Inval.into());
        }
        if !host_prefix.is_absolute() {
            return Err(Errno::Inval.into());
        }
        let host = fs::canonicalize(host_prefix)?;
        self.mappings.write().unwrap().insert(guest, host);
        Ok(())
    }

    pub fn remove_mapping(&self, guest_prefix: &str) -> bool {
        let guest = match normalize_prefix(guest_prefix) {
            Ok(g) => g,
            Err(_) => return false,
        };
        if guest == "/" {
            // The root mapping is structural and cannot be unbound.
            return false;
        }
        self.mappings.write().unwrap().remove(&guest).is_some()
    }

    /// Translate an absolute guest path to a host path.
    ///
    /// `flags` carries the caller's `SYMLINK_FOLLOW` policy for the final
    /// component; intermediate symlinks are always expanded (and contained).
    pub fn map_to_host(&self, guest_path: &str, flags: Lookupflags) -> Result<PathBuf> {
        if !guest_path.starts_with('/') {
            return Err(Errno::Notcapable.into());
        }
        let (root, remainder) = self.select_mapping(guest_path)?;
        let parts = collapse(Path::new(&remainder))?;
        resolve_within(
            &root,
            parts,
            flags.contains(Lookupflags::SYMLINK_FOLLOW),
        )
    }

    /// The longest mapping whose guest prefix covers `guest_path` at a
    /// segment boundary, plus the uncovered remainder of the path.
    fn select_mapping(&self, guest_path: &str) -> Result<(PathBuf, String)> {
        let mappings = self.mappings.read().unwrap();
        let mut selected: Option<(&String, &PathBuf)> = None;
        for (prefix, host) in mappings.iter() {
            let matches = if prefix == "/" {
                true
            } else {
                guest_path == prefix
                    || guest_path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            };
            if matches && selected.map_or(true, |(cur, _)| prefix.len() > cur.len()) {
                selected = Some((prefix, host));
            }
        }
        let (prefix, host) = selected.ok_or(Errno::Noent)?;
        let remainder = if prefix == "/" {
            guest_path[1..].to_owned()
        } else {
            guest_path[prefix.len()..]
                .trim_start_matches('/')
                .to_owned()
        };
        Ok((host.clone(), remainder))
    }

}

/// Join a path relative to a descriptor's guest path, without collapsing.
pub(crate) fn join_guest(base: &str, rel: &str) -> String {
    if base == "/" {
        format!("/{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

/// Collapse an absolute guest path lexically, for bookkeeping and for the
/// reserved `/dev` namespace check. Escaping above `/` is `Notcapable`.
pub(crate) fn normalize_guest(guest_path: &str) -> Result<String> {
    if !guest_path.starts_with('/') {
        return Err(Errno::Notcapable.into());
    }
    let parts = collapse(Path::new(&guest_path[1..]))?;
    if parts.is_empty() {
        return Ok("/".to_owned());
    }
    let mut out = String::new();
    for part in parts {
        out.push('/');
        out.push_str(&part);
    }
    Ok(out)
}

fn normalize_prefix(guest_prefix: &str) -> Result<String> {
    if !guest_prefix.starts_with('/') {
        return Err(Errno::Inval.into());
    }
    let trimmed = guest_prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_owned())
    } else {
        Ok(trimmed.to_owned())
    }
}

/// Lexically collapse a relative path into plain components, resolving `.`
/// and `..` without touching the filesystem. Popping past the start means
/// the path escapes its mapping root.
fn collapse(path: &Path) -> Result<VecDeque<String>> {
    let mut parts: VecDeque<String> = VecDeque::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(Errno::Notcapable.into());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop_back().is_none() {
                    return Err(Errno::Notcapable.into());
                }
            }
            Component::Normal(c) => {
                let c = c.to_str().ok_or(Errno::Ilseq)?;
                parts.push_back(c.to_owned());
            }
        }
    }
    Ok(parts)
}

/// Walk `parts` downwards from the canonical `root`, expanding symlinks as
/// they are met. Each expansion splices the link target back into the work
/// queue, so containment is enforced after every step rather than once at
/// the end. The final component is only dereferenced when `follow_final`.
fn resolve_within(
    root: &Path,
    mut parts: VecDeque<String>,
    follow_final: bool,
) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut expansions = 0;

    while let Some(part) = parts.pop_front() {
        match part.as_str() {
            "." => continue,
            ".." => {
                if resolved == root {
                    return Err(Errno::Notcapable.into());
                }
                resolved.pop();
                continue;
            }
            _ => {}
        }
        let next = resolved.join(&part);
        let is_final = parts.is_empty();
        let is_symlink = fs::symlink_metadata(&next)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        if is_symlink && (!is_final || follow_final) {
            expansions += 1;
            if expansions > MAX_SYMLINK_EXPANSIONS {
                return Err(Errno::Loop.into());
            }
            let target = fs::read_link(&next)?;
            if target.is_absolute() {
                // An absolute link target restarts resolution at the
                // preopen root and must stay inside it.
                let within = target
                    .strip_prefix(root)
                    .map_err(|_| Error::from(Errno::Notcapable))?;
                resolved = root.to_path_buf();
                let mut spliced = collapse(within)?;
                spliced.extend(parts.drain(..));
                parts = spliced;
            } else {
                for piece in target
                    .components()
                    .rev()
                    .map(|c| c.as_os_str().to_str().ok_or(Errno::Ilseq))
                {
                    parts.push_front(piece?.to_owned());
                }
            }
        } else {
            resolved = next;
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errno_of<T>(res: Result<T>) -> Errno {
        res.err().expect("expected an error").as_wasi_errno()
    }

    fn mapper(root: &Path) -> PathMapper {
        PathMapper::new(fs::canonicalize(root).unwrap())
    }

    #[test]
    fn longest_prefix_wins() {
        let outer = tempfile::tempdir().unwrap();
        let inner = tempfile::tempdir().unwrap();
        let m = mapper(outer.path());
        m.add_mapping("/data", inner.path()).unwrap();
        m.add_mapping("/data/sub", inner.path()).unwrap();

        let host = m
            .map_to_host("/data/sub/x.txt", Lookupflags::empty())
            .unwrap();
        assert!(host.starts_with(fs::canonicalize(inner.path()).unwrap()));
        assert!(host.ends_with("x.txt"));

        // "/database" must not match the "/data" mapping.
        let host = m.map_to_host("/database", Lookupflags::empty()).unwrap();
        assert!(host.starts_with(fs::canonicalize(outer.path()).unwrap()));
    }

    #[test]
    fn dev_prefix_is_reserved() {
        let root = tempfile::tempdir().unwrap();
        let m = mapper(root.path());
        assert_eq!(
            errno_of(m.add_mapping("/dev", root.path())),
            Errno::Inval
        );
        assert_eq!(
            errno_of(m.add_mapping("/dev/null", root.path())),
            Errno::Inval
        );
    }

    #[test]
    fn dot_dot_cannot_escape() {
        let root = tempfile::tempdir().unwrap();
        let m = mapper(root.path());
        assert_eq!(
            errno_of(m.map_to_host("/../../etc/passwd", Lookupflags::empty())),
            Errno::Notcapable
        );
        // Descend-then-climb inside the sandbox is fine...
        fs::create_dir(root.path().join("a")).unwrap();
        let host = m.map_to_host("/a/../ok", Lookupflags::empty()).unwrap();
        assert!(host.ends_with("ok"));
        // ...but climbing past the root is not.
        assert_eq!(
            errno_of(m.map_to_host("/a/../../x", Lookupflags::empty())),
            Errno::Notcapable
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_contained() {
        let root = tempfile::tempdir().unwrap();
        let m = mapper(root.path());
        std::os::unix::fs::symlink("/etc", root.path().join("evil")).unwrap();
        std::os::unix::fs::symlink("../..", root.path().join("climb")).unwrap();

        assert_eq!(
            errno_of(m.map_to_host("/evil/passwd", Lookupflags::empty())),
            Errno::Notcapable
        );
        assert_eq!(
            errno_of(m.map_to_host("/climb/x", Lookupflags::empty())),
            Errno::Notcapable
        );
        // The unfollowed final component is allowed to be a symlink.
        let host = m.map_to_host("/evil", Lookupflags::empty()).unwrap();
        assert!(host.ends_with("evil"));
        assert_eq!(
            errno_of(m.map_to_host("/evil", Lookupflags::SYMLINK_FOLLOW)),
            Errno::Notcapable
        );
    }

    #[cfg(unix)]
    #[test]
    fn interior_symlinks_resolve_within_root() {
        let root = tempfile::tempdir().unwrap();
        let m = mapper(root.path());
        fs::create_dir(root.path().join("real")).unwrap();
        std::os::unix::fs::symlink("real", root.path().join("alias")).unwrap();
        let host = m
            .map_to_host("/alias/file.txt", Lookupflags::empty())
            .unwrap();
        assert!(host.ends_with("real/file.txt"));
    }

    #[test]
    fn remove_mapping_but_never_the_root() {
        let root = tempfile::tempdir().unwrap();
        let sub = tempfile::tempdir().unwrap();
        let m = mapper(root.path());
        m.add_mapping("/mnt", sub.path()).unwrap();
        assert!(m.remove_mapping("/mnt"));
        assert!(!m.remove_mapping("/mnt"));
        assert!(!m.remove_mapping("/"));
    }
}
