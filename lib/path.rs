//! Canonical virtual path grammar and host path mapping.
//!
//! Every request entering the bridge carries a host-native path; it is
//! converted into a [`VirtualPath`] before touching the cache or the store.
//! The canonical grammar is forward-slash separated, absolute, with no
//! trailing slash except for the root itself.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path '{path}' is outside the virtualization root '{}'", .root.display())]
    OutsideRoot { path: String, root: PathBuf },
}

/// Canonical absolute path used internally by the bridge.
///
/// Derived on every request via [`PathMapper`]; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The root path, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Normalize a separator-mixed path fragment into canonical form.
    ///
    /// Converts `\` to `/`, collapses repeated separators, drops `.`
    /// segments, forces a leading `/`, and strips any trailing separator.
    /// The empty string, `.`, and bare separators all map to the root.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len() + 1);
        out.push('/');
        for segment in raw.split(['/', '\\']) {
            if segment.is_empty() || segment == "." {
                continue;
            }
            if out.len() > 1 {
                out.push('/');
            }
            out.push_str(segment);
        }
        Self(out)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Append `name` as a child segment, normalizing the result.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let mut raw = self.0.clone();
        raw.push('/');
        raw.push_str(name);
        Self::normalize(&raw)
    }

    /// The parent path. The parent of the root, or of a single-segment
    /// path, is the root.
    #[must_use]
    pub fn parent(&self) -> Self {
        match self.0.rfind('/') {
            Some(0) | None => Self::root(),
            Some(idx) => Self(self.0[..idx].to_owned()),
        }
    }

    /// The final path segment, or the empty string for the root.
    #[must_use]
    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => "",
        }
    }

    /// Whether `self` is a strict descendant of `ancestor`.
    ///
    /// `/foo/bar` descends from `/foo`, but `/foobar` does not.
    #[must_use]
    pub fn is_strict_descendant_of(&self, ancestor: &Self) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Bidirectional translation between host-native paths and the canonical
/// virtual grammar, anchored at a configured virtualization root.
pub struct PathMapper {
    root: PathBuf,
    /// Forward-slash rendering of `root`, without a trailing separator,
    /// used for prefix matching against incoming host paths.
    root_unified: String,
}

impl PathMapper {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut root_unified = root.to_string_lossy().replace('\\', "/");
        while root_unified.ends_with('/') && root_unified.len() > 1 {
            root_unified.pop();
        }
        Self { root, root_unified }
    }

    #[must_use]
    pub fn virtualization_root(&self) -> &Path {
        &self.root
    }

    /// Convert a host-supplied path into canonical virtual form.
    ///
    /// Paths under the configured root have the root prefix stripped.
    /// Drive-letter paths outside the root are rejected. Everything else
    /// is treated as root-relative and normalized.
    pub fn to_virtual_path(&self, host_path: &str) -> Result<VirtualPath, PathError> {
        let unified = host_path.replace('\\', "/");

        if !self.root_unified.is_empty() {
            if unified == self.root_unified {
                return Ok(VirtualPath::root());
            }
            if let Some(rest) = unified.strip_prefix(&self.root_unified) {
                if rest.starts_with('/') {
                    return Ok(VirtualPath::normalize(rest));
                }
            }
        }

        if has_drive_prefix(&unified) {
            return Err(PathError::OutsideRoot {
                path: host_path.to_owned(),
                root: self.root.clone(),
            });
        }

        Ok(VirtualPath::normalize(&unified))
    }

    /// Join a virtual path back under the virtualization root.
    #[must_use]
    pub fn to_host_path(&self, path: &VirtualPath) -> PathBuf {
        let mut out = self.root.clone();
        for segment in path.as_str().split('/').filter(|s| !s.is_empty()) {
            out.push(segment);
        }
        out
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Match a name against a host wildcard pattern, ASCII case-insensitively.
///
/// `*` matches any run of characters and `?` any single character. An
/// absent, empty, or `*` pattern matches everything. Every other character
/// is literal, so `*.*` only matches names containing a dot.
#[must_use]
pub fn matches_pattern(name: &str, pattern: Option<&str>) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };
    if pattern.is_empty() || pattern == "*" {
        return true;
    }

    let name: Vec<char> = name.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    // Iterative wildcard match with star backtracking.
    let (mut n, mut p) = (0_usize, 0_usize);
    let mut star: Option<usize> = None;
    let mut mark = 0_usize;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            n += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            mark = n;
            p += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            mark += 1;
            n = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(
            VirtualPath::normalize(r"folder\\file.txt").as_str(),
            "/folder/file.txt"
        );
        assert_eq!(
            VirtualPath::normalize(r"folder\file.txt").as_str(),
            "/folder/file.txt"
        );
        assert_eq!(VirtualPath::normalize("a//b///c").as_str(), "/a/b/c");
    }

    #[test]
    fn normalize_maps_empty_and_dot_to_root() {
        assert_eq!(VirtualPath::normalize("").as_str(), "/");
        assert_eq!(VirtualPath::normalize(r"\").as_str(), "/");
        assert_eq!(VirtualPath::normalize(".").as_str(), "/");
        assert_eq!(VirtualPath::normalize("/").as_str(), "/");
    }

    #[test]
    fn normalize_strips_trailing_separator() {
        assert_eq!(VirtualPath::normalize("a/b/").as_str(), "/a/b");
        assert_eq!(VirtualPath::normalize(r"a\b\").as_str(), "/a/b");
    }

    #[test]
    fn parent_of_root_and_single_segment_is_root() {
        assert!(VirtualPath::root().parent().is_root());
        assert!(VirtualPath::normalize("file.txt").parent().is_root());
        assert_eq!(
            VirtualPath::normalize("a/b/c").parent().as_str(),
            "/a/b"
        );
    }

    #[test]
    fn file_name_of_root_is_empty() {
        assert_eq!(VirtualPath::root().file_name(), "");
        assert_eq!(VirtualPath::normalize("a/b.txt").file_name(), "b.txt");
    }

    #[test]
    fn join_normalizes() {
        let base = VirtualPath::normalize("a");
        assert_eq!(base.join("b.txt").as_str(), "/a/b.txt");
        assert_eq!(VirtualPath::root().join("x").as_str(), "/x");
    }

    #[test]
    fn strict_descendant_requires_separator_boundary() {
        let foo = VirtualPath::normalize("foo");
        assert!(VirtualPath::normalize("foo/bar").is_strict_descendant_of(&foo));
        assert!(!VirtualPath::normalize("foobar").is_strict_descendant_of(&foo));
        assert!(!foo.is_strict_descendant_of(&foo));
        assert!(foo.is_strict_descendant_of(&VirtualPath::root()));
        assert!(!VirtualPath::root().is_strict_descendant_of(&VirtualPath::root()));
    }

    #[test]
    fn host_round_trip_reproduces_canonical_form() {
        let mapper = PathMapper::new("/srv/cas/mnt");
        for raw in ["docs/readme.md", "a/b/c", "top.txt"] {
            let vpath = mapper.to_virtual_path(raw).unwrap();
            let host = mapper.to_host_path(&vpath);
            let back = mapper.to_virtual_path(&host.to_string_lossy()).unwrap();
            assert_eq!(back, vpath, "round trip failed for {raw}");
        }
    }

    #[test]
    fn drive_letter_root_is_stripped() {
        let mapper = PathMapper::new(r"C:\virt");
        let vpath = mapper.to_virtual_path(r"C:\virt\docs\a.txt").unwrap();
        assert_eq!(vpath.as_str(), "/docs/a.txt");
        assert!(
            mapper.to_virtual_path(r"C:\virt").unwrap().is_root(),
            "the root itself maps to /"
        );
    }

    #[test]
    fn out_of_root_drive_path_errors_with_both_paths() {
        let mapper = PathMapper::new(r"C:\virt");
        let err = mapper.to_virtual_path(r"D:\elsewhere\x").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(r"D:\elsewhere\x"), "message names the path: {msg}");
        assert!(msg.contains("virt"), "message names the root: {msg}");
    }

    #[test]
    fn pattern_star_and_absent_match_everything() {
        assert!(matches_pattern("anything", None));
        assert!(matches_pattern("anything", Some("*")));
        assert!(matches_pattern("anything", Some("")));
    }

    #[test]
    fn pattern_matches_per_host_wildcard_rules() {
        assert!(matches_pattern("test.txt", Some("*.txt")));
        assert!(matches_pattern("TEST.TXT", Some("*.txt")), "case-insensitive");
        assert!(!matches_pattern("readme", Some("*.*")));
        assert!(matches_pattern("readme.md", Some("*.*")));
        assert!(matches_pattern("test1.txt", Some("test?.txt")));
        assert!(!matches_pattern("test.txt", Some("test?.txt")));
        assert!(!matches_pattern("test.txt", Some("*.md")));
    }
}
