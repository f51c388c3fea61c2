//! File selection from include and exclude globs
//!
//! Patterns are relative to the root they are expanded against. `*` and `?`
//! stay within one path component, `**` spans any number of directories
//! (including none). Names starting with `.` are only matched by a pattern
//! component that starts with `.` itself, so `**` does not pick up
//! `.git/config` while `.cache/**` does.

use globset::{Glob, GlobBuilder, GlobMatcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::{relative_name, ArchiveError};

/// Exclude pattern that, when present verbatim, disables exclusion entirely.
pub const CATCH_ALL: &str = "**";

/// Set of absolute paths selected for one archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelection {
    paths: BTreeSet<PathBuf>,
}

impl FileSelection {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Paths in lexicographic order of their string form.
    ///
    /// This differs from `PathBuf` ordering (`a-b/x` sorts before `a/x`
    /// here) and is the order entries are written in.
    pub fn sorted(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.iter().collect();
        paths.sort_by_cached_key(|p| p.to_string_lossy().into_owned());
        paths
    }
}

impl FromIterator<PathBuf> for FileSelection {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// One compiled include or exclude pattern
#[derive(Debug)]
struct PathPattern {
    matcher: GlobMatcher,
    /// Matchers for the pattern's components that start with `.`
    dot_components: Vec<GlobMatcher>,
}

impl PathPattern {
    fn new(raw: &str) -> Result<Self, ArchiveError> {
        let raw = raw.strip_prefix("./").unwrap_or(raw);
        let matcher = GlobBuilder::new(raw)
            .literal_separator(true)
            .build()?
            .compile_matcher();
        let dot_components = raw
            .split('/')
            .filter(|c| c.starts_with('.'))
            .map(|c| Glob::new(c).map(|g| g.compile_matcher()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            matcher,
            dot_components,
        })
    }

    fn matches(&self, rel: &str) -> bool {
        self.matcher.is_match(rel)
            && rel
                .split('/')
                .filter(|c| c.starts_with('.'))
                .all(|c| self.dot_components.iter().any(|m| m.is_match(c)))
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathPattern>, ArchiveError> {
    patterns.iter().map(|p| PathPattern::new(p.as_ref())).collect()
}

/// Every file and directory below `root`, paired with its relative name.
///
/// Symlinked directories are descended into and their files are named by
/// the link-side path. A symlink loop or a dangling link is an error.
fn walk(root: &Path) -> Result<Vec<(PathBuf, String)>, ArchiveError> {
    if !root.is_dir() {
        return Err(ArchiveError::RootNotFound(root.to_path_buf()));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry?;
        let rel = relative_name(entry.path(), root)?;
        if rel.is_empty() {
            continue;
        }
        found.push((entry.into_path(), rel));
    }
    Ok(found)
}

fn expand<'a>(
    candidates: &'a [(PathBuf, String)],
    patterns: &'a [PathPattern],
) -> impl Iterator<Item = &'a PathBuf> + 'a {
    candidates
        .iter()
        .filter(move |(_, rel)| patterns.iter().any(|p| p.matches(rel)))
        .map(|(path, _)| path)
}

/// Resolve the set of paths under `root` selected by `includes` minus
/// `excludes`.
///
/// When `excludes` contains [`CATCH_ALL`] verbatim the exclude list is
/// ignored and the include matches are returned unchanged. A pattern that
/// matches nothing contributes nothing.
pub fn resolve_selection<S: AsRef<str>>(
    root: &Path,
    includes: &[S],
    excludes: &[S],
) -> Result<FileSelection, ArchiveError> {
    let include_patterns = compile(includes)?;
    let exclude_patterns = compile(excludes)?;
    let candidates = walk(root)?;

    let included: BTreeSet<PathBuf> = expand(&candidates, &include_patterns).cloned().collect();

    if excludes.iter().any(|p| p.as_ref() == CATCH_ALL) {
        debug!(
            root = %root.display(),
            included = included.len(),
            "catch-all exclude present, keeping include matches"
        );
        return Ok(FileSelection { paths: included });
    }

    let excluded: BTreeSet<&PathBuf> = expand(&candidates, &exclude_patterns).collect();
    let paths: BTreeSet<PathBuf> = included
        .into_iter()
        .filter(|p| !excluded.contains(p))
        .collect();

    debug!(
        root = %root.display(),
        selected = paths.len(),
        excluded = excluded.len(),
        "resolved file selection"
    );
    Ok(FileSelection { paths })
}

/// Everything under `dir`, as used for dependency install trees.
pub fn select_all(dir: &Path) -> Result<FileSelection, ArchiveError> {
    resolve_selection::<&str>(dir, &[CATCH_ALL], &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("handler.py"), "print('hi')").unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests").unwrap();

        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/util.py"), "x = 1").unwrap();
        fs::write(dir.path().join("pkg/requirements-dev.txt"), "pytest").unwrap();

        fs::create_dir_all(dir.path().join("dist/requirements")).unwrap();
        fs::write(dir.path().join("dist/stack-app-lambda.zip"), "zip").unwrap();

        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), "git").unwrap();

        dir
    }

    fn names(root: &Path, selection: &FileSelection) -> Vec<String> {
        selection
            .sorted()
            .into_iter()
            .map(|p| relative_name(p, root).unwrap())
            .collect()
    }

    #[test]
    fn test_catch_all_include() {
        let dir = create_test_dir();
        let selection = resolve_selection(dir.path(), &["**"], &[]).unwrap();

        assert_eq!(
            names(dir.path(), &selection),
            vec![
                "dist",
                "dist/requirements",
                "dist/stack-app-lambda.zip",
                "handler.py",
                "pkg",
                "pkg/requirements-dev.txt",
                "pkg/util.py",
                "requirements.txt",
            ]
        );
    }

    #[test]
    fn test_hidden_entries_need_dot_pattern() {
        let dir = create_test_dir();

        let all = resolve_selection(dir.path(), &["**"], &[]).unwrap();
        assert!(!all.contains(&dir.path().join(".git/config")));

        let git = resolve_selection(dir.path(), &[".git/**"], &[]).unwrap();
        assert_eq!(names(dir.path(), &git), vec![".git/config"]);
    }

    #[test]
    fn test_single_star_stays_at_top_level() {
        let dir = create_test_dir();
        let selection =
            resolve_selection(dir.path(), &["**"], &["requirements*.txt", "dist/**"]).unwrap();

        let names = names(dir.path(), &selection);
        assert!(!names.contains(&"requirements.txt".to_string()));
        assert!(names.contains(&"pkg/requirements-dev.txt".to_string()));
    }

    #[test]
    fn test_double_star_prefix_matches_any_depth() {
        let dir = create_test_dir();
        let selection =
            resolve_selection(dir.path(), &["**"], &["**/requirements*.txt"]).unwrap();

        let names = names(dir.path(), &selection);
        assert!(!names.contains(&"requirements.txt".to_string()));
        assert!(!names.contains(&"pkg/requirements-dev.txt".to_string()));
        assert!(names.contains(&"pkg/util.py".to_string()));
    }

    #[test]
    fn test_staging_exclude_drops_contents() {
        let dir = create_test_dir();
        let selection = resolve_selection(dir.path(), &["**"], &["dist/**"]).unwrap();

        assert!(!selection.contains(&dir.path().join("dist/stack-app-lambda.zip")));
        assert!(!selection.contains(&dir.path().join("dist/requirements")));
    }

    #[test]
    fn test_catch_all_exclude_keeps_includes() {
        let dir = create_test_dir();
        let with_catch_all =
            resolve_selection(dir.path(), &["*.py"], &["handler.py", "**"]).unwrap();

        assert_eq!(names(dir.path(), &with_catch_all), vec!["handler.py"]);
    }

    #[test]
    fn test_multiple_includes_union() {
        let dir = create_test_dir();
        let selection = resolve_selection(dir.path(), &["*.py", "pkg/*.py", "*.py"], &[]).unwrap();

        assert_eq!(names(dir.path(), &selection), vec!["handler.py", "pkg/util.py"]);
    }

    #[test]
    fn test_unmatched_pattern_is_empty() {
        let dir = create_test_dir();
        let selection = resolve_selection(dir.path(), &["*.rs"], &[]).unwrap();
        assert!(selection.is_empty());
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = resolve_selection(&missing, &["**"], &[]).unwrap_err();
        assert!(matches!(err, ArchiveError::RootNotFound(p) if p == missing));
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = create_test_dir();
        let err = resolve_selection(dir.path(), &["src/[a-"], &[]).unwrap_err();
        assert!(matches!(err, ArchiveError::Pattern(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_descended() {
        let dir = create_test_dir();
        fs::create_dir(dir.path().join("shared_target")).unwrap();
        fs::write(dir.path().join("shared_target/common.py"), "C = 1").unwrap();
        std::os::unix::fs::symlink(dir.path().join("shared_target"), dir.path().join("shared"))
            .unwrap();

        let selection = resolve_selection(dir.path(), &["**/*.py"], &[]).unwrap();

        assert_eq!(
            names(dir.path(), &selection),
            vec!["handler.py", "pkg/util.py", "shared/common.py", "shared_target/common.py"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_an_error() {
        let dir = create_test_dir();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("pkg/loop")).unwrap();

        let err = resolve_selection(dir.path(), &["**"], &[]).unwrap_err();
        assert!(matches!(err, ArchiveError::Walk(_)));
    }

    #[test]
    fn test_sorted_uses_string_order() {
        let selection: FileSelection = vec![
            PathBuf::from("/r/a/x"),
            PathBuf::from("/r/a-b/x"),
            PathBuf::from("/r/B"),
        ]
        .into_iter()
        .collect();

        let sorted: Vec<_> = selection.sorted().into_iter().map(|p| p.to_path_buf()).collect();
        assert_eq!(
            sorted,
            vec![
                PathBuf::from("/r/B"),
                PathBuf::from("/r/a-b/x"),
                PathBuf::from("/r/a/x"),
            ]
        );
    }
}
