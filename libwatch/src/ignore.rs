use std::path::Path;

use regex::Regex;

use crate::error::WatchError;

/// Glob-like ignore patterns, each anchored against the whole candidate path.
///
/// - `**` matches one or more characters, path separators included.
/// - `*` matches one or more characters inside a single path segment.
///
/// A pattern has to start with `**/` to match at an arbitrary depth, so
/// `*.md` matches `README.md` but not `docs/README.md`.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<Regex>,
}

impl IgnoreList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, WatchError> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IgnoreList { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn should_ignore<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref().to_string_lossy();
        self.patterns.iter().any(|re| re.is_match(&path))
    }
}

fn compile(pattern: &str) -> Result<Regex, WatchError> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".+")
        .replace(r"\*", "[^/]+");
    Regex::new(&format!("^{escaped}$")).map_err(|source| WatchError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored(patterns: &[&str], path: &str) -> bool {
        IgnoreList::new(patterns).unwrap().should_ignore(path)
    }

    #[test]
    fn test_double_star_crosses_separators() {
        assert!(ignored(&["**/*.txt"], "a/b/c/file.txt"));
        assert!(!ignored(&["**/*.txt"], "a/b/c/file.md"));
        assert!(ignored(&["docs/**"], "docs/readme.md"));
        assert!(ignored(&["docs/**"], "docs/sub/readme.md"));
        assert!(ignored(&["**/target/**"], "/home/dev/app/target/debug/app"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(ignored(&["docs/*"], "docs/readme.md"));
        assert!(!ignored(&["docs/*"], "docs/sub/readme.md"));
    }

    #[test]
    fn test_anchored_to_entire_path() {
        assert!(ignored(&["*.md"], "README.md"));
        assert!(!ignored(&["*.md"], "docs/readme.md"));
        assert!(!ignored(&["docs"], "docs/readme.md"));
        assert!(!ignored(&["readme.md"], "docs/readme.md"));
        // `**` needs at least one character before the separator
        assert!(!ignored(&["**/*.tmp"], "scratch.tmp"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        assert!(ignored(&["build(1)/*.o"], "build(1)/main.o"));
        assert!(!ignored(&["a.c"], "abc"));
        assert!(!ignored(&["a+b"], "aab"));
    }

    #[test]
    fn test_any_pattern_matches() {
        let list = IgnoreList::new(&["**/*.tmp", "**/.git/**"]).unwrap();
        assert!(list.should_ignore("D/scratch.tmp"));
        assert!(list.should_ignore("repo/.git/HEAD/x"));
        assert!(!list.should_ignore("D/keep.txt"));
        assert!(IgnoreList::default().is_empty());
        assert!(!IgnoreList::default().should_ignore("anything"));
    }
}
