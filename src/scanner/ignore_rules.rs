//! Single-path ignore checks matching what [`super::FileWalker`] skips.
//!
//! The walker prunes hidden entries and honours `.ignore`, `.gitignore`,
//! `.git/info/exclude` and the global git excludes. Watch notifications
//! arrive one path at a time, so the same rules are re-evaluated here for
//! the path and each of its ancestors below the project root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use tracing::debug;

/// Per-directory ignore files, highest precedence first
pub const IGNORE_FILES: &[&str] = &[".ignore", ".gitignore"];

/// Repository-local excludes, relative to a repository root
pub const GIT_EXCLUDE: &str = ".git/info/exclude";

#[derive(Debug, Clone)]
pub struct IgnoreRules {
    root: PathBuf,
    global: Arc<Gitignore>,
}

impl IgnoreRules {
    pub fn new(root: &Path) -> Self {
        let (global, err) = Gitignore::global();
        if let Some(err) = err {
            debug!("Global git excludes partially loaded: {}", err);
        }
        Self {
            root: root.to_path_buf(),
            global: Arc::new(global),
        }
    }

    /// True when a walk of the root would not yield `path`.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        let components: Vec<_> = relative.components().collect();
        let mut current = self.root.clone();
        for (i, component) in components.iter().enumerate() {
            current.push(component);
            if component.as_os_str().to_string_lossy().starts_with('.') {
                return true;
            }
            let last = i + 1 == components.len();
            if self.ignores(&current, !last || is_dir) {
                return true;
            }
        }
        false
    }

    /// Whether `path` is itself an ignore file whose edits reshape the walk.
    pub fn is_ignore_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| IGNORE_FILES.contains(&n))
            .unwrap_or(false)
            || path.ends_with(GIT_EXCLUDE)
    }

    /// Deepest decisive match per kind wins; kinds are tried in walker
    /// precedence order.
    fn ignores(&self, path: &Path, is_dir: bool) -> bool {
        for name in IGNORE_FILES.iter().copied().chain(std::iter::once(GIT_EXCLUDE)) {
            for dir in path.ancestors().skip(1) {
                let file = dir.join(name);
                if !file.is_file() {
                    continue;
                }
                match decide(&matcher(dir, &file), path, is_dir) {
                    Some(ignored) => return ignored,
                    None => continue,
                }
            }
        }
        decide(&self.global, path, is_dir).unwrap_or(false)
    }
}

fn matcher(dir: &Path, file: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(dir);
    if let Some(err) = builder.add(file) {
        debug!("Ignore file {} partially parsed: {}", file.display(), err);
    }
    builder.build().unwrap_or_else(|err| {
        debug!("Ignore file {} unusable: {}", file.display(), err);
        Gitignore::empty()
    })
}

fn decide(matcher: &Gitignore, path: &Path, is_dir: bool) -> Option<bool> {
    match matcher.matched(path, is_dir) {
        Match::Ignore(_) => Some(true),
        Match::Whitelist(_) => Some(false),
        Match::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_hidden_components_are_ignored() {
        let dir = TempDir::new().unwrap();
        let rules = IgnoreRules::new(dir.path());
        assert!(rules.is_ignored(&dir.path().join(".storybook/server.js"), false));
        assert!(rules.is_ignored(&dir.path().join("src/.env.js"), false));
        assert!(!rules.is_ignored(&dir.path().join("src/app.js"), false));
    }

    #[test]
    fn test_gitignored_directory_and_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", "generated/\n*.gen.js\n");
        let rules = IgnoreRules::new(dir.path());

        assert!(rules.is_ignored(&dir.path().join("generated/routes.js"), false));
        assert!(rules.is_ignored(&dir.path().join("src/api.gen.js"), false));
        assert!(!rules.is_ignored(&dir.path().join("src/api.js"), false));
    }

    #[test]
    fn test_nested_ignore_file_overrides_parent() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", "*.js\n");
        write(dir.path(), "keep/.gitignore", "!*.js\n");
        let rules = IgnoreRules::new(dir.path());

        assert!(rules.is_ignored(&dir.path().join("drop/a.js"), false));
        assert!(!rules.is_ignored(&dir.path().join("keep/a.js"), false));
    }

    #[test]
    fn test_dot_ignore_takes_precedence() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", "legacy/\n");
        write(dir.path(), ".ignore", "!legacy/\n");
        let rules = IgnoreRules::new(dir.path());
        assert!(!rules.is_ignored(&dir.path().join("legacy/old.js"), false));
    }

    #[test]
    fn test_ignore_file_names() {
        assert!(IgnoreRules::is_ignore_file(Path::new("/p/.gitignore")));
        assert!(IgnoreRules::is_ignore_file(Path::new("/p/sub/.ignore")));
        assert!(IgnoreRules::is_ignore_file(Path::new("/p/.git/info/exclude")));
        assert!(!IgnoreRules::is_ignore_file(Path::new("/p/app.js")));
    }
}
