use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Length of the image tag derived from a context digest
const TAG_LENGTH: usize = 12;

/// Content digest of a container build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDigest {
    /// Number of files that went into the digest
    pub files: usize,
    /// Lowercase hex SHA-256
    pub sha256: String,
}

impl ContextDigest {
    /// Image tag derived from the digest. Stable for an unchanged context.
    pub fn tag(&self) -> String {
        self.sha256[..TAG_LENGTH].to_string()
    }
}

/// Scanner for digesting a container build context directory
pub struct Scanner {
    /// Root directory to scan
    context_dir: PathBuf,
    /// Patterns to exclude
    exclude_patterns: Vec<String>,
    /// Individual files to skip, canonicalized
    excluded_files: Vec<PathBuf>,
}

impl Scanner {
    /// Create a new scanner
    pub fn new(context_dir: PathBuf, exclude_patterns: Vec<String>) -> Self {
        Scanner {
            context_dir,
            exclude_patterns,
            excluded_files: Vec::new(),
        }
    }

    /// Skip these files wherever they sit inside the context. Paths that do
    /// not exist yet are resolved against their closest existing ancestor.
    pub fn with_excluded_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.excluded_files = files
            .into_iter()
            .map(|f| resolve_path(f.as_ref()))
            .collect();
        self
    }

    /// Collect every file in the context, sorted by relative path
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.context_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()))
        {
            let entry = entry.with_context(|| {
                format!("Failed to walk build context: {}", self.context_dir.display())
            })?;
            if entry.file_type().is_file() && !self.is_excluded_file(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }

        Ok(files)
    }

    /// Hash relative paths and file contents into one digest
    pub fn digest(&self) -> Result<ContextDigest> {
        if !self.context_dir.is_dir() {
            anyhow::bail!(
                "Build context is not a directory: {}",
                self.context_dir.display()
            );
        }

        let files = self.scan()?;
        let mut hasher = Sha256::new();

        for path in &files {
            let relative = self.relative_path(path);
            let content = fs::read(path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;

            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(&content);

            debug!(file = %relative, bytes = content.len(), "digested context file");
        }

        Ok(ContextDigest {
            files: files.len(),
            sha256: format!("{:x}", hasher.finalize()),
        })
    }

    /// Path relative to the context root, always with `/` separators
    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.context_dir).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn is_excluded_file(&self, path: &Path) -> bool {
        if self.excluded_files.is_empty() {
            return false;
        }
        let resolved = resolve_path(path);
        self.excluded_files.iter().any(|f| *f == resolved)
    }

    /// Check if a path should be excluded
    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.context_dir).unwrap_or(path);

        self.exclude_patterns.iter().any(|pattern| {
            relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy() == *pattern)
        })
    }
}

/// Canonical form of `path`. Missing trailing components are appended to
/// the canonicalized ancestor that exists.
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut missing = Vec::new();
    let mut current = absolute.as_path();
    loop {
        if let Ok(canonical) = fs::canonicalize(current) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return absolute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_is_excluded() {
        let scanner = Scanner::new(
            PathBuf::from("/ctx"),
            vec!["target".to_string(), "node_modules".to_string()],
        );

        assert!(scanner.is_excluded(Path::new("/ctx/target/debug/app")));
        assert!(scanner.is_excluded(Path::new("/ctx/web/node_modules/x.js")));
        assert!(!scanner.is_excluded(Path::new("/ctx/src/main.rs")));
        // only whole components match
        assert!(!scanner.is_excluded(Path::new("/ctx/targets.txt")));
    }

    #[test]
    fn test_digest_is_stable() {
        let temp = tempdir().unwrap();
        write(temp.path(), "Dockerfile", "FROM node:20\n");
        write(temp.path(), "src/index.js", "console.log('hi')\n");

        let scanner = Scanner::new(temp.path().to_path_buf(), vec![]);
        let first = scanner.digest().unwrap();
        let second = scanner.digest().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.files, 2);
        assert_eq!(first.sha256.len(), 64);
        assert_eq!(first.tag().len(), 12);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let temp = tempdir().unwrap();
        write(temp.path(), "Dockerfile", "FROM node:20\n");
        let scanner = Scanner::new(temp.path().to_path_buf(), vec![]);
        let before = scanner.digest().unwrap();

        write(temp.path(), "Dockerfile", "FROM node:22\n");
        let after = scanner.digest().unwrap();

        assert_ne!(before.tag(), after.tag());
    }

    #[test]
    fn test_digest_ignores_excluded_directories() {
        let temp = tempdir().unwrap();
        write(temp.path(), "Dockerfile", "FROM node:20\n");
        let scanner = Scanner::new(temp.path().to_path_buf(), vec!["target".to_string()]);
        let before = scanner.digest().unwrap();

        write(temp.path(), "target/build.log", "noise");
        let after = scanner.digest().unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_digest_skips_excluded_files() {
        let temp = tempdir().unwrap();
        write(temp.path(), "Dockerfile", "FROM node:20\n");
        let output = temp.path().join("deploy/out/template.json");
        let scanner = Scanner::new(temp.path().to_path_buf(), vec![])
            .with_excluded_files([&output]);
        let before = scanner.digest().unwrap();

        write(temp.path(), "deploy/out/template.json", "{}");
        let after = scanner.digest().unwrap();
        assert_eq!(before, after);

        // siblings of an excluded file still count
        write(temp.path(), "deploy/out/notes.txt", "x");
        assert_ne!(scanner.digest().unwrap(), before);
    }

    #[test]
    fn test_resolve_path_through_missing_components() {
        let temp = tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();
        assert_eq!(
            resolve_path(&temp.path().join("a/b.json")),
            canonical.join("a").join("b.json")
        );
    }

    #[test]
    fn test_digest_missing_context() {
        let scanner = Scanner::new(PathBuf::from("/definitely/not/here"), vec![]);
        assert!(scanner.digest().is_err());
    }
}
