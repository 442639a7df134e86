//! Workspace discovery, path guarding and file access.
//!
//! Project roots are discovered once, when the [`Workspace`] is opened, by
//! matching `app_globs` against directories under the workspace root.
//! Every path a caller supplies goes through [`Workspace::guard`] before it
//! is touched.

use anyhow::{bail, Result};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use workspace_mcp_core::classify::PathClassifier;
use workspace_mcp_core::fuzzy::AppCandidate;

use crate::config::{Config, IndexConfig};
use crate::error::ToolError;

/// Depth limit for app globs containing `**`.
const MAX_DISCOVERY_DEPTH: usize = 8;

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    canonical_root: PathBuf,
    roots: Vec<PathBuf>,
    ignore: GlobSet,
    include: GlobSet,
    index: IndexConfig,
    classifier: PathClassifier,
}

impl Workspace {
    pub fn open(config: &Config) -> Result<Self> {
        let root = normalize(&config.workspace.root);
        if !root.is_dir() {
            bail!("Workspace root does not exist: {}", root.display());
        }
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.clone());
        let ignore = build_globset(&config.workspace.ignore)?;
        let include = build_globset(&config.index.include)?;

        let mut ws = Self {
            root,
            canonical_root,
            roots: Vec::new(),
            ignore,
            include,
            index: config.index.clone(),
            classifier: config.classifier.build()?,
        };
        ws.roots = ws.discover(&config.workspace.app_globs)?;
        tracing::info!(
            root = %ws.root.display(),
            roots = ws.roots.len(),
            "workspace opened"
        );
        Ok(ws)
    }

    fn discover(&self, app_globs: &[String]) -> Result<Vec<PathBuf>> {
        let mut builder = GlobSetBuilder::new();
        let mut depth = 1;
        for pattern in app_globs {
            let pattern = pattern.trim_end_matches('/');
            builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
            depth = depth.max(if pattern.contains("**") {
                MAX_DISCOVERY_DEPTH
            } else {
                pattern.split('/').count()
            });
        }
        let apps = builder.build()?;

        let mut found = BTreeSet::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(depth)
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || !self.is_ignored_dir(e.path()));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_dir() {
                continue;
            }
            let rel = rel_string(entry.path(), &self.root);
            if apps.is_match(&rel) {
                found.insert(entry.path().to_path_buf());
            }
        }
        Ok(found.into_iter().collect())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project roots, sorted. Fixed for the lifetime of this value.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    /// `path` relative to the workspace root with `/` separators.
    pub fn relative(&self, path: &Path) -> String {
        rel_string(path, &self.root)
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let rel = self.relative(path);
        !rel.is_empty() && self.ignore.is_match(&rel)
    }

    /// Directory patterns such as `**/dist/**` only match paths below the
    /// directory, so probe with a child name as well.
    fn is_ignored_dir(&self, path: &Path) -> bool {
        let rel = self.relative(path);
        !rel.is_empty()
            && (self.ignore.is_match(&rel) || self.ignore.is_match(format!("{}/_", rel)))
    }

    /// Resolve a caller-supplied path (absolute, or relative to the
    /// workspace root) and reject it unless it lies inside the root.
    pub fn resolve(&self, input: &str) -> std::result::Result<PathBuf, ToolError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ToolError::invalid("path", "must not be empty"));
        }
        self.guard(Path::new(trimmed))
    }

    pub fn guard(&self, path: &Path) -> std::result::Result<PathBuf, ToolError> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = normalize(&joined);
        if !resolved.starts_with(&self.root) {
            return Err(ToolError::OutsideWorkspace(resolved));
        }
        // Symlinks inside the tree must not lead out of it.
        if let Ok(real) = resolved.canonicalize() {
            if !real.starts_with(&self.canonical_root) {
                return Err(ToolError::OutsideWorkspace(real));
            }
        }
        Ok(resolved)
    }

    /// Candidates for fuzzy project matching.
    pub fn app_candidates(&self) -> Vec<AppCandidate> {
        self.roots
            .iter()
            .map(|root| AppCandidate {
                name: project_name(root),
                rel: self.relative(root),
                path: root.clone(),
            })
            .collect()
    }

    /// Indexable files under `project`, sorted, at most `index.max_files`.
    pub fn code_files(&self, project: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkDir::new(project)
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || !self.is_ignored_dir(e.path()));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = rel_string(entry.path(), project);
            if !self.include.is_match(&rel) || self.is_ignored(entry.path()) {
                continue;
            }
            files.push(entry.into_path());
        }
        files.sort();
        files.truncate(self.index.max_files);
        files
    }

    pub fn is_large(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.len() > self.index.large_file_bytes)
            .unwrap_or(false)
    }

    /// File text for indexing and previews. Large files are reduced to their
    /// head plus definition-like lines. `None` for unreadable or binary files.
    pub fn read_text(&self, path: &Path) -> Option<String> {
        let text = read_utf8(path)?;
        if text.len() as u64 > self.index.large_file_bytes {
            Some(self.summarize_large(&text))
        } else {
            Some(text)
        }
    }

    /// The first `head_lines` lines and up to `max_definitions`
    /// definition-like lines from anywhere in the file. Large files are held
    /// to the large-file limits as well. `None` for unreadable or binary files.
    pub fn outline(&self, path: &Path, head_lines: usize, max_definitions: usize) -> Option<FileOutline> {
        let text = read_utf8(path)?;
        let large = text.len() as u64 > self.index.large_file_bytes;
        let (head_lines, max_definitions) = if large {
            (
                head_lines.min(self.index.large_file_head_lines),
                max_definitions.min(self.index.large_file_max_definitions),
            )
        } else {
            (head_lines, max_definitions)
        };
        Some(FileOutline {
            line_count: text.lines().count(),
            head: text.lines().take(head_lines).map(str::to_string).collect(),
            definitions: text
                .lines()
                .enumerate()
                .filter(|(_, l)| self.classifier.is_definition(l))
                .take(max_definitions)
                .map(|(i, l)| (i + 1, l.trim_end().to_string()))
                .collect(),
            large,
        })
    }

    fn summarize_large(&self, text: &str) -> String {
        let head = self.index.large_file_head_lines;
        let mut out: Vec<&str> = text.lines().take(head).collect();
        out.push("...");
        out.extend(
            text.lines()
                .skip(head)
                .filter(|l| self.classifier.is_definition(l))
                .take(self.index.large_file_max_definitions),
        );
        out.join("\n")
    }
}

/// Head and definition lines of one file. Definition line numbers are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutline {
    pub line_count: usize,
    pub head: Vec<String>,
    pub definitions: Vec<(usize, String)>,
    pub large: bool,
}

fn read_utf8(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    String::from_utf8(bytes).ok()
}

/// Whether `path` or any ancestor contains a `.git` entry.
pub fn is_in_git_repo(path: &Path) -> bool {
    path.ancestors().any(|dir| dir.join(".git").exists())
}

/// Last path segment, or the whole path for `/`.
pub fn project_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned())
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn rel_string(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for dir in [
            "apps/web/src",
            "apps/api/src",
            "apps/api/node_modules/left-pad",
            "packages/ui",
            "docs",
        ] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("apps/web/src/main.ts"), "export function main() {}").unwrap();
        fs::write(root.join("apps/api/src/server.py"), "def serve():\n    pass\n").unwrap();
        fs::write(root.join("apps/api/node_modules/left-pad/index.js"), "module.exports = 1").unwrap();
        fs::write(root.join("apps/api/logo.png"), [0u8, 1, 2]).unwrap();

        let mut config = Config::for_workspace(root);
        config.workspace.app_globs = vec!["apps/*".to_string(), "packages/*".to_string()];
        (tmp, config)
    }

    #[test]
    fn test_discovers_matching_dirs_only() {
        let (tmp, config) = fixture();
        let ws = Workspace::open(&config).unwrap();
        let rels: Vec<String> = ws.roots().iter().map(|r| ws.relative(r)).collect();
        assert_eq!(rels, vec!["apps/api", "apps/web", "packages/ui"]);
        assert!(ws.roots().iter().all(|r| r.starts_with(tmp.path())));
    }

    #[test]
    fn test_code_files_respect_ignore_and_include() {
        let (_tmp, config) = fixture();
        let ws = Workspace::open(&config).unwrap();
        let api = ws.root().join("apps/api");
        let files: Vec<String> = ws
            .code_files(&api)
            .iter()
            .map(|f| ws.relative(f))
            .collect();
        assert_eq!(files, vec!["apps/api/src/server.py"]);
    }

    #[test]
    fn test_guard_rejects_escapes() {
        let (_tmp, config) = fixture();
        let ws = Workspace::open(&config).unwrap();
        assert!(matches!(
            ws.resolve("../outside"),
            Err(ToolError::OutsideWorkspace(_))
        ));
        assert!(matches!(
            ws.resolve("/etc/passwd"),
            Err(ToolError::OutsideWorkspace(_))
        ));
        assert!(matches!(
            ws.resolve("apps/web/../../../x"),
            Err(ToolError::OutsideWorkspace(_))
        ));
    }

    #[test]
    fn test_guard_rejects_sibling_with_shared_prefix() {
        let (_tmp, config) = fixture();
        let ws = Workspace::open(&config).unwrap();
        let sibling = format!("{}-other/file", ws.root().display());
        assert!(matches!(
            ws.resolve(&sibling),
            Err(ToolError::OutsideWorkspace(_))
        ));
    }

    #[test]
    fn test_guard_accepts_relative_and_absolute_inside() {
        let (_tmp, config) = fixture();
        let ws = Workspace::open(&config).unwrap();
        let rel = ws.resolve("apps/web/./src/main.ts").unwrap();
        assert_eq!(rel, ws.root().join("apps/web/src/main.ts"));
        let abs = ws
            .resolve(&ws.root().join("apps/api").display().to_string())
            .unwrap();
        assert_eq!(abs, ws.root().join("apps/api"));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_rejects_symlink_escape() {
        let (_tmp, config) = fixture();
        let outside = TempDir::new().unwrap();
        let ws = Workspace::open(&config).unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.root().join("apps/web/link")).unwrap();
        assert!(matches!(
            ws.resolve("apps/web/link"),
            Err(ToolError::OutsideWorkspace(_))
        ));
    }

    #[test]
    fn test_large_file_is_summarized() {
        let (_tmp, mut config) = fixture();
        config.index.large_file_bytes = 64;
        config.index.large_file_head_lines = 2;
        let ws = Workspace::open(&config).unwrap();
        let path = ws.root().join("apps/web/src/big.ts");
        let body = "// header\n// more\nlet a = 1;\nexport function big() {}\nlet b = 2;\nclass Thing {}\n";
        fs::write(&path, body).unwrap();
        let text = ws.read_text(&path).unwrap();
        assert_eq!(
            text,
            "// header\n// more\n...\nexport function big() {}\nclass Thing {}"
        );
    }

    #[test]
    fn test_outline_finds_definitions_inside_head() {
        let (_tmp, config) = fixture();
        let ws = Workspace::open(&config).unwrap();
        let outline = ws.outline(&ws.root().join("apps/web/src/main.ts"), 60, 60).unwrap();
        assert_eq!(outline.line_count, 1);
        assert_eq!(outline.head, vec!["export function main() {}"]);
        assert_eq!(outline.definitions, vec![(1, "export function main() {}".to_string())]);
        assert!(!outline.large);
    }

    #[test]
    fn test_outline_applies_large_file_limits() {
        let (_tmp, mut config) = fixture();
        config.index.large_file_bytes = 64;
        config.index.large_file_head_lines = 2;
        config.index.large_file_max_definitions = 1;
        let ws = Workspace::open(&config).unwrap();
        let path = ws.root().join("apps/web/src/big.ts");
        let body = "// header\n// more\nlet a = 1;\nexport function big() {}\nlet b = 2;\nclass Thing {}\n";
        fs::write(&path, body).unwrap();
        let outline = ws.outline(&path, 60, 60).unwrap();
        assert!(outline.large);
        assert_eq!(outline.line_count, 6);
        assert_eq!(outline.head, vec!["// header", "// more"]);
        assert_eq!(outline.definitions, vec![(4, "export function big() {}".to_string())]);
    }

    #[test]
    fn test_binary_file_is_unreadable() {
        let (_tmp, config) = fixture();
        let ws = Workspace::open(&config).unwrap();
        let path = ws.root().join("apps/web/blob.bin");
        fs::write(&path, [0xffu8, 0xfe, 0x00]).unwrap();
        assert!(ws.read_text(&path).is_none());
    }

    #[test]
    fn test_git_detection_walks_upward() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("repo/.git")).unwrap();
        fs::create_dir_all(tmp.path().join("repo/apps/x")).unwrap();
        assert!(is_in_git_repo(&tmp.path().join("repo/apps/x")));
    }

    #[test]
    fn test_normalize_is_lexical() {
        assert_eq!(normalize(Path::new("/ws/a/../b/./c")), PathBuf::from("/ws/b/c"));
        assert_eq!(normalize(Path::new("/ws/../../x")), PathBuf::from("/x"));
    }
}
