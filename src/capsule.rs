//! Local heuristic capsules.
//!
//! Built only from files already on disk: the README or docs for the
//! purpose line, the path classifier for entrypoints and tests, and
//! CODEOWNERS for owners. This is the fallback whenever the external
//! summarizer is unavailable.

use chrono::Utc;
use std::path::{Path, PathBuf};
use workspace_mcp_core::classify::PathCategory;
use workspace_mcp_core::models::{Capsule, CapsuleSource};

use crate::owners::CodeOwners;
use crate::workspace::{project_name, Workspace};

pub const HEURISTIC_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_ROLE: &str = "workspace unit";

const MAX_ENTRYPOINTS: usize = 10;
const MAX_KEY_MODULES: usize = 20;
const MAX_TESTS: usize = 20;
const MAX_EVIDENCE: usize = 5;
const MIN_PARAGRAPH_CHARS: usize = 30;
const MAX_PURPOSE_CHARS: usize = 140;

pub fn heuristic_capsule(ws: &Workspace, owners: &CodeOwners, root: &Path) -> Capsule {
    let files = ws.code_files(root);
    let classifier = ws.classifier();
    let rel = |p: &Path| p.strip_prefix(root).unwrap_or(p).to_path_buf();

    let entrypoints: Vec<PathBuf> = files
        .iter()
        .filter(|f| classifier.is(&rel(f), PathCategory::Entrypoint))
        .take(MAX_ENTRYPOINTS)
        .cloned()
        .collect();
    let tests: Vec<PathBuf> = files
        .iter()
        .filter(|f| classifier.is(&rel(f), PathCategory::Test))
        .take(MAX_TESTS)
        .cloned()
        .collect();
    let docs = doc_files(root);
    let name = project_name(root);

    let purpose = purpose_from_docs(root, &docs).unwrap_or_else(|| {
        format!(
            "Workspace unit {} summarized from {} files",
            name,
            files.len()
        )
    });

    Capsule {
        project_root: root.to_path_buf(),
        name,
        purpose,
        role: DEFAULT_ROLE.to_string(),
        confidence: HEURISTIC_CONFIDENCE,
        evidence_paths: files.iter().take(MAX_EVIDENCE).cloned().collect(),
        entrypoints,
        key_modules: top_level_sources(root),
        tests,
        docs,
        owners: owners.owners_of(&ws.relative(root)),
        source: CapsuleSource::Heuristic,
        generated_at: Utc::now(),
    }
}

/// README files at the project root followed by `docs/*.md`.
fn doc_files(root: &Path) -> Vec<PathBuf> {
    let mut out = sorted_files(root, |name| name.to_ascii_lowercase().starts_with("readme"));
    out.extend(sorted_files(&root.join("docs"), |name| name.ends_with(".md")));
    out
}

/// Plain files directly under `src/`.
fn top_level_sources(root: &Path) -> Vec<PathBuf> {
    let mut out = sorted_files(&root.join("src"), |_| true);
    out.truncate(MAX_KEY_MODULES);
    out
}

fn sorted_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| keep(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    out.sort();
    out
}

/// One-line purpose from docs, then manifests. `None` when nothing usable exists.
pub fn purpose_from_docs(root: &Path, docs: &[PathBuf]) -> Option<String> {
    for doc in docs {
        if let Ok(text) = std::fs::read_to_string(doc) {
            if let Some(p) = first_paragraph(&text) {
                return Some(p);
            }
        }
    }
    manifest_description(root)
}

fn first_paragraph(markdown: &str) -> Option<String> {
    markdown
        .split("\n\n")
        .map(|para| {
            para.lines()
                .map(str::trim)
                .filter(|l| !l.starts_with('#') && !l.starts_with("![") && !l.starts_with("[!["))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .map(|p| clean(&p))
        .find(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
}

fn clean(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '#' | '>'))
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_PURPOSE_CHARS).collect()
}

fn manifest_description(root: &Path) -> Option<String> {
    if let Ok(text) = std::fs::read_to_string(root.join("package.json")) {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(d) = v.get("description").and_then(|d| d.as_str()) {
                if !d.trim().is_empty() {
                    return Some(clean(d));
                }
            }
        }
    }
    for (file, paths) in [
        ("pyproject.toml", &["project", "tool.poetry"][..]),
        ("Cargo.toml", &["package"][..]),
    ] {
        let Ok(text) = std::fs::read_to_string(root.join(file)) else {
            continue;
        };
        let Ok(doc) = text.parse::<toml::Table>() else {
            continue;
        };
        for table_path in paths {
            let mut node: Option<&toml::Value> = None;
            let mut table = Some(&doc);
            for key in table_path.split('.') {
                node = table.and_then(|t| t.get(key));
                table = node.and_then(|n| n.as_table());
            }
            if let Some(d) = table.and_then(|t| t.get("description")).and_then(|d| d.as_str()) {
                if !d.trim().is_empty() {
                    return Some(clean(d));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(setup: impl FnOnce(&Path)) -> (TempDir, Workspace) {
        let tmp = TempDir::new().unwrap();
        setup(tmp.path());
        let mut config = Config::for_workspace(tmp.path());
        config.workspace.app_globs = vec!["apps/*".to_string()];
        let ws = Workspace::open(&config).unwrap();
        (tmp, ws)
    }

    #[test]
    fn test_capsule_from_readme_and_layout() {
        let (tmp, ws) = workspace(|root| {
            let app = root.join("apps/billing");
            fs::create_dir_all(app.join("src")).unwrap();
            fs::create_dir_all(app.join("tests")).unwrap();
            fs::write(
                app.join("README.md"),
                "# Billing\n\n![badge](x.svg)\n\nThe billing service issues **invoices** and\nhandles refunds for every order.\n",
            )
            .unwrap();
            fs::write(app.join("src/main.ts"), "export function main() {}").unwrap();
            fs::write(app.join("src/invoice.ts"), "export class Invoice {}").unwrap();
            fs::write(app.join("tests/invoice.test.ts"), "test('x', () => {})").unwrap();
        });
        let root = tmp.path().join("apps/billing");
        let cap = heuristic_capsule(&ws, &CodeOwners::default(), &root);

        assert_eq!(cap.name, "billing");
        assert_eq!(
            cap.purpose,
            "The billing service issues invoices and handles refunds for every order."
        );
        assert_eq!(cap.entrypoints, vec![root.join("src/main.ts")]);
        assert_eq!(cap.tests, vec![root.join("tests/invoice.test.ts")]);
        assert_eq!(
            cap.key_modules,
            vec![root.join("src/invoice.ts"), root.join("src/main.ts")]
        );
        assert_eq!(cap.docs, vec![root.join("README.md")]);
        assert_eq!(cap.source, CapsuleSource::Heuristic);
        assert_eq!(cap.confidence, HEURISTIC_CONFIDENCE);
    }

    #[test]
    fn test_purpose_falls_back_to_manifest() {
        let (tmp, ws) = workspace(|root| {
            let app = root.join("apps/cli");
            fs::create_dir_all(&app).unwrap();
            fs::write(
                app.join("pyproject.toml"),
                "[project]\nname = \"cli\"\ndescription = \"Command line tools for release managers\"\n",
            )
            .unwrap();
        });
        let cap = heuristic_capsule(&ws, &CodeOwners::default(), &tmp.path().join("apps/cli"));
        assert_eq!(cap.purpose, "Command line tools for release managers");
    }

    #[test]
    fn test_purpose_without_docs_names_the_unit() {
        let (tmp, ws) = workspace(|root| {
            let app = root.join("apps/empty");
            fs::create_dir_all(&app).unwrap();
            fs::write(app.join("notes.txt"), "short").unwrap();
        });
        let cap = heuristic_capsule(&ws, &CodeOwners::default(), &tmp.path().join("apps/empty"));
        assert_eq!(cap.purpose, "Workspace unit empty summarized from 1 files");
        assert_eq!(cap.evidence_paths.len(), 1);
    }

    #[test]
    fn test_owners_come_from_codeowners() {
        let (tmp, ws) = workspace(|root| {
            fs::create_dir_all(root.join("apps/web")).unwrap();
        });
        let owners = CodeOwners::parse("/apps/web/ @frontend\n").unwrap();
        let cap = heuristic_capsule(&ws, &owners, &tmp.path().join("apps/web"));
        assert_eq!(cap.owners, vec!["@frontend"]);
    }

    #[test]
    fn test_clean_truncates() {
        let long = "word ".repeat(60);
        assert_eq!(clean(&long).chars().count(), MAX_PURPOSE_CHARS);
    }
}
