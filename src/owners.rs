//! CODEOWNERS lookup.
//!
//! Reads the first of `CODEOWNERS`, `.github/CODEOWNERS` or
//! `docs/CODEOWNERS` found at the workspace root. The last matching rule
//! wins, as on the hosting platforms.

use anyhow::Result;
use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;

const LOCATIONS: &[&str] = &["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"];

#[derive(Debug)]
struct Rule {
    matchers: Vec<GlobMatcher>,
    owners: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CodeOwners {
    rules: Vec<Rule>,
}

impl CodeOwners {
    /// Load from the workspace root. Missing or unreadable files yield an empty set.
    pub fn load(workspace_root: &Path) -> Self {
        for loc in LOCATIONS {
            let path = workspace_root.join(loc);
            if let Ok(text) = std::fs::read_to_string(&path) {
                match Self::parse(&text) {
                    Ok(owners) => return owners,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring malformed CODEOWNERS");
                    }
                }
            }
        }
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(pattern) = parts.next() else {
                continue;
            };
            let owners: Vec<String> = parts
                .take_while(|p| !p.starts_with('#'))
                .map(|p| p.to_string())
                .collect();
            let matchers = globs_for(pattern)
                .iter()
                .map(|g| {
                    GlobBuilder::new(g)
                        .literal_separator(true)
                        .build()
                        .map(|g| g.compile_matcher())
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rules.push(Rule { matchers, owners });
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Owners of `rel` (workspace-relative, `/`-separated).
    pub fn owners_of(&self, rel: &str) -> Vec<String> {
        self.rules
            .iter()
            .rev()
            .find(|r| r.matchers.iter().any(|m| m.is_match(rel)))
            .map(|r| r.owners.clone())
            .unwrap_or_default()
    }
}

/// Translate one CODEOWNERS pattern into equivalent globs.
fn globs_for(pattern: &str) -> Vec<String> {
    let anchored = pattern.starts_with('/');
    let body = pattern.trim_start_matches('/');
    let body = body.trim_end_matches('/');
    if body.is_empty() || (body == "*" && !anchored) {
        return vec!["**".to_string()];
    }
    let base = if anchored || body.contains('/') {
        body.to_string()
    } else {
        format!("**/{}", body)
    };
    // A directory pattern also owns the directory path itself.
    vec![base.clone(), format!("{}/**", base)]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# default
*                   @platform
/apps/billing/      @payments @finance
docs/               @writers
*.sql               @dba   # inline comment
";

    #[test]
    fn test_last_match_wins() {
        let co = CodeOwners::parse(SAMPLE).unwrap();
        assert_eq!(co.owners_of("apps/web/src/main.ts"), vec!["@platform"]);
        assert_eq!(
            co.owners_of("apps/billing/src/invoice.ts"),
            vec!["@payments", "@finance"]
        );
        assert_eq!(co.owners_of("apps/billing/db/schema.sql"), vec!["@dba"]);
        assert_eq!(co.owners_of("docs/adr/001.md"), vec!["@writers"]);
    }

    #[test]
    fn test_anchored_dir_does_not_match_nested_copy() {
        let co = CodeOwners::parse("/apps/billing/ @payments\n").unwrap();
        assert!(co.owners_of("legacy/apps/billing/x.ts").is_empty());
    }

    #[test]
    fn test_load_without_file_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(CodeOwners::load(tmp.path()).is_empty());
    }

    #[test]
    fn test_load_from_github_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".github")).unwrap();
        std::fs::write(tmp.path().join(".github/CODEOWNERS"), "apps/ @apps-team\n").unwrap();
        let co = CodeOwners::load(tmp.path());
        assert_eq!(co.owners_of("apps/web/index.ts"), vec!["@apps-team"]);
    }
}
