//! Path and content classification.
//!
//! Decides whether a project-relative path looks like an entrypoint, a test
//! or core source, and whether a line of code looks like a definition.
//! Patterns are regular expressions matched against `/` followed by the
//! path relative to the project root, with `/` separators on every
//! platform.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_ENTRYPOINT_PATTERNS: &[&str] =
    &[r"/src/.*(main|cli|server|app|index)\.", r"package\.json$"];
pub const DEFAULT_TEST_PATTERNS: &[&str] = &[r"(^|/)tests?/", r"\.(spec|test)\."];
pub const DEFAULT_CORE_SOURCE_PATTERNS: &[&str] = &[r"/src/"];
pub const DEFAULT_DEFINITION_PATTERN: &str =
    r"(class |def |export |function |type |interface |route|router|schema)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathCategory {
    Entrypoint,
    Test,
    CoreSource,
}

#[derive(Debug, Clone)]
pub struct PathClassifier {
    entrypoint: Vec<Regex>,
    test: Vec<Regex>,
    core_source: Vec<Regex>,
    definition: Regex,
}

fn compile_all(kind: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid {} pattern '{}'", kind, p)))
        .collect()
}

impl PathClassifier {
    /// Build from pattern strings. The definition pattern is case-insensitive.
    pub fn new(
        entrypoint: &[String],
        test: &[String],
        core_source: &[String],
        definition: &str,
    ) -> Result<Self> {
        Ok(Self {
            entrypoint: compile_all("entrypoint", entrypoint)?,
            test: compile_all("test", test)?,
            core_source: compile_all("core_source", core_source)?,
            definition: RegexBuilder::new(definition)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid definition pattern '{}'", definition))?,
        })
    }

    /// All categories `rel` belongs to. A path may match several.
    pub fn categories(&self, rel: &Path) -> Vec<PathCategory> {
        let key = match_key(rel);
        let mut out = Vec::new();
        if self.entrypoint.iter().any(|r| r.is_match(&key)) {
            out.push(PathCategory::Entrypoint);
        }
        if self.test.iter().any(|r| r.is_match(&key)) {
            out.push(PathCategory::Test);
        }
        if self.core_source.iter().any(|r| r.is_match(&key)) {
            out.push(PathCategory::CoreSource);
        }
        out
    }

    pub fn is(&self, rel: &Path, category: PathCategory) -> bool {
        let key = match_key(rel);
        let set = match category {
            PathCategory::Entrypoint => &self.entrypoint,
            PathCategory::Test => &self.test,
            PathCategory::CoreSource => &self.core_source,
        };
        set.iter().any(|r| r.is_match(&key))
    }

    pub fn is_definition(&self, line: &str) -> bool {
        self.definition.is_match(line)
    }

    /// The classifier built from the `DEFAULT_*` patterns.
    pub fn builtin() -> Result<Self> {
        let own = |ps: &[&str]| ps.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self::new(
            &own(DEFAULT_ENTRYPOINT_PATTERNS),
            &own(DEFAULT_TEST_PATTERNS),
            &own(DEFAULT_CORE_SOURCE_PATTERNS),
            DEFAULT_DEFINITION_PATTERN,
        )
    }
}

fn match_key(rel: &Path) -> String {
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_categories() {
        let c = PathClassifier::builtin().unwrap();
        assert_eq!(
            c.categories(Path::new("src/main.rs")),
            vec![PathCategory::Entrypoint, PathCategory::CoreSource]
        );
        assert_eq!(c.categories(Path::new("package.json")), vec![PathCategory::Entrypoint]);
        assert_eq!(c.categories(Path::new("tests/api.rs")), vec![PathCategory::Test]);
        assert_eq!(
            c.categories(Path::new("src/billing.test.ts")),
            vec![PathCategory::Test, PathCategory::CoreSource]
        );
        assert_eq!(c.categories(Path::new("src/lib/util.ts")), vec![PathCategory::CoreSource]);
        assert!(c.categories(Path::new("README.md")).is_empty());
    }

    #[test]
    fn test_nested_test_dir() {
        let c = PathClassifier::builtin().unwrap();
        assert!(c.is(Path::new("pkg/test/fixtures.py"), PathCategory::Test));
        assert!(!c.is(Path::new("pkg/contest/x.py"), PathCategory::Test));
    }

    #[test]
    fn test_definition_is_case_insensitive() {
        let c = PathClassifier::builtin().unwrap();
        assert!(c.is_definition("export function handler() {"));
        assert!(c.is_definition("CLASS Foo:"));
        assert!(c.is_definition("def main():"));
        assert!(!c.is_definition("let x = 1;"));
    }

    #[test]
    fn test_custom_patterns() {
        let c = PathClassifier::new(
            &[r"bin/".to_string()],
            &[r"_spec\.rb$".to_string()],
            &[r"^/lib/".to_string()],
            r"^fn ",
        )
        .unwrap();
        assert!(c.is(Path::new("bin/run"), PathCategory::Entrypoint));
        assert!(c.is(Path::new("user_spec.rb"), PathCategory::Test));
        assert!(c.is(Path::new("lib/user.rb"), PathCategory::CoreSource));
        assert!(c.is_definition("fn main()"));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let err = PathClassifier::new(&["(".to_string()], &[], &[], "x").unwrap_err();
        assert!(err.to_string().contains("entrypoint"));
    }
}
