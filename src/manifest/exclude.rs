//! Gitignore-style exclude patterns
//!
//! Supported syntax: `#` comments, `!` re-includes (last matching rule wins),
//! a trailing `/` for directory-only rules, and a leading or inner `/` to
//! anchor a rule at the source root. Unanchored rules match at any depth.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{BackupError, BackupResult};

/// Always excluded, in addition to profile patterns
pub const BUILTIN_EXCLUDES: &[&str] = &[".git/", ".idea/", "__pycache__/", ".DS_Store"];

#[derive(Debug, Clone)]
struct Rule {
    negated: bool,
}

/// Compiled exclude rules
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    rules: Vec<Rule>,
    /// Globs matching files covered by each rule
    files: GlobSet,
    file_owner: Vec<usize>,
    /// Globs matching directory paths that can be pruned outright
    dirs: GlobSet,
    has_negations: bool,
}

impl ExcludeMatcher {
    /// Compile user patterns plus the built-in set
    pub fn new(patterns: &[String]) -> BackupResult<Self> {
        let all = patterns
            .iter()
            .map(String::as_str)
            .chain(BUILTIN_EXCLUDES.iter().copied());

        let mut rules = Vec::new();
        let mut file_owner = Vec::new();
        let mut files = GlobSetBuilder::new();
        let mut dirs = GlobSetBuilder::new();

        for raw in all {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negated, body) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let dir_only = body.ends_with('/');
            let body = body.trim_end_matches('/');
            let anchored = body.contains('/');
            let body = body.trim_start_matches('/');
            if body.is_empty() {
                continue;
            }

            let base = if anchored {
                body.to_string()
            } else {
                format!("**/{}", body)
            };

            let rule_index = rules.len();
            rules.push(Rule { negated });

            if !dir_only {
                files.add(compile(&base)?);
                file_owner.push(rule_index);
            }
            files.add(compile(&format!("{}/**", base))?);
            file_owner.push(rule_index);

            if !negated {
                dirs.add(compile(&base)?);
            }
        }

        let has_negations = rules.iter().any(|r| r.negated);
        Ok(Self {
            rules,
            files: files
                .build()
                .map_err(|e| BackupError::Validation(format!("Invalid exclude patterns: {}", e)))?,
            file_owner,
            dirs: dirs
                .build()
                .map_err(|e| BackupError::Validation(format!("Invalid exclude patterns: {}", e)))?,
            has_negations,
        })
    }

    /// Whether a `/`-separated relative file path is excluded
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.files
            .matches(relative_path)
            .into_iter()
            .map(|glob| self.file_owner[glob])
            .max()
            .map_or(false, |rule| !self.rules[rule].negated)
    }

    /// Whether a whole directory can be skipped without descending
    ///
    /// Never prunes when re-include rules exist, since one of them might
    /// bring back a file below the directory.
    pub fn prunes_dir(&self, relative_dir: &str) -> bool {
        !self.has_negations && self.dirs.is_match(relative_dir)
    }
}

fn compile(pattern: &str) -> BackupResult<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| BackupError::Validation(format!("Invalid exclude pattern '{}': {}", pattern, e)))
}
