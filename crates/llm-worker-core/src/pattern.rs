//! File selectors and pattern groups
//!
//! A [`PatternGroup`] is the unit the downloader tries: it restricts a
//! snapshot fetch to the files its selectors allow, and then decides from the
//! local directory whether the fetch satisfied the request.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, WorkerError};

/// Selectors for tokenizer and config files
pub const TOKENIZER_PATTERNS: &[&str] = &["*.json", "tokenizer*"];

/// Weight-file selectors in preference order
pub const MODEL_WEIGHT_PATTERNS: &[&str] = &["*.safetensors", "*.bin", "*.pt"];

/// A glob-style file selector (`*`, `?`, `[...]`, `[!...]`)
///
/// `*` also matches `/`, so `*.json` selects JSON files in subfolders of
/// a repository as well.
#[derive(Clone)]
pub struct FilePattern {
    glob: String,
    regex: Regex,
}

impl FilePattern {
    /// Compile a glob selector
    pub fn new(glob: impl Into<String>) -> Result<Self> {
        let glob = glob.into();
        let regex = Regex::new(&glob_to_regex(&glob)).map_err(|e| {
            WorkerError::Configuration(format!("Invalid file pattern '{}': {}", glob, e))
        })?;
        Ok(Self { glob, regex })
    }

    fn builtin(glob: &str) -> Self {
        Self::new(glob).expect("built-in file pattern must compile")
    }

    /// Original glob text
    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Whether a repository-relative file name matches
    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}

impl PartialEq for FilePattern {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl Eq for FilePattern {}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePattern").field(&self.glob).finish()
    }
}

impl fmt::Display for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}

impl Serialize for FilePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.glob)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                Some(offset) if offset > 0 => {
                    let class: String = chars[i + 1..i + 1 + offset].iter().collect();
                    out.push('[');
                    match class.strip_prefix('!') {
                        Some(negated) => {
                            out.push('^');
                            out.push_str(&escape_class(negated));
                        }
                        None => out.push_str(&escape_class(&class)),
                    }
                    out.push(']');
                    i += offset + 1;
                }
                _ => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

fn escape_class(class: &str) -> String {
    class
        .chars()
        .map(|c| match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => format!("\\{}", c),
            c => c.to_string(),
        })
        .collect()
}

/// Result of evaluating one pattern group against a local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    /// The directory satisfies the group
    Matched(PathBuf),
    /// Nothing usable for this group; try the next one
    NoMatch,
}

/// An ordered set of selectors that jointly define a satisfactory download
///
/// `primary` selectors must match at least one file. When `companions` is
/// non-empty, at least one companion must match as well; model groups use
/// this to require tokenizer and config files next to the weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternGroup {
    primary: Vec<FilePattern>,
    companions: Vec<FilePattern>,
}

impl PatternGroup {
    /// Create a group from compiled selectors
    pub fn new(primary: Vec<FilePattern>, companions: Vec<FilePattern>) -> Self {
        Self {
            primary,
            companions,
        }
    }

    /// The tokenizer group
    pub fn tokenizer_group() -> Self {
        Self::new(
            TOKENIZER_PATTERNS.iter().map(|p| FilePattern::builtin(p)).collect(),
            Vec::new(),
        )
    }

    /// One group per weight format, each unioned with the tokenizer selectors
    pub fn model_groups() -> Vec<Self> {
        MODEL_WEIGHT_PATTERNS
            .iter()
            .map(|weights| {
                Self::new(
                    vec![FilePattern::builtin(weights)],
                    TOKENIZER_PATTERNS.iter().map(|p| FilePattern::builtin(p)).collect(),
                )
            })
            .collect()
    }

    /// All selectors, primary first; this is the fetch allow-list
    pub fn selectors(&self) -> impl Iterator<Item = &FilePattern> {
        self.primary.iter().chain(self.companions.iter())
    }

    /// Selector globs as plain strings
    pub fn globs(&self) -> Vec<String> {
        self.selectors().map(|p| p.as_str().to_string()).collect()
    }

    /// Whether a remote file should be fetched for this group
    pub fn allows(&self, file_name: &str) -> bool {
        self.selectors().any(|p| p.matches(file_name))
    }

    /// Whether a set of file names satisfies the group
    pub fn is_satisfied_by<'a>(&self, file_names: impl IntoIterator<Item = &'a str>) -> bool {
        let mut primary_hit = false;
        let mut companion_hit = self.companions.is_empty();
        for name in file_names {
            primary_hit |= self.primary.iter().any(|p| p.matches(name));
            companion_hit |= self.companions.iter().any(|p| p.matches(name));
            if primary_hit && companion_hit {
                return true;
            }
        }
        false
    }

    /// Inspect the top level of `dir` and decide the outcome
    pub fn evaluate(&self, dir: &Path) -> Result<GroupOutcome> {
        if !dir.is_dir() {
            return Ok(GroupOutcome::NoMatch);
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        if self.is_satisfied_by(names.iter().map(String::as_str)) {
            Ok(GroupOutcome::Matched(dir.to_path_buf()))
        } else {
            Ok(GroupOutcome::NoMatch)
        }
    }
}

impl fmt::Display for PatternGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.globs().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_glob_star_and_question() {
        let pattern = FilePattern::new("*.safetensors").unwrap();
        assert!(pattern.matches("model-00001-of-00002.safetensors"));
        assert!(pattern.matches("sub/dir/model.safetensors"));
        assert!(!pattern.matches("model.safetensors.index.json"));

        let pattern = FilePattern::new("tokenizer?json").unwrap();
        assert!(pattern.matches("tokenizer.json"));
        assert!(!pattern.matches("tokenizer_config.json"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let pattern = FilePattern::new("model+v1.(final).bin").unwrap();
        assert!(pattern.matches("model+v1.(final).bin"));
        assert!(!pattern.matches("modelv1xfinalxbin"));
    }

    #[test]
    fn test_glob_character_classes() {
        let pattern = FilePattern::new("shard-[0-9].bin").unwrap();
        assert!(pattern.matches("shard-3.bin"));
        assert!(!pattern.matches("shard-a.bin"));

        let negated = FilePattern::new("shard-[!0-9].bin").unwrap();
        assert!(negated.matches("shard-a.bin"));
        assert!(!negated.matches("shard-3.bin"));

        let unclosed = FilePattern::new("weird[name").unwrap();
        assert!(unclosed.matches("weird[name"));
    }

    #[test]
    fn test_model_groups_order() {
        let groups = PatternGroup::model_groups();
        let first: Vec<String> = groups.iter().map(|g| g.globs()[0].clone()).collect();
        assert_eq!(first, vec!["*.safetensors", "*.bin", "*.pt"]);
        for group in &groups {
            assert!(group.allows("tokenizer.json"));
            assert!(group.allows("config.json"));
            assert!(group.allows("tokenizer.model"));
        }
    }

    #[test]
    fn test_model_group_requires_weights_and_tokenizer() {
        let safetensors = &PatternGroup::model_groups()[0];
        assert!(!safetensors.is_satisfied_by(["config.json", "tokenizer.json"]));
        assert!(!safetensors.is_satisfied_by(["model.safetensors"]));
        assert!(safetensors.is_satisfied_by(["model.safetensors", "config.json"]));
    }

    #[test]
    fn test_tokenizer_group_any_selector() {
        let group = PatternGroup::tokenizer_group();
        assert!(group.is_satisfied_by(["tokenizer.model"]));
        assert!(group.is_satisfied_by(["special_tokens_map.json"]));
        assert!(!group.is_satisfied_by(["README.md"]));
        assert!(!group.allows("pytorch_model.bin"));
    }

    #[test]
    fn test_evaluate_directory() {
        let dir = tempfile::tempdir().unwrap();
        let group = &PatternGroup::model_groups()[1];

        assert_eq!(group.evaluate(&dir.path().join("missing")).unwrap(), GroupOutcome::NoMatch);

        fs::write(dir.path().join("config.json"), "{}").unwrap();
        assert_eq!(group.evaluate(dir.path()).unwrap(), GroupOutcome::NoMatch);

        fs::write(dir.path().join("pytorch_model.bin"), b"weights").unwrap();
        assert_eq!(
            group.evaluate(dir.path()).unwrap(),
            GroupOutcome::Matched(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_group_display() {
        let group = PatternGroup::tokenizer_group();
        assert_eq!(group.to_string(), "[*.json, tokenizer*]");
    }
}
