//! Path pattern sets for exclusion and passthrough rules.
//!
//! A rule is either a glob (`*.png`, `public/**`, `_*`) or a plain path.
//! A plain path matches the entry itself and everything below it, so
//! `public` covers `public/logo.png` the same way copying a directory does.

use glob::{MatchOptions, Pattern, PatternError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Rule {
    Glob(Pattern),
    Prefix(String),
}

impl Rule {
    fn parse(raw: &str) -> Result<Self, PatternError> {
        let trimmed = raw.trim_start_matches("./").trim_matches('/');
        if trimmed.contains(['*', '?', '[']) {
            Ok(Rule::Glob(Pattern::new(trimmed)?))
        } else {
            Ok(Rule::Prefix(trimmed.to_string()))
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Rule::Glob(pattern) => pattern.matches_with(path, MATCH_OPTIONS),
            Rule::Prefix(prefix) => {
                path == prefix
                    || (path.starts_with(prefix.as_str())
                        && path.as_bytes().get(prefix.len()) == Some(&b'/'))
            }
        }
    }
}

/// An ordered set of path rules. Matching is "any rule matches".
#[derive(Debug, Clone, Default)]
pub struct PathRules {
    raw: Vec<String>,
    rules: Vec<Rule>,
}

impl PathRules {
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = Vec::new();
        let mut rules = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            rules.push(Rule::parse(pattern)?);
            raw.push(pattern.to_string());
        }
        Ok(Self { raw, rules })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.rules.iter().any(|r| r.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The patterns as written in the configuration.
    pub fn patterns(&self) -> &[String] {
        &self.raw
    }
}
