//! Branch and path patterns used by trigger rules

use regex::Regex;

/// A branch name or path pattern (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Literal text: exact match for names, prefix match for paths
    Literal(String),
    /// Glob compiled to an anchored regular expression
    Glob { source: String, regex: Regex },
}

impl Pattern {
    /// Parse a pattern; anything containing `*` or `?` is treated as a glob
    pub fn parse(source: &str) -> Result<Self, regex::Error> {
        if !source.contains(['*', '?']) {
            return Ok(Pattern::Literal(source.to_string()));
        }

        let regex = Regex::new(&glob_to_regex(source))?;
        Ok(Pattern::Glob {
            source: source.to_string(),
            regex,
        })
    }

    /// Match a name such as a branch (literal patterns must be equal)
    pub fn matches_name(&self, name: &str) -> bool {
        match self {
            Pattern::Literal(literal) => literal == name,
            Pattern::Glob { regex, .. } => regex.is_match(name),
        }
    }

    /// Match a changed file path (literal patterns are prefixes)
    pub fn matches_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches("./");
        match self {
            Pattern::Literal(prefix) => path.starts_with(prefix.as_str()),
            Pattern::Glob { regex, .. } => regex.is_match(path),
        }
    }

    /// The pattern as written in the workflow file
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Literal(s) => s,
            Pattern::Glob { source, .. } => source,
        }
    }
}

/// Translate a glob into an anchored regex.
///
/// `**` crosses directory separators, `*` and `?` do not.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                // `**/` also matches zero directories
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}
