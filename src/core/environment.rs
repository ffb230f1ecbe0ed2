//! Shared environment - read-only configuration visible to every step

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Process-wide key/value configuration for a job
///
/// Built once before a job starts and never mutated afterwards; jobs hold it
/// behind an `Arc` so concurrent jobs read the same values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedEnvironment {
    vars: BTreeMap<String, String>,
}

impl SharedEnvironment {
    /// Create an environment from key/value pairs
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Return a copy with the given overrides applied
    ///
    /// Used before a run starts (e.g. CLI `--env KEY=VALUE`); the result is
    /// still immutable once handed to a job.
    pub fn with_overrides<'a, I>(&self, overrides: I) -> Self
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        let mut vars = self.vars.clone();
        for (key, value) in overrides {
            vars.insert(key.clone(), value.clone());
        }
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Render `{{ NAME }}` placeholders with environment values
    ///
    /// Unknown names are left untouched so the failure surfaces in the
    /// command itself.
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for (key, value) in &self.vars {
            let placeholder = format!("{{{{ {} }}}}", key);
            rendered = rendered.replace(&placeholder, value);
        }
        rendered
    }
}
