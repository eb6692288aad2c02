//! # Annotations
//!
//! Pod annotation handling shared by the creator and the init resolver.
//!
//! Control annotations for a domain `D`:
//!
//! - `init.D/storage-prefix` - root path for every stored value of the pod
//! - `init.D/local-mode` - `"false"` means remote, `"true"` local,
//!   `"remote-then-local"` falls back to local values

use crate::model::{normalize_prefix, strip_quotes, Parameter, ParameterError};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// How the init resolver sources values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    Local,
    RemoteThenLocal,
    Remote,
}

impl InitMode {
    /// Whether the shared backing store is needed.
    #[must_use]
    pub fn needs_remote(self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl fmt::Display for InitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::RemoteThenLocal => "remote-then-local",
            Self::Remote => "remote",
        })
    }
}

/// The annotation map of one pod, bound to an annotation domain.
#[derive(Debug, Clone)]
pub struct AnnotationSet {
    domain: String,
    annotations: BTreeMap<String, String>,
}

impl AnnotationSet {
    #[must_use]
    pub fn new(domain: impl Into<String>, annotations: BTreeMap<String, String>) -> Self {
        Self {
            domain: domain.into(),
            annotations,
        }
    }

    /// Parse the flat `key="value"` format written by the downward API.
    #[must_use]
    pub fn from_flat(domain: impl Into<String>, contents: &str) -> Self {
        Self::new(domain, parse_flat(contents))
    }

    /// Read a downward API annotations file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the file cannot be read.
    pub fn read_flat_file(domain: impl Into<String>, path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_flat(domain, &contents))
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    fn local_mode_value(&self) -> Option<&str> {
        self.get(&format!("init.{}/local-mode", self.domain))
    }

    /// Local mode is on when the annotation is present and does not say `false`.
    #[must_use]
    pub fn is_local_mode(&self) -> bool {
        self.local_mode_value()
            .is_some_and(|value| !value.contains("false"))
    }

    #[must_use]
    pub fn init_mode(&self) -> InitMode {
        match self.local_mode_value() {
            Some("true") => InitMode::Local,
            Some("remote-then-local") => InitMode::RemoteThenLocal,
            _ => InitMode::Remote,
        }
    }

    /// Declared storage prefix, trailing slash removed.
    #[must_use]
    pub fn storage_prefix(&self) -> Option<&str> {
        self.get(&format!("init.{}/storage-prefix", self.domain))
            .map(normalize_prefix)
    }

    /// Parse every recognized annotation, keeping failures per annotation.
    #[must_use]
    pub fn parameters(&self) -> Vec<Result<Parameter, ParameterError>> {
        self.annotations
            .iter()
            .filter_map(|(key, value)| Parameter::construct(&self.domain, key, value).transpose())
            .collect()
    }
}

/// Parse `key="value"` lines. Blank lines and `#` comments are skipped.
#[must_use]
pub fn parse_flat(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unescape(value)))
        .collect()
}

fn unescape(value: &str) -> String {
    let value = value.trim();
    let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
    if !quoted {
        return strip_quotes(value).to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value[1..value.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> AnnotationSet {
        AnnotationSet::new(
            "bsycorp.com",
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_local_mode_detection() {
        assert!(!set(&[]).is_local_mode(), "absent annotation means remote");
        assert!(!set(&[("init.bsycorp.com/local-mode", "false")]).is_local_mode());
        assert!(set(&[("init.bsycorp.com/local-mode", "true")]).is_local_mode());
        assert!(set(&[("init.bsycorp.com/local-mode", "remote-then-local")]).is_local_mode());
    }

    #[test]
    fn test_init_mode() {
        assert_eq!(set(&[]).init_mode(), InitMode::Remote);
        assert_eq!(set(&[("init.bsycorp.com/local-mode", "true")]).init_mode(), InitMode::Local);
        assert_eq!(
            set(&[("init.bsycorp.com/local-mode", "remote-then-local")]).init_mode(),
            InitMode::RemoteThenLocal
        );
        assert_eq!(set(&[("init.bsycorp.com/local-mode", "yes")]).init_mode(), InitMode::Remote);
    }

    #[test]
    fn test_storage_prefix_is_normalized() {
        let annotations = set(&[("init.bsycorp.com/storage-prefix", "/bsycorp/testbed/")]);
        assert_eq!(annotations.storage_prefix(), Some("/bsycorp/testbed"));
    }

    #[test]
    fn test_parameters_keep_failures_separate() {
        let annotations = set(&[
            ("kubernetes.io/created-by", "someone"),
            ("secret.bsycorp.com/good", "kind=DYNAMIC,type=RANDOM,size=128"),
            ("secret.bsycorp.com/bad", "kind=DYNAMIC,type=RANDOM"),
        ]);
        let parsed = annotations.parameters();
        assert_eq!(parsed.len(), 2, "unrelated annotation must be skipped");
        assert_eq!(parsed.iter().filter(|p| p.is_ok()).count(), 1);
        let failure = parsed.iter().find_map(|p| p.as_ref().err()).unwrap();
        assert_eq!(failure.annotation(), "secret.bsycorp.com/bad");
    }

    #[test]
    fn test_parse_flat_downward_api_format() {
        let contents = "init.bsycorp.com/storage-prefix=\"local\"\n\
                        secret.bsycorp.com/app.key=\"kind=DYNAMIC,type=RANDOM,size=128\"\n\
                        \n\
                        kubernetes.io/config.seen=\"2024-01-01T00:00:00Z\"\n\
                        escaped=\"say \\\"hi\\\"\"\n";
        let map = parse_flat(contents);
        assert_eq!(map.get("init.bsycorp.com/storage-prefix").map(String::as_str), Some("local"));
        assert_eq!(
            map.get("secret.bsycorp.com/app.key").map(String::as_str),
            Some("kind=DYNAMIC,type=RANDOM,size=128")
        );
        assert_eq!(map.get("escaped").map(String::as_str), Some("say \"hi\""));
        assert_eq!(map.len(), 4);
    }
}
