//! Output planning for the init resolver.
//!
//! The whole set of files is rendered in memory first; [`OutputPlan::write`]
//! only runs after every value has resolved and decoded.

use super::{InitError, ResolvedValues};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Where the resolver writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub secrets_file: PathBuf,
    pub resources_file: PathBuf,
    pub resources_dir: PathBuf,
    pub leases_file: PathBuf,
    pub leases_dir: PathBuf,
}

impl OutputPaths {
    /// Everything under one directory, with the default file names.
    #[must_use]
    pub fn under(dir: &Path) -> Self {
        Self {
            secrets_file: dir.join("secrets.properties"),
            resources_file: dir.join("resources.properties"),
            resources_dir: dir.to_path_buf(),
            leases_file: dir.join("leases.properties"),
            leases_dir: dir.to_path_buf(),
        }
    }
}

/// Fully rendered file contents, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputPlan {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl OutputPlan {
    /// Render the properties files and the per-key files.
    ///
    /// # Errors
    ///
    /// Fails when a resource or lease value is not valid base64, or when a key
    /// would place its file outside the output directory.
    pub fn build(values: &ResolvedValues, paths: &OutputPaths) -> Result<Self, InitError> {
        let mut files = BTreeMap::new();
        files.insert(paths.secrets_file.clone(), properties(&values.secrets));
        files.insert(paths.resources_file.clone(), properties(&values.resources));
        files.insert(paths.leases_file.clone(), properties(&values.leases));

        for (dir, entries) in [
            (&paths.resources_dir, &values.resources),
            (&paths.leases_dir, &values.leases),
        ] {
            for (key, encoded) in entries {
                let decoded = STANDARD.decode(encoded).map_err(|source| InitError::Decode {
                    key: key.clone(),
                    source,
                })?;
                files.insert(per_key_path(dir, key)?, decoded);
            }
        }
        Ok(Self { files })
    }

    #[must_use]
    pub fn files(&self) -> &BTreeMap<PathBuf, Vec<u8>> {
        &self.files
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Write every planned file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns the first I/O failure, naming the path.
    pub fn write(&self) -> Result<(), InitError> {
        for (path, contents) in &self.files {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| InitError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(path, contents).map_err(|source| InitError::Write {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), bytes = contents.len(), "wrote init output");
        }
        info!(files = self.files.len(), "Init output written");
        Ok(())
    }
}

/// Path of a per-key file; absolute keys and `..` components are rejected.
fn per_key_path(dir: &Path, key: &str) -> Result<PathBuf, InitError> {
    let relative = Path::new(key);
    let contained = !key.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(InitError::UnsafeKey {
            key: key.to_string(),
        });
    }
    Ok(dir.join(relative))
}

/// `key=value` lines in key order.
fn properties(entries: &BTreeMap<String, String>) -> Vec<u8> {
    entries
        .iter()
        .map(|(key, value)| format!("{key}={value}\n"))
        .collect::<String>()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> ResolvedValues {
        ResolvedValues {
            secrets: BTreeMap::from([
                ("common.key".to_string(), "c2VjcmV0".to_string()),
                ("api-key.service-c.v1_consumer".to_string(), "YWJj".to_string()),
            ]),
            resources: BTreeMap::from([("app.db.main.url".to_string(), "dmFsdWU=".to_string())]),
            leases: BTreeMap::from([("snowflake".to_string(), STANDARD.encode("42"))]),
        }
    }

    #[test]
    fn test_properties_are_sorted_lines() {
        let paths = OutputPaths::under(Path::new("/out"));
        let plan = OutputPlan::build(&values(), &paths).unwrap();
        assert_eq!(
            plan.get(&paths.secrets_file).unwrap(),
            b"api-key.service-c.v1_consumer=YWJj\ncommon.key=c2VjcmV0\n"
        );
    }

    #[test]
    fn test_per_key_files_hold_decoded_values() {
        let paths = OutputPaths::under(Path::new("/out"));
        let plan = OutputPlan::build(&values(), &paths).unwrap();
        assert_eq!(plan.get(Path::new("/out/app.db.main.url")).unwrap(), b"value");
        assert_eq!(
            plan.get(Path::new("/out/snowflake")).unwrap(),
            b"42",
            "lease file holds the slot number"
        );
        assert_eq!(plan.files().len(), 5);
    }

    #[test]
    fn test_invalid_base64_fails_the_plan() {
        let mut values = values();
        values
            .resources
            .insert("broken".to_string(), "not base64!".to_string());
        let err = OutputPlan::build(&values, &OutputPaths::under(Path::new("/out"))).unwrap_err();
        assert!(matches!(err, InitError::Decode { ref key, .. } if key == "broken"), "got {err:?}");
    }

    #[test]
    fn test_keys_cannot_escape_the_output_directory() {
        let paths = OutputPaths::under(Path::new("/out"));
        for key in ["../etc/passwd", "/etc/passwd", "nested/../../up"] {
            let mut values = values();
            values.resources.insert(key.to_string(), "dmFsdWU=".to_string());
            let err = OutputPlan::build(&values, &paths).unwrap_err();
            assert!(
                matches!(err, InitError::UnsafeKey { key: ref rejected } if rejected == key),
                "{key} must be rejected, got {err:?}"
            );
        }

        let mut values = values();
        values.leases.insert("pool/worker".to_string(), STANDARD.encode("3"));
        let plan = OutputPlan::build(&values, &paths).unwrap();
        assert_eq!(plan.get(Path::new("/out/pool/worker")).unwrap(), b"3");
    }

    #[test]
    fn test_empty_values_still_write_properties_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::under(&dir.path().join("nested"));
        OutputPlan::build(&ResolvedValues::default(), &paths)
            .unwrap()
            .write()
            .unwrap();
        assert_eq!(std::fs::read(&paths.secrets_file).unwrap(), b"");
        assert!(paths.leases_file.exists());
    }
}
