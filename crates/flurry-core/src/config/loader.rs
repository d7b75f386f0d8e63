//! Loading and merging configuration split across files and directories.

use std::fmt::Display;
use std::hash::Hash;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{ConfigPath, GlobalConfig, interpolate, is_yaml_file};
use crate::error::ConfigError;

/// A configuration whose named components can be merged from several files.
///
/// Component keys must be unique across every file; global settings are
/// merged last-write-wins.
pub trait Mergeable: Sized + Default {
    type Key: Eq + Hash + Clone + Display;
    type Component;

    fn components_mut(&mut self) -> &mut IndexMap<Self::Key, Self::Component>;
    fn global_mut(&mut self) -> &mut GlobalConfig;

    /// Parse one already-interpolated document.
    fn parse_yaml(contents: &str) -> Result<Self, ConfigError>;

    fn merge(&mut self, mut other: Self) -> Result<(), ConfigError> {
        let duplicates: Vec<String> = {
            let existing = self.components_mut();
            other
                .components_mut()
                .keys()
                .filter(|key| existing.contains_key(*key))
                .map(ToString::to_string)
                .collect()
        };

        if !duplicates.is_empty() {
            return Err(ConfigError::DuplicateComponents { keys: duplicates });
        }

        let incoming = std::mem::take(other.components_mut());
        self.components_mut().extend(incoming);
        self.global_mut()
            .merge_from(std::mem::take(other.global_mut()));
        Ok(())
    }
}

/// Load and merge every source in order, collecting all errors before failing.
pub fn load_from_paths<C: Mergeable>(paths: &[ConfigPath]) -> Result<C, ConfigError> {
    let mut config = C::default();
    let mut errors = Vec::new();

    for source in paths {
        let loaded = match source {
            ConfigPath::File(path) => load_file::<C>(path),
            ConfigPath::Dir(path) => load_dir::<C>(path),
        };
        merge_or_record(&mut config, loaded, source.path(), &mut errors);
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

fn merge_or_record<C: Mergeable>(
    config: &mut C,
    loaded: Result<C, ConfigError>,
    origin: &Path,
    errors: &mut Vec<String>,
) {
    if let Err(e) = loaded.and_then(|partial| config.merge(partial)) {
        errors.push(format!("{}: {}", origin.display(), e));
    }
}

fn load_file<C: Mergeable>(path: &Path) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    debug!(path = %path.display(), "Loading config file");
    let contents =
        std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile { source })?;

    let result = interpolate(&contents);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    C::parse_yaml(&result.text)
}

fn load_dir<C: Mergeable>(dir: &Path) -> Result<C, ConfigError> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| ConfigError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_yaml_file(path))
        .collect();
    files.sort();

    let mut config = C::default();
    let mut errors = Vec::new();
    for path in files {
        let loaded = load_file::<C>(&path);
        merge_or_record(&mut config, loaded, &path, &mut errors);
    }

    if !errors.is_empty() {
        return Err(ConfigError::MultipleErrors { errors });
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Debug, Default, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        items: IndexMap<String, u32>,
        #[serde(default)]
        global: GlobalConfig,
    }

    impl Mergeable for TestConfig {
        type Key = String;
        type Component = u32;

        fn components_mut(&mut self) -> &mut IndexMap<String, u32> {
            &mut self.items
        }

        fn global_mut(&mut self) -> &mut GlobalConfig {
            &mut self.global
        }

        fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
            serde_yaml::from_str(contents).map_err(|source| ConfigError::YamlParse { source })
        }
    }

    #[test]
    fn test_merge_files_and_directory_in_name_order() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("conf.d");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("b.yaml"), "items:\n  second: 2\n").unwrap();
        fs::write(dir.join("a.yml"), "items:\n  first: 1\n").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let root = temp.path().join("root.yaml");
        fs::write(&root, "items:\n  zero: 0\nglobal:\n  total_concurrency: 3\n").unwrap();

        let config: TestConfig =
            load_from_paths(&[ConfigPath::file(&root), ConfigPath::dir(&dir)]).unwrap();

        let keys: Vec<&str> = config.items.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zero", "first", "second"]);
        assert_eq!(config.global.total_concurrency, Some(3));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.yaml");
        let b = temp.path().join("b.yaml");
        fs::write(&a, "items:\n  clicks: 1\n").unwrap();
        fs::write(&b, "items:\n  clicks: 2\n").unwrap();

        let err = load_from_paths::<TestConfig>(&[ConfigPath::file(&a), ConfigPath::file(&b)])
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate pipeline keys: clicks"));
    }

    #[test]
    fn test_every_bad_source_reported() {
        let temp = TempDir::new().unwrap();
        let toml = temp.path().join("config.toml");
        fs::write(&toml, "").unwrap();
        let missing = temp.path().join("missing");

        let err = load_from_paths::<TestConfig>(&[
            ConfigPath::file(&toml),
            ConfigPath::dir(&missing),
        ])
        .unwrap_err();
        match err {
            ConfigError::MultipleErrors { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
