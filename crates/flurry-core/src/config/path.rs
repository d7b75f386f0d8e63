//! Configuration sources and the CLI flags that name them.

use std::path::{Path, PathBuf};

use clap::Args;

/// A configuration source - either a single file or a directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigPath {
    /// A single configuration file.
    File(PathBuf),
    /// A directory whose `.yaml`/`.yml` files are loaded in name order.
    Dir(PathBuf),
}

impl ConfigPath {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::Dir(path.into())
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Dir(path) => path,
        }
    }
}

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Flags selecting configuration sources.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to configuration file (can be specified multiple times)
    #[arg(short, long, global = true)]
    pub config: Vec<PathBuf>,

    /// Path to configuration directory (can be specified multiple times)
    #[arg(short = 'C', long = "config-dir", global = true)]
    pub config_dirs: Vec<PathBuf>,
}

impl ConfigArgs {
    /// Files first, then directories, preserving order within each group.
    pub fn config_paths(&self) -> Vec<ConfigPath> {
        self.config
            .iter()
            .map(ConfigPath::file)
            .chain(self.config_dirs.iter().map(ConfigPath::dir))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yaml_file() {
        assert!(is_yaml_file(Path::new("pipeline.yaml")));
        assert!(is_yaml_file(Path::new("pipeline.yml")));
        assert!(!is_yaml_file(Path::new("pipeline.toml")));
        assert!(!is_yaml_file(Path::new("README")));
    }

    #[test]
    fn test_files_before_dirs() {
        let args = ConfigArgs {
            config: vec![PathBuf::from("b.yaml"), PathBuf::from("a.yaml")],
            config_dirs: vec![PathBuf::from("conf.d")],
        };
        assert_eq!(
            args.config_paths(),
            vec![
                ConfigPath::file("b.yaml"),
                ConfigPath::file("a.yaml"),
                ConfigPath::dir("conf.d"),
            ]
        );
    }
}
