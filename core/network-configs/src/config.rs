use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Seconds between blocks proposed by the validators.
pub const ISTANBUL_BLOCK_PERIOD: u64 = 5;

/// Locations of the external tools and the timeouts applied when driving them.
#[derive(Serialize, Deserialize, SmartDefault, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Node binary.
    #[default(PathBuf::from("quorum/build/bin/geth"))]
    pub geth: PathBuf,
    /// Node key utility.
    #[default(PathBuf::from("quorum/build/bin/bootnode"))]
    pub bootnode: PathBuf,
    /// BFT setup utility.
    #[default(PathBuf::from("istanbul-tools/build/bin/istanbul"))]
    pub istanbul: PathBuf,
    #[default(PathBuf::from("solc"))]
    pub solc: PathBuf,
    #[default(PathBuf::from("docker"))]
    pub docker: PathBuf,
    /// One container image is built per subdirectory.
    #[default(PathBuf::from("docker"))]
    pub images_dir: PathBuf,
    #[default(ISTANBUL_BLOCK_PERIOD)]
    pub block_period: u64,
    #[default(120)]
    pub delegate_timeout_secs: u64,
    #[default(300)]
    pub confirmation_timeout_secs: u64,
    #[default(500)]
    pub poll_interval_ms: u64,
    #[default(30)]
    pub shutdown_timeout_secs: u64,
}

impl ToolchainConfig {
    /// Makes relative tool paths absolute with respect to `workdir`.
    ///
    /// Bare program names such as `solc` are left alone and looked up in `PATH`.
    pub fn resolve(&mut self, workdir: &Path) {
        for path in [
            &mut self.geth,
            &mut self.bootnode,
            &mut self.istanbul,
            &mut self.solc,
            &mut self.docker,
            &mut self.images_dir,
        ] {
            if path.is_relative() && path.components().count() > 1 {
                *path = workdir.join(&*path);
            }
        }
        if self.images_dir.is_relative() {
            self.images_dir = workdir.join(&self.images_dir);
        }
    }

    pub fn delegate_timeout(&self) -> Duration {
        Duration::from_secs(self.delegate_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: ToolchainConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, ToolchainConfig::default());
        assert_eq!(config.block_period, 5);
        assert_eq!(config.delegate_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn partial_override() {
        let config: ToolchainConfig =
            serde_yaml::from_str("solc: /opt/solc\npoll-interval-ms: 10").unwrap();
        assert_eq!(config.solc, PathBuf::from("/opt/solc"));
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.geth, PathBuf::from("quorum/build/bin/geth"));
        assert!(serde_yaml::from_str::<ToolchainConfig>("gethh: x").is_err());
    }

    #[test]
    fn resolve_relative_paths() {
        let mut config = ToolchainConfig::default();
        config.resolve(Path::new("/work"));
        assert_eq!(config.geth, PathBuf::from("/work/quorum/build/bin/geth"));
        assert_eq!(config.bootnode, PathBuf::from("/work/quorum/build/bin/bootnode"));
        assert_eq!(config.images_dir, PathBuf::from("/work/docker"));
        assert_eq!(config.solc, PathBuf::from("solc"));
        assert_eq!(config.docker, PathBuf::from("docker"));
    }
}
