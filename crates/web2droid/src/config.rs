//! Configuration file support for web2droid.
//!
//! This module provides support for `web2droid.toml` configuration files that
//! let users point the tool at a particular SDK installation, change the
//! package prefix, or move the output and work directories.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./web2droid.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! ## Example Configuration
//!
//! ```toml
//! [toolchain]
//! sdk_root = "~/.android_web_builder_sdk"
//! build_tools_version = "33.0.0"
//! platform_version = "android-33"
//! java_home = "/usr/lib/jvm/default"
//!
//! [android]
//! package_prefix = "com.example"
//! min_sdk = 21
//! target_sdk = 33
//!
//! [build]
//! output_dir = "dist"
//! work_root = "."
//! stage_timeout_secs = 600
//! ```
//!
//! Relative `output_dir` and `work_root` values are taken relative to the
//! directory holding `web2droid.toml`, so the same file gives the same
//! locations wherever the command is run from below it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use web2droid_sdk::{
    BuildOptions, DEFAULT_PACKAGE_PREFIX, DEFAULT_STAGE_TIMEOUT, PlatformProfile, SdkVersions,
    ToolchainSettings,
};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "web2droid.toml";

/// Directory name of the default SDK root inside the home directory.
pub const DEFAULT_SDK_DIR_NAME: &str = ".android_web_builder_sdk";

/// Environment variable overriding `toolchain.sdk_root`.
pub const SDK_ROOT_ENV: &str = "WEB2DROID_SDK_ROOT";

/// Root configuration structure for `web2droid.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Web2DroidConfig {
    /// Where the Android SDK and JDK live.
    pub toolchain: ToolchainConfig,

    /// Android descriptor settings.
    pub android: AndroidConfig,

    /// Output locations and limits.
    pub build: BuildConfig,
}

/// Toolchain location overrides.
///
/// Unset versions fall back to the platform profile of the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// SDK root. A leading `~/` is expanded to the home directory.
    ///
    /// Defaults to `~/.android_web_builder_sdk`.
    pub sdk_root: Option<PathBuf>,

    /// Build-tools version directory, e.g. "33.0.0".
    pub build_tools_version: Option<String>,

    /// Platform directory, e.g. "android-33".
    pub platform_version: Option<String>,

    /// JDK home; its `bin/` provides javac, java, keytool and jarsigner.
    pub java_home: Option<PathBuf>,

    /// Path to `bundletool.jar`. Defaults to `<sdk_root>/bundletool.jar`.
    pub bundletool: Option<PathBuf>,
}

/// Android descriptor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    /// Prefix of the derived package name.
    ///
    /// Defaults to "com.example".
    pub package_prefix: String,

    /// Minimum SDK version. Defaults to the platform profile's value.
    pub min_sdk: Option<u32>,

    /// Target SDK version. Defaults to the platform profile's value.
    pub target_sdk: Option<u32>,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self {
            package_prefix: DEFAULT_PACKAGE_PREFIX.to_string(),
            min_sdk: None,
            target_sdk: None,
        }
    }
}

/// Output locations and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory receiving the final artifacts, relative to the config file.
    ///
    /// Defaults to the current directory.
    pub output_dir: Option<PathBuf>,

    /// Directory under which build workspaces are created, relative to the
    /// config file.
    ///
    /// Defaults to the current directory.
    pub work_root: Option<PathBuf>,

    /// Deadline for each external tool invocation, in seconds.
    ///
    /// Defaults to 600.
    pub stage_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            work_root: None,
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT.as_secs(),
        }
    }
}

impl Web2DroidConfig {
    /// Loads configuration from the specified file path.
    ///
    /// # Returns
    ///
    /// * `Ok(Web2DroidConfig)` - Successfully loaded configuration
    /// * `Err` - If the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Web2DroidConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration from the current directory
    /// or any parent directory.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }
}

/// Merges the config file, the environment and host defaults.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<Web2DroidConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a new resolver by discovering and loading configuration.
    pub fn new() -> Result<Self> {
        match Web2DroidConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    fn settings(&self) -> Web2DroidConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Resolves the SDK root.
    ///
    /// Precedence: `env_override` (from [`SDK_ROOT_ENV`]), then the config
    /// file, then `~/.android_web_builder_sdk`.
    pub fn sdk_root(&self, env_override: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(root) = env_override.filter(|p| !p.as_os_str().is_empty()) {
            return expand_home(&root);
        }
        if let Some(root) = self.config.as_ref().and_then(|c| c.toolchain.sdk_root.clone()) {
            return expand_home(&root);
        }
        let home = dirs::home_dir().context("Failed to determine the home directory")?;
        Ok(home.join(DEFAULT_SDK_DIR_NAME))
    }

    /// Applies version overrides to the host profile.
    pub fn profile(&self, mut profile: PlatformProfile) -> PlatformProfile {
        let config = self.settings();
        if let Some(version) = config.toolchain.build_tools_version {
            profile.build_tools_version = version;
        }
        if let Some(version) = config.toolchain.platform_version {
            profile.platform_version = version;
        }
        profile.sdk_versions = SdkVersions {
            min_sdk: config
                .android
                .min_sdk
                .unwrap_or(profile.sdk_versions.min_sdk),
            target_sdk: config
                .android
                .target_sdk
                .unwrap_or(profile.sdk_versions.target_sdk),
        };
        profile
    }

    /// Tool location overrides and the per-invocation deadline.
    pub fn toolchain_settings(&self) -> Result<ToolchainSettings> {
        let config = self.settings();
        Ok(ToolchainSettings {
            java_home: config
                .toolchain
                .java_home
                .as_deref()
                .map(expand_home)
                .transpose()?,
            bundletool: config
                .toolchain
                .bundletool
                .as_deref()
                .map(expand_home)
                .transpose()?,
            stage_timeout: Some(Duration::from_secs(config.build.stage_timeout_secs)),
        })
    }

    /// Build locations, made absolute.
    ///
    /// Unset locations are `cwd`. Relative configured locations are joined
    /// onto the directory of the loaded config file, or onto `cwd` when the
    /// configuration did not come from a file.
    pub fn build_options(&self, cwd: &Path) -> BuildOptions {
        let config = self.settings();
        let base = self
            .config_path
            .as_deref()
            .and_then(Path::parent)
            .map(|dir| absolute_in(cwd, dir))
            .unwrap_or_else(|| cwd.to_path_buf());
        let locate = |configured: Option<PathBuf>| match configured {
            Some(path) => absolute_in(&base, &path),
            None => absolute_in(cwd, Path::new(".")),
        };

        BuildOptions {
            output_dir: locate(config.build.output_dir),
            work_root: locate(config.build.work_root),
            package_prefix: config.android.package_prefix,
        }
    }
}

/// Joins `path` onto `cwd`, dropping `.` components.
fn absolute_in(cwd: &Path, path: &Path) -> PathBuf {
    cwd.join(path).components().collect()
}

/// Expands a leading `~` to the home directory.
fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().context("Failed to determine the home directory")?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use web2droid_sdk::HostPlatform;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Web2DroidConfig::default();
        assert_eq!(config.android.package_prefix, "com.example");
        assert_eq!(config.android.min_sdk, None);
        assert_eq!(config.build.output_dir, None);
        assert_eq!(config.build.work_root, None);
        assert_eq!(config.build.stage_timeout_secs, 600);
        assert!(config.toolchain.sdk_root.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);

        let toml_content = r#"
[toolchain]
sdk_root = "/opt/android"
build_tools_version = "34.0.0"
platform_version = "android-34"
java_home = "/usr/lib/jvm/17"

[android]
package_prefix = "org.acme"
min_sdk = 24

[build]
output_dir = "dist"
stage_timeout_secs = 120
"#;

        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = Web2DroidConfig::load_from_file(&config_path).unwrap();

        assert_eq!(config.toolchain.sdk_root, Some(PathBuf::from("/opt/android")));
        assert_eq!(config.toolchain.build_tools_version.as_deref(), Some("34.0.0"));
        assert_eq!(config.android.package_prefix, "org.acme");
        assert_eq!(config.android.min_sdk, Some(24));
        assert_eq!(config.android.target_sdk, None);
        assert_eq!(config.build.output_dir, Some(PathBuf::from("dist")));
        assert_eq!(config.build.work_root, None);
        assert_eq!(config.build.stage_timeout_secs, 120);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[build]\nstage_timeout_secs = \"soon\"\n").unwrap();

        let err = Web2DroidConfig::load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_discover_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[android]\npackage_prefix = \"io.found\"\n").unwrap();
        let nested = temp_dir.path().join("site").join("pages");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = Web2DroidConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(config.android.package_prefix, "io.found");
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_no_config() {
        let temp_dir = TempDir::new().unwrap();
        // Create a .git directory to stop the search
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let result = Web2DroidConfig::discover_from(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_sdk_root_precedence() {
        let resolver = ConfigResolver {
            config: Some(Web2DroidConfig {
                toolchain: ToolchainConfig {
                    sdk_root: Some(PathBuf::from("/from/config")),
                    ..Default::default()
                },
                ..Default::default()
            }),
            config_path: None,
        };

        assert_eq!(
            resolver.sdk_root(Some(PathBuf::from("/from/env"))).unwrap(),
            PathBuf::from("/from/env")
        );
        assert_eq!(resolver.sdk_root(None).unwrap(), PathBuf::from("/from/config"));
        assert_eq!(
            resolver.sdk_root(Some(PathBuf::new())).unwrap(),
            PathBuf::from("/from/config")
        );
    }

    #[test]
    fn test_default_sdk_root_is_in_home() {
        let resolver = ConfigResolver::default();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolver.sdk_root(None).unwrap(), home.join(DEFAULT_SDK_DIR_NAME));
        }
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(
            expand_home(Path::new("/abs/path")).unwrap(),
            PathBuf::from("/abs/path")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_home(Path::new("~/.sdk")).unwrap(),
                home.join(".sdk")
            );
        }
    }

    #[test]
    fn test_profile_overrides() {
        let resolver = ConfigResolver {
            config: Some(Web2DroidConfig {
                toolchain: ToolchainConfig {
                    build_tools_version: Some("35.0.0".to_string()),
                    ..Default::default()
                },
                android: AndroidConfig {
                    target_sdk: Some(35),
                    ..Default::default()
                },
                ..Default::default()
            }),
            config_path: None,
        };

        let profile = resolver.profile(PlatformProfile::for_host(HostPlatform::Linux));
        assert_eq!(profile.build_tools_version, "35.0.0");
        assert_eq!(profile.platform_version, "android-33");
        assert_eq!(profile.sdk_versions.min_sdk, 21);
        assert_eq!(profile.sdk_versions.target_sdk, 35);
    }

    #[test]
    fn test_build_options_relative_to_cwd() {
        let resolver = ConfigResolver::default();
        let options = resolver.build_options(Path::new("/work"));
        assert_eq!(options.output_dir, PathBuf::from("/work"));
        assert_eq!(options.work_root, PathBuf::from("/work"));
        assert_eq!(options.package_prefix, "com.example");

        let settings = resolver.toolchain_settings().unwrap();
        assert_eq!(settings.stage_timeout, Some(DEFAULT_STAGE_TIMEOUT));
        assert!(settings.java_home.is_none());
    }

    #[test]
    fn test_build_options_relative_to_config_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(
            root.join(CONFIG_FILE_NAME),
            "[build]\noutput_dir = \"dist\"\nwork_root = \"./tmp/../scratch\"\n",
        )
        .unwrap();
        let nested = root.join("site").join("pages");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = Web2DroidConfig::discover_from(&nested).unwrap().unwrap();
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: Some(path),
        };

        let from_nested = resolver.build_options(&nested);
        assert_eq!(from_nested.output_dir, root.join("dist"));
        assert_eq!(from_nested.work_root, root.join("tmp").join("..").join("scratch"));

        let from_root = resolver.build_options(root);
        assert_eq!(from_root.output_dir, from_nested.output_dir);
        assert_eq!(from_root.work_root, from_nested.work_root);
    }

    #[test]
    fn test_build_options_unset_and_absolute_locations() {
        let resolver = ConfigResolver {
            config: Some(Web2DroidConfig {
                build: BuildConfig {
                    output_dir: Some(PathBuf::from("/srv/apps")),
                    ..Default::default()
                },
                ..Default::default()
            }),
            config_path: Some(PathBuf::from("/project/web2droid.toml")),
        };

        let options = resolver.build_options(Path::new("/project/site"));
        assert_eq!(options.output_dir, PathBuf::from("/srv/apps"));
        assert_eq!(options.work_root, PathBuf::from("/project/site"));
    }

    #[test]
    fn test_build_options_without_config_file_use_cwd() {
        let resolver = ConfigResolver {
            config: Some(Web2DroidConfig {
                build: BuildConfig {
                    output_dir: Some(PathBuf::from("out")),
                    ..Default::default()
                },
                ..Default::default()
            }),
            config_path: None,
        };

        let options = resolver.build_options(Path::new("/work"));
        assert_eq!(options.output_dir, PathBuf::from("/work/out"));
        assert_eq!(options.work_root, PathBuf::from("/work"));
    }
}
