//! Core types for web2droid-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`PackError`] - Error types for every pipeline stage
//! - [`BuildRequest`] - What to build (HTML entry, name, version, icon, outputs)
//! - [`AppIdentity`] - The Android package name derived from the app name
//! - [`BuildOptions`] - Where to stage, where to write, how long to wait
//! - [`Artifact`] / [`ArtifactKind`] - Final outputs of a build

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Package prefix used when no other prefix is configured.
pub const DEFAULT_PACKAGE_PREFIX: &str = "com.example";

/// Default deadline applied to every external tool invocation.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Error types for web2droid-sdk operations.
///
/// Only [`PackError::Environment`] is meant to terminate the process. All other
/// variants end the current build and are reported by the caller.
///
/// # Example
///
/// ```ignore
/// use web2droid_sdk::PackError;
///
/// match builder.build(&request) {
///     Ok(output) => println!("built {}", output.package_name),
///     Err(failure) => match failure.error {
///         PackError::Invocation { operation, .. } => eprintln!("{} failed", operation),
///         other => eprintln!("{}", other),
///     },
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// A required external capability is entirely unavailable.
    ///
    /// Raised while resolving the toolchain, before any build is attempted.
    #[error("environment error: {0}")]
    Environment(String),

    /// A required input asset is invalid, e.g. the HTML entry file is missing.
    #[error("input error: {0}")]
    Input(String),

    /// An external tool reported failure, could not be started, or exceeded
    /// its deadline.
    ///
    /// `detail` carries the captured diagnostic output of the tool.
    #[error("{operation} failed: {detail}")]
    Invocation { operation: String, detail: String },

    /// An I/O error occurred while staging files.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// Reading or writing a zip container failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A source template could not be rendered.
    #[error("template error: {0}")]
    Template(String),

    /// Anything else that does not fit the categories above.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl PackError {
    pub(crate) fn invocation(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        PackError::Invocation {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

/// A single build request.
///
/// Collected once by the caller and only borrowed by the pipeline.
///
/// # Example
///
/// ```
/// use web2droid_sdk::BuildRequest;
///
/// let request = BuildRequest::new("index.html", "Demo App", "2.3");
/// assert!(request.produce_package);
/// assert!(!request.produce_bundle);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Path to the HTML entry file that becomes `assets/index.html`.
    pub html_path: PathBuf,
    /// Human readable application name, also the launcher label.
    pub app_name: String,
    /// Version name written to the descriptor.
    pub version: String,
    /// Optional launcher icon.
    pub icon_path: Option<PathBuf>,
    /// Whether to produce the single-file package (APK).
    pub produce_package: bool,
    /// Whether to produce the modular bundle (AAB).
    pub produce_bundle: bool,
}

impl BuildRequest {
    /// Creates a request for the single-file package only.
    pub fn new(
        html_path: impl Into<PathBuf>,
        app_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            html_path: html_path.into(),
            app_name: app_name.into(),
            version: version.into(),
            icon_path: None,
            produce_package: true,
            produce_bundle: false,
        }
    }

    /// Sets the launcher icon.
    pub fn icon(mut self, icon_path: Option<PathBuf>) -> Self {
        self.icon_path = icon_path;
        self
    }

    /// Enables or disables the bundle output.
    pub fn bundle(mut self, produce_bundle: bool) -> Self {
        self.produce_bundle = produce_bundle;
        self
    }

    /// File stem shared by both final artifacts: spaces become underscores.
    pub fn artifact_stem(&self) -> String {
        self.app_name.replace(' ', "_")
    }
}

/// Android identity of the generated application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    /// Fully qualified package name, e.g. `com.example.demoapp`.
    pub package_name: String,
}

impl AppIdentity {
    /// Derives the identity from the app name using [`DEFAULT_PACKAGE_PREFIX`].
    pub fn from_app_name(app_name: &str) -> Self {
        Self::with_prefix(DEFAULT_PACKAGE_PREFIX, app_name)
    }

    /// Derives the identity from the app name using a custom prefix.
    ///
    /// Names that differ only by case or spaces map to the same package.
    pub fn with_prefix(prefix: &str, app_name: &str) -> Self {
        Self {
            package_name: format!("{}.{}", prefix, package_segment(app_name)),
        }
    }

    /// The last package segment, e.g. `demoapp`.
    pub fn segment(&self) -> &str {
        self.package_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.package_name)
    }

    /// Relative directory of the package, e.g. `com/example/demoapp`.
    pub fn package_path(&self) -> PathBuf {
        self.package_name.split('.').collect()
    }
}

/// Lowercases the app name and strips every space.
pub fn package_segment(app_name: &str) -> String {
    app_name.to_lowercase().replace(' ', "")
}

/// Where a build stages its workspace and writes its artifacts.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory that receives the final artifacts.
    pub output_dir: PathBuf,
    /// Directory under which the ephemeral workspace is created.
    pub work_root: PathBuf,
    /// Prefix of the derived package name.
    pub package_prefix: String,
}

impl BuildOptions {
    /// Uses `dir` for both the workspace and the artifacts.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: dir.as_ref().to_path_buf(),
            work_root: dir.as_ref().to_path_buf(),
            package_prefix: DEFAULT_PACKAGE_PREFIX.to_string(),
        }
    }
}

/// Kind of final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Single-file installable package.
    Package,
    /// Modular distribution bundle.
    Bundle,
}

impl ArtifactKind {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Package => "apk",
            ArtifactKind::Bundle => "aab",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Package => "APK",
            ArtifactKind::Bundle => "AAB",
        }
    }
}

/// A final artifact written outside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}
