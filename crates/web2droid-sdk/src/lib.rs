//! Web-to-Android packaging SDK for Rust
//!
//! `web2droid-sdk` turns a single static HTML page into a signed Android
//! application. The page is bundled as an asset and displayed full-screen by a
//! generated `WebView` shell. Each build can produce a single-file package
//! (APK), a modular distribution bundle (AAB), or both.
//!
//! # Quick Start
//!
//! ```ignore
//! use web2droid_sdk::{
//!     AndroidSdkToolchain, AppBuilder, BuildRequest, PlatformProfile, ToolchainSettings,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let toolchain = AndroidSdkToolchain::resolve(
//!         "/home/me/.android_web_builder_sdk",
//!         PlatformProfile::current(),
//!         ToolchainSettings::default(),
//!     );
//!     toolchain.verify(true)?;
//!
//!     let request = BuildRequest::new("index.html", "Demo App", "2.3").bundle(true);
//!     let output = AppBuilder::new(&toolchain, toolchain.sdk_root()).build(&request)?;
//!
//!     for artifact in &output.artifacts {
//!         println!("{}: {}", artifact.kind.as_str(), artifact.path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The SDK consists of several components:
//!
//! - **Toolchain**: The [`Toolchain`] trait and its Android SDK implementation
//! - **Identity**: The persistent debug signing keystore
//! - **Codegen**: The app descriptor and the native shell source
//! - **Builders**: Shared compile stage, package and bundle assembly
//! - **Pipeline**: The [`AppBuilder`] state machine tying it all together

// Public modules
pub mod builders;
pub mod codegen;
pub mod identity;
pub mod pipeline;
pub mod toolchain;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience
pub use codegen::{AppDescriptor, render_manifest, render_shell_source};
pub use identity::{SigningIdentity, ensure_signing_identity};
pub use pipeline::{AppBuilder, BuildFailure, BuildOutput, BuildState};
pub use toolchain::{
    AndroidSdkToolchain, HostPlatform, InvocationStyle, PlatformProfile, SdkVersions, Toolchain,
    ToolchainSettings,
};
pub use types::{
    AppIdentity, Artifact, ArtifactKind, BuildOptions, BuildRequest, DEFAULT_PACKAGE_PREFIX,
    DEFAULT_STAGE_TIMEOUT, PackError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
