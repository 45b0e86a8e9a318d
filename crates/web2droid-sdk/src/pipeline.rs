//! Build orchestration.
//!
//! [`AppBuilder`] sequences one build through its states:
//!
//! ```text
//! Staging -> Generating -> IdentityReady -> Compiling
//!         -> [Packaging] -> [Bundling] -> Cleanup -> Done
//! ```
//!
//! A failure in any state moves straight to `Cleanup`, skips every remaining
//! branch, and reports the failing state together with any artifacts that
//! were already written.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::builders::{Workspace, assemble_bundle, assemble_package, compile_common};
use crate::codegen::generate_inputs;
use crate::identity::ensure_signing_identity;
use crate::toolchain::Toolchain;
use crate::types::{AppIdentity, Artifact, ArtifactKind, BuildOptions, BuildRequest, PackError};

/// State of a running build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Staging,
    Generating,
    IdentityReady,
    Compiling,
    Packaging,
    Bundling,
    Cleanup,
    Done,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Staging => "staging",
            BuildState::Generating => "generating",
            BuildState::IdentityReady => "identity",
            BuildState::Compiling => "compiling",
            BuildState::Packaging => "packaging",
            BuildState::Bundling => "bundling",
            BuildState::Cleanup => "cleanup",
            BuildState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub package_name: String,
    /// Artifacts in production order: package first, then bundle.
    pub artifacts: Vec<Artifact>,
}

impl BuildOutput {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

/// A build that stopped early.
#[derive(Debug)]
pub struct BuildFailure {
    /// State in which the build failed.
    pub state: BuildState,
    pub error: PackError,
    /// Artifacts completed before the failure; they stay on disk.
    pub artifacts: Vec<Artifact>,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "build failed while {}: {}", self.state, self.error)
    }
}

impl std::error::Error for BuildFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Runs builds against one toolchain.
///
/// # Example
///
/// ```ignore
/// use web2droid_sdk::{AppBuilder, BuildOptions, BuildRequest};
///
/// let builder = AppBuilder::new(&toolchain, toolchain.sdk_root())
///     .options(BuildOptions::in_dir("out"));
/// let request = BuildRequest::new("index.html", "Demo App", "2.3").bundle(true);
///
/// match builder.build(&request) {
///     Ok(output) => println!("built {}", output.package_name),
///     Err(failure) => eprintln!("{}", failure),
/// }
/// ```
pub struct AppBuilder<'a> {
    toolchain: &'a dyn Toolchain,
    identity_dir: PathBuf,
    options: BuildOptions,
}

impl<'a> AppBuilder<'a> {
    /// Creates a builder that keeps the signing identity in `identity_dir` and
    /// works in the current directory.
    pub fn new(toolchain: &'a dyn Toolchain, identity_dir: impl AsRef<Path>) -> Self {
        Self {
            toolchain,
            identity_dir: identity_dir.as_ref().to_path_buf(),
            options: BuildOptions::in_dir("."),
        }
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Final path of an artifact, e.g. `<output_dir>/Demo_App.apk`.
    pub fn artifact_path(&self, request: &BuildRequest, kind: ArtifactKind) -> PathBuf {
        self.options
            .output_dir
            .join(format!("{}.{}", request.artifact_stem(), kind.extension()))
    }

    /// Runs one build to completion.
    ///
    /// The workspace is removed whether the build succeeds or fails.
    pub fn build(&self, request: &BuildRequest) -> Result<BuildOutput, BuildFailure> {
        println!("Starting build: {} v{}", request.app_name, request.version);

        let identity =
            AppIdentity::with_prefix(&self.options.package_prefix, &request.app_name);
        let mut state = BuildState::Staging;
        let mut artifacts = Vec::new();

        let workspace = match Workspace::create(&self.options.work_root) {
            Ok(workspace) => workspace,
            Err(error) => {
                return Err(BuildFailure {
                    state,
                    error,
                    artifacts,
                });
            }
        };

        let result = self.run_stages(&workspace, request, &identity, &mut state, &mut artifacts);

        let failed_in = state;
        advance(&mut state, BuildState::Cleanup);
        workspace.destroy();

        match result {
            Ok(()) => {
                advance(&mut state, BuildState::Done);
                info!(package = %identity.package_name, count = artifacts.len(), "build finished");
                Ok(BuildOutput {
                    package_name: identity.package_name,
                    artifacts,
                })
            }
            Err(error) => {
                warn!(state = %failed_in, error = %error, "build failed");
                Err(BuildFailure {
                    state: failed_in,
                    error,
                    artifacts,
                })
            }
        }
    }

    fn run_stages(
        &self,
        workspace: &Workspace,
        request: &BuildRequest,
        identity: &AppIdentity,
        state: &mut BuildState,
        artifacts: &mut Vec<Artifact>,
    ) -> Result<(), PackError> {
        advance(state, BuildState::Generating);
        let generated =
            generate_inputs(workspace, request, identity, self.toolchain.sdk_versions())?;

        advance(state, BuildState::IdentityReady);
        let signing = ensure_signing_identity(self.toolchain, &self.identity_dir)?;

        advance(state, BuildState::Compiling);
        let compiled = compile_common(self.toolchain, workspace, &generated)?;

        if request.produce_package || request.produce_bundle {
            fs::create_dir_all(&self.options.output_dir)?;
        }

        if request.produce_package {
            advance(state, BuildState::Packaging);
            let output = self.artifact_path(request, ArtifactKind::Package);
            let artifact =
                assemble_package(self.toolchain, workspace, &compiled, &signing, &output)?;
            println!("APK created: {}", artifact.path.display());
            artifacts.push(artifact);
        }

        if request.produce_bundle {
            advance(state, BuildState::Bundling);
            let output = self.artifact_path(request, ArtifactKind::Bundle);
            let artifact =
                assemble_bundle(self.toolchain, workspace, &compiled, &signing, &output)?;
            println!("AAB created: {}", artifact.path.display());
            artifacts.push(artifact);
        }

        Ok(())
    }
}

fn advance(state: &mut BuildState, next: BuildState) {
    debug!(from = %state, to = %next, "build state");
    *state = next;
}
