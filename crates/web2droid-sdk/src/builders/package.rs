//! Single-file package (APK) assembly

use std::path::Path;

use tracing::info;

use super::common::{Workspace, append_to_container};
use super::compile::{BYTECODE_FILE, CompiledResources};
use crate::identity::SigningIdentity;
use crate::toolchain::{LinkFormat, LinkRequest, Toolchain};
use crate::types::{Artifact, ArtifactKind, PackError};

/// Container produced by the final binary link, before signing.
pub const UNSIGNED_PACKAGE: &str = "unaligned.apk";

/// Links, completes and signs the installable package.
///
/// The unsigned container is linked with the asset tree embedded, then the
/// bytecode blob is appended as a root-level `classes.dex` entry without
/// touching the existing entries. The signed result is written to `output`.
pub fn assemble_package(
    toolchain: &dyn Toolchain,
    workspace: &Workspace,
    compiled: &CompiledResources,
    signing: &SigningIdentity,
    output: &Path,
) -> Result<Artifact, PackError> {
    println!("Linking APK...");
    let unsigned = workspace.path(UNSIGNED_PACKAGE);
    let assets = workspace.assets_dir();
    toolchain.link_resources(&LinkRequest {
        archive: &compiled.archive,
        manifest: &workspace.manifest_path(),
        assets: Some(&assets),
        format: LinkFormat::Binary,
        output: &unsigned,
        java_out: None,
    })?;

    append_to_container(&unsigned, &compiled.bytecode, BYTECODE_FILE)?;

    println!("Signing APK...");
    toolchain.sign_package(&unsigned, signing, output)?;
    info!(path = %output.display(), "package signed");

    Ok(Artifact {
        kind: ArtifactKind::Package,
        path: output.to_path_buf(),
    })
}
