//! Modular bundle (AAB) assembly
//!
//! The bundle builder expects each module as a zip laid out as:
//!
//! ```text
//! base.zip
//! ├── manifest/AndroidManifest.xml
//! ├── dex/classes.dex
//! ├── assets/...
//! ├── res/...
//! └── resources.pb
//! ```
//!
//! The proto-format link produces everything except the `manifest/` and
//! `dex/` placement, which this module rearranges before zipping.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use super::common::{Workspace, extract_container, zip_dir};
use super::compile::{BYTECODE_FILE, CompiledResources};
use crate::identity::SigningIdentity;
use crate::toolchain::{LinkFormat, LinkRequest, Toolchain};
use crate::types::{Artifact, ArtifactKind, PackError};

pub const PROTO_CONTAINER: &str = "proto.apk";
pub const MODULE_DIR: &str = "base_module";
pub const MODULE_ARCHIVE: &str = "base.zip";
pub const UNSIGNED_BUNDLE: &str = "unsigned.aab";

const DESCRIPTOR_ENTRY: &str = "AndroidManifest.xml";

/// Links, lays out, builds and signs the distribution bundle.
///
/// Stale module archives, unsigned bundles and a previous `output` are removed
/// first, since the bundle builder refuses to overwrite existing files.
pub fn assemble_bundle(
    toolchain: &dyn Toolchain,
    workspace: &Workspace,
    compiled: &CompiledResources,
    signing: &SigningIdentity,
    output: &Path,
) -> Result<Artifact, PackError> {
    println!("Linking proto resources...");
    let proto = workspace.path(PROTO_CONTAINER);
    let assets = workspace.assets_dir();
    toolchain.link_resources(&LinkRequest {
        archive: &compiled.archive,
        manifest: &workspace.manifest_path(),
        assets: Some(&assets),
        format: LinkFormat::Proto,
        output: &proto,
        java_out: None,
    })?;

    println!("Preparing base module...");
    let module_dir = workspace.path(MODULE_DIR);
    lay_out_module(&proto, &module_dir, &compiled.bytecode)?;

    let module_archive = workspace.path(MODULE_ARCHIVE);
    let unsigned = workspace.path(UNSIGNED_BUNDLE);
    for stale in [module_archive.as_path(), unsigned.as_path(), output] {
        remove_if_exists(stale)?;
    }
    zip_dir(&module_dir, &module_archive)?;

    println!("Building AAB...");
    toolchain.build_bundle(std::slice::from_ref(&module_archive), &unsigned)?;

    println!("Signing AAB...");
    toolchain.sign_bundle(&unsigned, signing, output)?;
    info!(path = %output.display(), "bundle signed");

    Ok(Artifact {
        kind: ArtifactKind::Bundle,
        path: output.to_path_buf(),
    })
}

/// Explodes the proto container into `module_dir` and moves the descriptor
/// and bytecode into their bundle locations.
fn lay_out_module(proto: &Path, module_dir: &Path, bytecode: &Path) -> Result<(), PackError> {
    let manifest_dir = module_dir.join("manifest");
    let dex_dir = module_dir.join("dex");
    fs::create_dir_all(&manifest_dir)?;
    fs::create_dir_all(&dex_dir)?;

    extract_container(proto, module_dir)?;

    let descriptor = module_dir.join(DESCRIPTOR_ENTRY);
    if !descriptor.is_file() {
        return Err(PackError::invocation(
            "aapt2 link (proto)",
            format!("{} has no root {}", proto.display(), DESCRIPTOR_ENTRY),
        ));
    }
    fs::rename(&descriptor, manifest_dir.join(DESCRIPTOR_ENTRY))?;
    fs::copy(bytecode, dex_dir.join(BYTECODE_FILE))?;

    debug!(path = %module_dir.display(), "base module laid out");
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), PackError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PackError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::common::container_entries;
    use crate::builders::compile::compile_common;
    use crate::codegen::generate_inputs;
    use crate::testing::FakeToolchain;
    use crate::types::{AppIdentity, BuildRequest};
    use tempfile::TempDir;

    struct Staged {
        workspace: Workspace,
        compiled: CompiledResources,
        signing: SigningIdentity,
    }

    fn stage(temp: &TempDir, toolchain: &FakeToolchain) -> Staged {
        let html = temp.path().join("index.html");
        fs::write(&html, "<p>page</p>").unwrap();
        let workspace = Workspace::create(&temp.path().join("work")).unwrap();
        let request = BuildRequest::new(&html, "Demo App", "2.3").bundle(true);
        let identity = AppIdentity::from_app_name(&request.app_name);
        let generated =
            generate_inputs(&workspace, &request, &identity, toolchain.sdk_versions()).unwrap();
        let compiled = compile_common(toolchain, &workspace, &generated).unwrap();
        Staged {
            workspace,
            compiled,
            signing: SigningIdentity::debug_in(temp.path()),
        }
    }

    #[test]
    fn test_module_layout() {
        let temp = TempDir::new().unwrap();
        let toolchain = FakeToolchain::new();
        let staged = stage(&temp, &toolchain);
        let output = temp.path().join("Demo_App.aab");

        let artifact = assemble_bundle(
            &toolchain,
            &staged.workspace,
            &staged.compiled,
            &staged.signing,
            &output,
        )
        .unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Bundle);
        assert!(output.is_file());

        let module = staged.workspace.path(MODULE_ARCHIVE);
        let entries = container_entries(&module).unwrap();
        assert!(entries.contains(&"manifest/AndroidManifest.xml".to_string()));
        assert!(entries.contains(&"dex/classes.dex".to_string()));
        assert!(entries.contains(&"assets/index.html".to_string()));
        assert!(!entries.contains(&"AndroidManifest.xml".to_string()));

        assert_eq!(
            toolchain.bundle_modules(),
            vec![staged.workspace.path(MODULE_ARCHIVE)]
        );
    }

    #[test]
    fn test_stale_outputs_are_replaced() {
        let temp = TempDir::new().unwrap();
        let toolchain = FakeToolchain::new();
        let staged = stage(&temp, &toolchain);
        let output = temp.path().join("Demo_App.aab");
        fs::write(&output, "stale").unwrap();
        fs::write(staged.workspace.path(UNSIGNED_BUNDLE), "stale").unwrap();

        assemble_bundle(
            &toolchain,
            &staged.workspace,
            &staged.compiled,
            &staged.signing,
            &output,
        )
        .unwrap();

        assert_ne!(fs::read(&output).unwrap(), b"stale");
    }

    #[test]
    fn test_bundle_build_failure() {
        let temp = TempDir::new().unwrap();
        let toolchain = FakeToolchain::new().failing("build_bundle");
        let staged = stage(&temp, &toolchain);
        let output = temp.path().join("Demo_App.aab");

        let err = assemble_bundle(
            &toolchain,
            &staged.workspace,
            &staged.compiled,
            &staged.signing,
            &output,
        )
        .unwrap_err();

        assert!(matches!(err, PackError::Invocation { .. }));
        assert_eq!(toolchain.count("sign_bundle"), 0);
        assert!(!output.exists());
    }
}
