//! Shared compile stage
//!
//! Produces the two inputs both assembly branches consume: the compiled
//! resource archive and the converted bytecode blob.

use std::path::PathBuf;

use tracing::debug;

use super::common::{Workspace, collect_files};
use crate::codegen::GeneratedInputs;
use crate::toolchain::{LinkFormat, LinkRequest, Toolchain};
use crate::types::PackError;

/// File name of the compiled resource archive inside the workspace.
pub const RESOURCE_ARCHIVE: &str = "resources.zip";
/// Throwaway container produced while generating accessor sources.
pub const ACCESSOR_LINK_OUTPUT: &str = "temp_link.apk";
/// Resource accessor source every link with `--java` must generate.
pub const ACCESSOR_SOURCE: &str = "R.java";
/// Bytecode blob produced by the converter.
pub const BYTECODE_FILE: &str = "classes.dex";

/// Outputs of [`compile_common`], shared read-only by both branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledResources {
    /// Compiled resource archive, passed unmodified to every later link.
    pub archive: PathBuf,
    /// Single converted bytecode blob.
    pub bytecode: PathBuf,
}

/// Runs the shared compile stage.
///
/// This performs the following steps:
/// 1. Compile the resource tree into a resource archive
/// 2. Link it once to generate the resource accessor sources
/// 3. Compile the shell and every generated source against the platform interface
/// 4. Convert all resulting object code, inner classes included, into one blob
///
/// # Returns
///
/// * `Ok(CompiledResources)` with the archive and bytecode paths
/// * `Err(PackError)` naming the first stage that failed
pub fn compile_common(
    toolchain: &dyn Toolchain,
    workspace: &Workspace,
    generated: &GeneratedInputs,
) -> Result<CompiledResources, PackError> {
    // Step 1: Compile resources
    println!("Compiling resources...");
    let archive = workspace.path(RESOURCE_ARCHIVE);
    toolchain.compile_resources(&workspace.res_dir(), &archive)?;

    // Step 2: Generate resource accessors
    println!("Generating resource accessors...");
    let gen_dir = workspace.gen_dir();
    let temp_link = workspace.path(ACCESSOR_LINK_OUTPUT);
    toolchain.link_resources(&LinkRequest {
        archive: &archive,
        manifest: &generated.manifest,
        assets: None,
        format: LinkFormat::Binary,
        output: &temp_link,
        java_out: Some(&gen_dir),
    })?;

    // Step 3: Compile sources
    println!("Compiling Java sources...");
    let accessors = collect_files(&gen_dir, "java")?;
    if !accessors
        .iter()
        .any(|p| p.file_name().is_some_and(|n| n == ACCESSOR_SOURCE))
    {
        return Err(PackError::invocation(
            "aapt2 link",
            format!("no {} was generated under {}", ACCESSOR_SOURCE, gen_dir.display()),
        ));
    }
    let mut sources = vec![generated.shell_source.clone()];
    sources.extend(accessors);
    debug!(count = sources.len(), "compiling sources");
    toolchain.compile_code(&sources, &workspace.obj_dir())?;

    // Step 4: Convert to bytecode
    println!("Converting to Dex...");
    let classes = collect_files(&workspace.obj_dir(), "class")?;
    if classes.is_empty() {
        return Err(PackError::invocation(
            "javac",
            format!(
                "no object code was produced in {}",
                workspace.obj_dir().display()
            ),
        ));
    }
    debug!(count = classes.len(), "converting object code");
    let dex_dir = workspace.dex_dir();
    toolchain.convert_bytecode(&classes, &dex_dir)?;

    let bytecode = dex_dir.join(BYTECODE_FILE);
    if !bytecode.is_file() {
        return Err(PackError::invocation(
            "d8",
            format!("expected {} was not produced", bytecode.display()),
        ));
    }

    Ok(CompiledResources { archive, bytecode })
}
