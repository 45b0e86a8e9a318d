//! In-memory stand-in for the native toolchain, used by unit tests.
//!
//! [`FakeToolchain`] records every call and writes small but structurally
//! valid outputs: real zip containers, accessor sources, object files and a
//! bytecode blob, so every stage after it runs unmodified.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::identity::SigningIdentity;
use crate::toolchain::{LinkFormat, LinkRequest, SdkVersions, ToolOutput, Toolchain};
use crate::types::PackError;

/// What one resource link was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCall {
    pub format: LinkFormat,
    pub assets: bool,
    pub java_out: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<String>,
    link_archives: Vec<Vec<u8>>,
    links: Vec<LinkCall>,
    identity_paths: Vec<PathBuf>,
    compiled_sources: Vec<PathBuf>,
    converted_classes: Vec<PathBuf>,
    bundle_modules: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct FakeToolchain {
    failing: HashSet<String>,
    skip_bytecode: bool,
    partial_identity: bool,
    recorded: Mutex<Recorded>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `operation` fail.
    pub fn failing(mut self, operation: &str) -> Self {
        self.failing.insert(operation.to_string());
        self
    }

    /// Makes the converter succeed without writing `classes.dex`.
    pub fn without_bytecode(mut self) -> Self {
        self.skip_bytecode = true;
        self
    }

    /// Makes keystore generation write a truncated file and then time out.
    pub fn partial_identity(mut self) -> Self {
        self.partial_identity = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorded().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.recorded()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Bytes of the resource archive as seen by each link, in call order.
    pub fn link_archives(&self) -> Vec<Vec<u8>> {
        self.recorded().link_archives.clone()
    }

    pub fn links(&self) -> Vec<LinkCall> {
        self.recorded().links.clone()
    }

    /// Keystore paths handed to `create_identity`, in call order.
    pub fn identity_paths(&self) -> Vec<PathBuf> {
        self.recorded().identity_paths.clone()
    }

    pub fn compiled_sources(&self) -> Vec<PathBuf> {
        self.recorded().compiled_sources.clone()
    }

    pub fn converted_classes(&self) -> Vec<PathBuf> {
        self.recorded().converted_classes.clone()
    }

    pub fn bundle_modules(&self) -> Vec<PathBuf> {
        self.recorded().bundle_modules.clone()
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }

    fn enter(&self, operation: &str) -> Result<(), PackError> {
        self.recorded().calls.push(operation.to_string());
        if self.failing.contains(operation) {
            return Err(PackError::invocation(operation, "simulated failure"));
        }
        Ok(())
    }
}

fn ok() -> Result<ToolOutput, PackError> {
    Ok(ToolOutput::default())
}

/// Reads the `package="..."` attribute of a descriptor.
fn manifest_package(manifest: &Path) -> String {
    let text = fs::read_to_string(manifest).unwrap();
    let start = text.find("package=\"").unwrap() + "package=\"".len();
    let end = start + text[start..].find('"').unwrap();
    text[start..end].to_string()
}

/// Reads the `package x.y;` line of a Java source.
fn source_package(source: &Path) -> String {
    let text = fs::read_to_string(source).unwrap();
    let line = text
        .lines()
        .find(|l| l.trim_start().starts_with("package "))
        .unwrap();
    line.trim()
        .trim_start_matches("package ")
        .trim_end_matches(';')
        .to_string()
}

fn package_dir(root: &Path, package: &str) -> PathBuf {
    package.split('.').fold(root.to_path_buf(), |p, s| p.join(s))
}

fn write_container(output: &Path, manifest: &Path, assets: Option<&Path>, format: LinkFormat) {
    let mut zip = ZipWriter::new(File::create(output).unwrap());
    zip.start_file("AndroidManifest.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(&fs::read(manifest).unwrap()).unwrap();

    let table = match format {
        LinkFormat::Binary => "resources.arsc",
        LinkFormat::Proto => "resources.pb",
    };
    zip.start_file(table, SimpleFileOptions::default()).unwrap();
    zip.write_all(b"table").unwrap();

    if let Some(assets) = assets {
        for entry in WalkDir::new(assets).sort_by_file_name() {
            let entry = entry.unwrap();
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(assets).unwrap();
            let name = format!("assets/{}", relative.to_string_lossy().replace('\\', "/"));
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(&fs::read(entry.path()).unwrap()).unwrap();
        }
    }
    zip.finish().unwrap();
}

impl Toolchain for FakeToolchain {
    fn sdk_versions(&self) -> SdkVersions {
        SdkVersions {
            min_sdk: 21,
            target_sdk: 33,
        }
    }

    fn compile_resources(&self, res_dir: &Path, archive: &Path) -> Result<ToolOutput, PackError> {
        self.enter("compile_resources")?;
        let mut content = b"flat:".to_vec();
        for entry in WalkDir::new(res_dir).sort_by_file_name() {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                content.extend(entry.file_name().to_string_lossy().as_bytes());
                content.push(b'\n');
            }
        }
        fs::write(archive, content).unwrap();
        ok()
    }

    fn link_resources(&self, request: &LinkRequest<'_>) -> Result<ToolOutput, PackError> {
        self.enter("link_resources")?;
        {
            let mut recorded = self.recorded();
            recorded
                .link_archives
                .push(fs::read(request.archive).unwrap());
            recorded.links.push(LinkCall {
                format: request.format,
                assets: request.assets.is_some(),
                java_out: request.java_out.is_some(),
            });
        }

        write_container(request.output, request.manifest, request.assets, request.format);

        if let Some(java_out) = request.java_out {
            let package = manifest_package(request.manifest);
            let dir = package_dir(java_out, &package);
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("R.java"),
                format!("package {};\n\npublic final class R {{}}\n", package),
            )
            .unwrap();
        }
        ok()
    }

    fn compile_code(&self, sources: &[PathBuf], out_dir: &Path) -> Result<ToolOutput, PackError> {
        self.enter("compile_code")?;
        self.recorded().compiled_sources = sources.to_vec();
        for source in sources {
            let dir = package_dir(out_dir, &source_package(source));
            fs::create_dir_all(&dir).unwrap();
            let stem = source.file_stem().unwrap().to_string_lossy().into_owned();
            fs::write(dir.join(format!("{}.class", stem)), b"\xca\xfe\xba\xbe").unwrap();
            if stem == "R" {
                fs::write(dir.join("R$layout.class"), b"\xca\xfe\xba\xbe").unwrap();
            }
        }
        ok()
    }

    fn convert_bytecode(
        &self,
        classes: &[PathBuf],
        out_dir: &Path,
    ) -> Result<ToolOutput, PackError> {
        self.enter("convert_bytecode")?;
        self.recorded().converted_classes = classes.to_vec();
        if !self.skip_bytecode {
            fs::write(out_dir.join("classes.dex"), b"dex\n035\0").unwrap();
        }
        ok()
    }

    fn sign_package(
        &self,
        unsigned: &Path,
        _identity: &SigningIdentity,
        output: &Path,
    ) -> Result<ToolOutput, PackError> {
        self.enter("sign_package")?;
        fs::copy(unsigned, output).unwrap();
        ok()
    }

    fn build_bundle(&self, modules: &[PathBuf], output: &Path) -> Result<ToolOutput, PackError> {
        self.enter("build_bundle")?;
        self.recorded().bundle_modules = modules.to_vec();
        fs::copy(&modules[0], output).unwrap();
        ok()
    }

    fn sign_bundle(
        &self,
        unsigned: &Path,
        _identity: &SigningIdentity,
        output: &Path,
    ) -> Result<ToolOutput, PackError> {
        self.enter("sign_bundle")?;
        fs::copy(unsigned, output).unwrap();
        ok()
    }

    fn create_identity(&self, identity: &SigningIdentity) -> Result<ToolOutput, PackError> {
        self.recorded()
            .identity_paths
            .push(identity.keystore_path.clone());
        self.enter("create_identity")?;
        if self.partial_identity {
            fs::write(&identity.keystore_path, b"trunc").unwrap();
            return Err(PackError::invocation(
                "create_identity",
                "timed out after 600s",
            ));
        }
        fs::write(&identity.keystore_path, b"keystore").unwrap();
        ok()
    }
}
