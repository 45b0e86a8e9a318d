//! Toolchain handle: the external capabilities the pipeline drives.
//!
//! The [`Toolchain`] trait is the only seam between the pipeline and the
//! Android SDK. [`AndroidSdkToolchain`] implements it by invoking `aapt2`,
//! `javac`, `d8`, `apksigner`, `bundletool`, `jarsigner` and `keytool`; tests
//! substitute a fake that writes canned artifacts.
//!
//! ## Platform profiles
//!
//! Hosts differ in executable naming, how wrapper scripts are invoked, which
//! SDK versions are targeted and where the JDK lives. [`PlatformProfile`]
//! captures those differences so a single pipeline serves every host:
//!
//! | Host | build-tools | platform | min/target | wrappers |
//! |------|-------------|----------|------------|----------|
//! | Linux | 33.0.0 | android-33 | 21/33 | direct |
//! | macOS | 34.0.0 | android-34 | 24/34 | direct |
//! | Windows | 34.0.0 | android-34 | 24/34 | `.bat` through `cmd /C` |

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::builders::common::run_command;
use crate::identity::SigningIdentity;
use crate::types::{DEFAULT_STAGE_TIMEOUT, PackError};

/// Captured diagnostic output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Container format produced by a resource link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFormat {
    /// Final binary format, installable once signed.
    Binary,
    /// Structurally editable format used for bundle modules.
    Proto,
}

/// Inputs of one resource link invocation.
#[derive(Debug, Clone, Copy)]
pub struct LinkRequest<'a> {
    /// Compiled resource archive, passed through unmodified.
    pub archive: &'a Path,
    pub manifest: &'a Path,
    /// Asset tree embedded into the container, if any.
    pub assets: Option<&'a Path>,
    pub format: LinkFormat,
    pub output: &'a Path,
    /// Directory receiving the generated accessor sources, if wanted.
    pub java_out: Option<&'a Path>,
}

/// Minimum and target platform API levels written into the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkVersions {
    pub min_sdk: u32,
    pub target_sdk: u32,
}

/// Capabilities of the native toolchain.
///
/// Every call blocks until the underlying tool finishes and returns either its
/// captured output or a [`PackError::Invocation`] naming the operation.
pub trait Toolchain {
    /// API levels targeted by this toolchain.
    fn sdk_versions(&self) -> SdkVersions;

    /// Flat-compiles the resource tree into `archive`.
    fn compile_resources(&self, res_dir: &Path, archive: &Path) -> Result<ToolOutput, PackError>;

    /// Links the compiled archive and descriptor into a container.
    fn link_resources(&self, request: &LinkRequest<'_>) -> Result<ToolOutput, PackError>;

    /// Compiles sources against the platform interface into `out_dir`.
    fn compile_code(&self, sources: &[PathBuf], out_dir: &Path) -> Result<ToolOutput, PackError>;

    /// Converts object code into a single bytecode blob inside `out_dir`.
    fn convert_bytecode(&self, classes: &[PathBuf], out_dir: &Path)
    -> Result<ToolOutput, PackError>;

    /// Signs a single-file package, writing the result to `output`.
    fn sign_package(
        &self,
        unsigned: &Path,
        identity: &SigningIdentity,
        output: &Path,
    ) -> Result<ToolOutput, PackError>;

    /// Combines module containers into one bundle container.
    fn build_bundle(&self, modules: &[PathBuf], output: &Path) -> Result<ToolOutput, PackError>;

    /// Signs a bundle container, writing the result to `output`.
    fn sign_bundle(
        &self,
        unsigned: &Path,
        identity: &SigningIdentity,
        output: &Path,
    ) -> Result<ToolOutput, PackError>;

    /// Creates the keystore described by `identity`.
    fn create_identity(&self, identity: &SigningIdentity) -> Result<ToolOutput, PackError>;
}

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Linux,
    MacOs,
    Windows,
}

impl HostPlatform {
    pub fn current() -> Self {
        match env::consts::OS {
            "windows" => HostPlatform::Windows,
            "macos" => HostPlatform::MacOs,
            _ => HostPlatform::Linux,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostPlatform::Linux => "linux",
            HostPlatform::MacOs => "macos",
            HostPlatform::Windows => "windows",
        }
    }
}

/// How wrapper scripts such as `d8` and `apksigner` are started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStyle {
    /// Executed directly.
    Direct,
    /// Batch files run through `cmd /C`.
    BatchShell,
}

/// Per-host parameters of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub host: HostPlatform,
    pub build_tools_version: String,
    pub platform_version: String,
    pub sdk_versions: SdkVersions,
    pub invocation: InvocationStyle,
    /// Whether the JDK is a portable copy inside the SDK root (`<sdk_root>/jdk`).
    pub bundled_jdk: bool,
}

impl PlatformProfile {
    pub fn current() -> Self {
        Self::for_host(HostPlatform::current())
    }

    pub fn for_host(host: HostPlatform) -> Self {
        match host {
            HostPlatform::Linux => Self {
                host,
                build_tools_version: "33.0.0".to_string(),
                platform_version: "android-33".to_string(),
                sdk_versions: SdkVersions {
                    min_sdk: 21,
                    target_sdk: 33,
                },
                invocation: InvocationStyle::Direct,
                bundled_jdk: false,
            },
            HostPlatform::MacOs => Self {
                host,
                build_tools_version: "34.0.0".to_string(),
                platform_version: "android-34".to_string(),
                sdk_versions: SdkVersions {
                    min_sdk: 24,
                    target_sdk: 34,
                },
                invocation: InvocationStyle::Direct,
                bundled_jdk: false,
            },
            HostPlatform::Windows => Self {
                host,
                build_tools_version: "34.0.0".to_string(),
                platform_version: "android-34".to_string(),
                sdk_versions: SdkVersions {
                    min_sdk: 24,
                    target_sdk: 34,
                },
                invocation: InvocationStyle::BatchShell,
                bundled_jdk: true,
            },
        }
    }

    /// File name of a native executable, e.g. `aapt2` or `aapt2.exe`.
    pub fn executable(&self, name: &str) -> String {
        match self.host {
            HostPlatform::Windows => format!("{}.exe", name),
            _ => name.to_string(),
        }
    }

    /// File name of a wrapper script, e.g. `d8` or `d8.bat`.
    pub fn wrapper(&self, name: &str) -> String {
        match self.host {
            HostPlatform::Windows => format!("{}.bat", name),
            _ => name.to_string(),
        }
    }
}

/// Optional overrides applied while resolving tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolchainSettings {
    pub java_home: Option<PathBuf>,
    pub bundletool: Option<PathBuf>,
    pub stage_timeout: Option<Duration>,
}

/// Resolved locations of every tool the pipeline invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub aapt2: PathBuf,
    pub d8: PathBuf,
    pub apksigner: PathBuf,
    pub android_jar: PathBuf,
    pub bundletool: PathBuf,
    pub javac: PathBuf,
    pub java: PathBuf,
    pub keytool: PathBuf,
    pub jarsigner: PathBuf,
}

/// [`Toolchain`] backed by an installed Android SDK and JDK.
///
/// Constructed once per process and passed by reference into the pipeline.
#[derive(Debug, Clone)]
pub struct AndroidSdkToolchain {
    sdk_root: PathBuf,
    profile: PlatformProfile,
    paths: ToolPaths,
    java_home: Option<PathBuf>,
    timeout: Duration,
}

impl AndroidSdkToolchain {
    /// Resolves tool locations inside `sdk_root` for the given profile.
    ///
    /// JDK tools come from `settings.java_home`, the portable JDK when the
    /// profile bundles one, or `PATH`. Nothing is checked here; call
    /// [`AndroidSdkToolchain::verify`] before building.
    pub fn resolve(
        sdk_root: impl Into<PathBuf>,
        profile: PlatformProfile,
        settings: ToolchainSettings,
    ) -> Self {
        let sdk_root = sdk_root.into();
        let build_tools = sdk_root
            .join("build-tools")
            .join(&profile.build_tools_version);

        let java_home = settings
            .java_home
            .or_else(|| profile.bundled_jdk.then(|| sdk_root.join("jdk")));
        let jdk_tool = |name: &str| -> PathBuf {
            let file = profile.executable(name);
            match &java_home {
                Some(home) => home.join("bin").join(file),
                None => which::which(&file).unwrap_or_else(|_| PathBuf::from(file)),
            }
        };

        let paths = ToolPaths {
            aapt2: build_tools.join(profile.executable("aapt2")),
            d8: build_tools.join(profile.wrapper("d8")),
            apksigner: build_tools.join(profile.wrapper("apksigner")),
            android_jar: sdk_root
                .join("platforms")
                .join(&profile.platform_version)
                .join("android.jar"),
            bundletool: settings
                .bundletool
                .unwrap_or_else(|| sdk_root.join("bundletool.jar")),
            javac: jdk_tool("javac"),
            java: jdk_tool("java"),
            keytool: jdk_tool("keytool"),
            jarsigner: jdk_tool("jarsigner"),
        };

        Self {
            sdk_root,
            profile,
            paths,
            java_home,
            timeout: settings.stage_timeout.unwrap_or(DEFAULT_STAGE_TIMEOUT),
        }
    }

    pub fn sdk_root(&self) -> &Path {
        &self.sdk_root
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    /// Checks that every capability needed for the requested outputs exists.
    ///
    /// Bundle tools (`java`, `bundletool.jar`, `jarsigner`) are only required
    /// when `with_bundle` is set.
    ///
    /// # Returns
    /// A [`PackError::Environment`] listing every missing tool.
    pub fn verify(&self, with_bundle: bool) -> Result<(), PackError> {
        let mut required = vec![
            ("aapt2", &self.paths.aapt2),
            ("d8", &self.paths.d8),
            ("apksigner", &self.paths.apksigner),
            ("android.jar", &self.paths.android_jar),
            ("javac", &self.paths.javac),
            ("keytool", &self.paths.keytool),
        ];
        if with_bundle {
            required.push(("java", &self.paths.java));
            required.push(("bundletool.jar", &self.paths.bundletool));
            required.push(("jarsigner", &self.paths.jarsigner));
        }

        let missing: Vec<String> = required
            .into_iter()
            .filter(|(_, path)| !path.is_file())
            .map(|(name, path)| format!("  - {} (expected at {})", name, path.display()))
            .collect();

        if missing.is_empty() {
            debug!(sdk_root = %self.sdk_root.display(), "toolchain verified");
            return Ok(());
        }

        Err(PackError::Environment(format!(
            "required tools are unavailable:\n{}\n\n\
             Install Android build-tools {} and platform {} into {}, \
             and make a JDK available (PATH or java_home).",
            missing.join("\n"),
            self.profile.build_tools_version,
            self.profile.platform_version,
            self.sdk_root.display()
        )))
    }

    fn command(&self, program: &Path) -> Command {
        let is_batch = program
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bat"));
        let mut cmd = if self.profile.invocation == InvocationStyle::BatchShell && is_batch {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(program);
            cmd
        } else {
            Command::new(program)
        };

        if let Some(home) = &self.java_home {
            cmd.env("JAVA_HOME", home);
            let mut entries = vec![home.join("bin")];
            if let Some(path) = env::var_os("PATH") {
                entries.extend(env::split_paths(&path));
            }
            if let Ok(joined) = env::join_paths(entries) {
                cmd.env("PATH", joined);
            }
        }
        cmd
    }

    fn run(&self, cmd: Command, description: &str) -> Result<ToolOutput, PackError> {
        run_command(cmd, description, self.timeout)
    }
}

fn password_arg(password: &str) -> OsString {
    OsString::from(format!("pass:{}", password))
}

impl Toolchain for AndroidSdkToolchain {
    fn sdk_versions(&self) -> SdkVersions {
        self.profile.sdk_versions
    }

    fn compile_resources(&self, res_dir: &Path, archive: &Path) -> Result<ToolOutput, PackError> {
        let mut cmd = self.command(&self.paths.aapt2);
        cmd.arg("compile")
            .arg("--dir")
            .arg(res_dir)
            .arg("-o")
            .arg(archive);
        self.run(cmd, "aapt2 compile")
    }

    fn link_resources(&self, request: &LinkRequest<'_>) -> Result<ToolOutput, PackError> {
        let mut cmd = self.command(&self.paths.aapt2);
        cmd.arg("link");
        if request.format == LinkFormat::Proto {
            cmd.arg("--proto-format");
        }
        cmd.arg("-I")
            .arg(&self.paths.android_jar)
            .arg("--manifest")
            .arg(request.manifest)
            .arg("-o")
            .arg(request.output);
        if let Some(assets) = request.assets {
            cmd.arg("-A").arg(assets);
        }
        if let Some(java_out) = request.java_out {
            cmd.arg("--java").arg(java_out);
        }
        cmd.arg(request.archive).arg("--auto-add-overlay");

        let description = match request.format {
            LinkFormat::Binary => "aapt2 link",
            LinkFormat::Proto => "aapt2 link (proto)",
        };
        self.run(cmd, description)
    }

    fn compile_code(&self, sources: &[PathBuf], out_dir: &Path) -> Result<ToolOutput, PackError> {
        let mut cmd = self.command(&self.paths.javac);
        cmd.args(["-source", "1.8", "-target", "1.8"])
            .arg("-bootclasspath")
            .arg(&self.paths.android_jar)
            .arg("-classpath")
            .arg(&self.paths.android_jar)
            .arg("-d")
            .arg(out_dir)
            .args(sources);
        self.run(cmd, "javac")
    }

    fn convert_bytecode(
        &self,
        classes: &[PathBuf],
        out_dir: &Path,
    ) -> Result<ToolOutput, PackError> {
        let mut cmd = self.command(&self.paths.d8);
        cmd.arg("--output")
            .arg(out_dir)
            .arg("--lib")
            .arg(&self.paths.android_jar)
            .args(classes);
        self.run(cmd, "d8")
    }

    fn sign_package(
        &self,
        unsigned: &Path,
        identity: &SigningIdentity,
        output: &Path,
    ) -> Result<ToolOutput, PackError> {
        let mut cmd = self.command(&self.paths.apksigner);
        cmd.arg("sign")
            .arg("--ks")
            .arg(&identity.keystore_path)
            .arg("--ks-key-alias")
            .arg(&identity.alias)
            .arg("--ks-pass")
            .arg(password_arg(&identity.store_password))
            .arg("--key-pass")
            .arg(password_arg(&identity.key_password))
            .arg("--out")
            .arg(output)
            .arg(unsigned);
        self.run(cmd, "apksigner sign")
    }

    fn build_bundle(&self, modules: &[PathBuf], output: &Path) -> Result<ToolOutput, PackError> {
        let modules = modules
            .iter()
            .map(|m| m.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut cmd = self.command(&self.paths.java);
        cmd.arg("-jar")
            .arg(&self.paths.bundletool)
            .arg("build-bundle")
            .arg(format!("--modules={}", modules))
            .arg(format!("--output={}", output.display()));
        self.run(cmd, "bundletool build-bundle")
    }

    fn sign_bundle(
        &self,
        unsigned: &Path,
        identity: &SigningIdentity,
        output: &Path,
    ) -> Result<ToolOutput, PackError> {
        let mut cmd = self.command(&self.paths.jarsigner);
        cmd.arg("-keystore")
            .arg(&identity.keystore_path)
            .arg("-storepass")
            .arg(&identity.store_password)
            .arg("-keypass")
            .arg(&identity.key_password)
            .arg("-signedjar")
            .arg(output)
            .arg(unsigned)
            .arg(&identity.alias);
        self.run(cmd, "jarsigner")
    }

    fn create_identity(&self, identity: &SigningIdentity) -> Result<ToolOutput, PackError> {
        let mut cmd = self.command(&self.paths.keytool);
        cmd.arg("-genkeypair")
            .arg("-v")
            .arg("-keystore")
            .arg(&identity.keystore_path)
            .arg("-alias")
            .arg(&identity.alias)
            .args(["-keyalg", "RSA"])
            .arg("-keysize")
            .arg(identity.key_size.to_string())
            .arg("-validity")
            .arg(identity.validity_days.to_string())
            .arg("-storepass")
            .arg(&identity.store_password)
            .arg("-keypass")
            .arg(&identity.key_password)
            .arg("-dname")
            .arg(&identity.distinguished_name);
        self.run(cmd, "keytool -genkeypair")
    }
}
