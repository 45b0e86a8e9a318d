//! # web2droid
//!
//! Command-line tool that packages a static web page as an Android app.
//!
//! ## Overview
//!
//! `web2droid` takes one HTML file, asks for a few app details and produces a
//! signed APK, optionally together with a signed App Bundle (AAB). The page is
//! shown full-screen in a `WebView` with JavaScript and DOM storage enabled.
//!
//! ## Quick Start
//!
//! ```bash
//! web2droid index.html
//! # App name [MyWebApp]: Demo App
//! # Version [1.0]: 2.3
//! # Icon path (optional):
//! # Also build an AAB bundle? [y/N]: n
//! ```
//!
//! When stdin is not a terminal the four answers are read line by line instead,
//! with an empty or missing line taking the default:
//!
//! ```bash
//! printf 'Demo App\n2.3\n\nn\n' | web2droid index.html
//! ```
//!
//! The artifacts are written as `<App_Name>.apk` / `<App_Name>.aab` into the
//! current directory.
//!
//! ## Requirements
//!
//! The Android build-tools, a platform `android.jar` and a JDK must be present.
//! By default they are looked up in `~/.android_web_builder_sdk`:
//!
//! ```text
//! ~/.android_web_builder_sdk/
//! ├── build-tools/33.0.0/   # aapt2, d8, apksigner
//! ├── platforms/android-33/ # android.jar
//! ├── bundletool.jar        # only needed for AAB output
//! └── debug.keystore        # created on first build
//! ```
//!
//! Set `WEB2DROID_SDK_ROOT` (also read from `.env.local`) to use another root.
//!
//! ## Exit Status
//!
//! The process exits non-zero only when the toolchain is unavailable or the
//! configuration cannot be read. A failed build is reported on the console and
//! still exits with status 0, as does cancelling a prompt with Ctrl-C.
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `web2droid.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Confirm, Input};
use std::env;
use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::debug;

use web2droid_sdk::{
    AndroidSdkToolchain, AppBuilder, ArtifactKind, BuildOutput, BuildRequest, PlatformProfile,
};

pub mod config;

use config::{ConfigResolver, SDK_ROOT_ENV};

/// Default answer to the app name prompt.
pub const DEFAULT_APP_NAME: &str = "MyWebApp";
/// Default answer to the version prompt.
pub const DEFAULT_VERSION: &str = "1.0";

/// Package a static web page as a signed Android APK or App Bundle.
#[derive(Parser, Debug)]
#[command(name = "web2droid", author, version, about = "Convert an HTML page into an Android app", long_about = None)]
struct Cli {
    /// Path to the index.html file
    html_file: PathBuf,
}

/// Answers collected from the interactive prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDetails {
    pub app_name: String,
    pub version: String,
    pub icon_path: Option<PathBuf>,
    pub bundle: bool,
}

impl AppDetails {
    /// Turns the answers into a build request for `html_file`.
    ///
    /// The single-file package is always produced.
    pub fn into_request(self, html_file: PathBuf) -> BuildRequest {
        BuildRequest::new(html_file, self.app_name, self.version)
            .icon(self.icon_path)
            .bundle(self.bundle)
    }
}

pub fn run() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    let resolver = ConfigResolver::new()?;
    if let Some(path) = &resolver.config_path {
        debug!(path = %path.display(), "loaded config");
    }

    println!("Selected file: {}", cli.html_file.display());
    let details = if io::stdin().is_terminal() {
        match prompt_app_details() {
            Ok(details) => details,
            Err(err) if is_interrupted(&err) => {
                println!("\nCancelled by user.");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    } else {
        read_answers(io::stdin().lock())?
    };

    let toolchain = resolve_toolchain(&resolver, details.bundle)?;

    let cwd = env::current_dir().context("Failed to get current directory")?;
    let builder =
        AppBuilder::new(&toolchain, toolchain.sdk_root()).options(resolver.build_options(&cwd));
    let request = details.into_request(cli.html_file);

    match builder.build(&request) {
        Ok(output) => print_success(&output),
        Err(failure) => {
            eprintln!("\n[ERROR] Build failed while {}: {}", failure.state, failure.error);
            for artifact in &failure.artifacts {
                println!("{} kept: {}", artifact.kind.as_str(), artifact.path.display());
            }
        }
    }

    Ok(())
}

/// Asks for the app name, version, icon and bundle choice.
fn prompt_app_details() -> Result<AppDetails> {
    println!("Enter App Details:");

    let app_name: String = Input::new()
        .with_prompt("App name")
        .default(DEFAULT_APP_NAME.to_string())
        .interact_text()
        .context("Failed to read app name")?;

    let version: String = Input::new()
        .with_prompt("Version")
        .default(DEFAULT_VERSION.to_string())
        .interact_text()
        .context("Failed to read version")?;

    let icon: String = Input::new()
        .with_prompt("Icon path (optional)")
        .allow_empty(true)
        .interact_text()
        .context("Failed to read icon path")?;

    let bundle = Confirm::new()
        .with_prompt("Also build an AAB bundle?")
        .default(false)
        .interact()
        .context("Failed to read bundle choice")?;

    Ok(AppDetails {
        app_name,
        version,
        icon_path: parse_icon_path(&icon),
        bundle,
    })
}

/// Reads the four answers from non-interactive input, one per line: app name,
/// version, icon path and bundle choice (`y`/`yes`, case-insensitive).
///
/// Empty lines and missing trailing lines take the prompt defaults.
pub fn read_answers<R: BufRead>(reader: R) -> Result<AppDetails> {
    let mut lines = reader.lines();
    let mut next = |what: &str| -> Result<String> {
        match lines.next() {
            Some(line) => Ok(line
                .with_context(|| format!("Failed to read {}", what))?
                .trim()
                .to_string()),
            None => Ok(String::new()),
        }
    };

    let app_name = or_default(next("app name")?, DEFAULT_APP_NAME);
    let version = or_default(next("version")?, DEFAULT_VERSION);
    let icon_path = parse_icon_path(&next("icon path")?);
    let bundle = matches!(
        next("bundle choice")?.to_lowercase().as_str(),
        "y" | "yes"
    );

    Ok(AppDetails {
        app_name,
        version,
        icon_path,
        bundle,
    })
}

fn or_default(answer: String, default: &str) -> String {
    if answer.is_empty() {
        default.to_string()
    } else {
        answer
    }
}

/// True when a prompt was aborted with Ctrl-C.
fn is_interrupted(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::Interrupted)
    })
}

/// Trims the icon answer and strips surrounding double quotes, as left by
/// drag-and-drop into a terminal. An empty answer means no icon.
pub fn parse_icon_path(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim();
    if unquoted.is_empty() {
        None
    } else {
        Some(PathBuf::from(unquoted))
    }
}

/// Resolves and verifies the toolchain for this host.
///
/// A missing tool ends the process with an environment error.
fn resolve_toolchain(resolver: &ConfigResolver, with_bundle: bool) -> Result<AndroidSdkToolchain> {
    let sdk_root = resolver.sdk_root(env::var_os(SDK_ROOT_ENV).map(PathBuf::from))?;
    let profile = resolver.profile(PlatformProfile::current());
    debug!(
        sdk_root = %sdk_root.display(),
        host = profile.host.as_str(),
        build_tools = %profile.build_tools_version,
        "resolving toolchain"
    );

    let toolchain =
        AndroidSdkToolchain::resolve(sdk_root, profile, resolver.toolchain_settings()?);
    toolchain
        .verify(with_bundle)
        .context("Android toolchain is not ready")?;
    Ok(toolchain)
}

fn print_success(output: &BuildOutput) {
    println!("\nBuild complete for {}", output.package_name);
    for kind in [ArtifactKind::Package, ArtifactKind::Bundle] {
        if let Some(artifact) = output.artifact(kind) {
            println!("[SUCCESS] {} created: {}", kind.as_str(), display_path(&artifact.path));
        }
    }
}

fn display_path(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn load_dotenv() {
    if let Ok(cwd) = env::current_dir() {
        let _ = dotenvy::from_path(cwd.join(".env.local"));
    }
}
