//! Descriptor and native shell generation
//!
//! This module produces the two build inputs the toolchain needs from a
//! [`BuildRequest`]: the app descriptor (`AndroidManifest.xml`) and the native
//! shell (`MainActivity.java`), which hosts the bundled page in a full-screen
//! `WebView`. It also stages the web content and the optional launcher icon.

use std::fs;
use std::path::{Path, PathBuf};

use include_dir::{Dir, DirEntry, include_dir};
use quick_xml::escape::escape;
use tracing::{debug, warn};

use crate::builders::common::Workspace;
use crate::toolchain::SdkVersions;
use crate::types::{AppIdentity, BuildRequest, PackError};

const SHELL_TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates/shell");

/// Icon reference used when no usable icon was supplied.
pub const DEFAULT_ICON: &str = "@android:drawable/sym_def_app_icon";
/// Icon reference of a copied launcher icon.
pub const LAUNCHER_ICON: &str = "@mipmap/ic_launcher";
/// Density bucket receiving the launcher icon.
pub const ICON_BUCKET: &str = "mipmap-hdpi";
/// File stem of the launcher icon inside its bucket.
pub const ICON_STEM: &str = "ic_launcher";

/// Logical file name of the bundled web page inside the asset tree.
pub const ENTRY_ASSET: &str = "index.html";
/// URL the native shell loads.
pub const ENTRY_URL: &str = "file:///android_asset/index.html";

pub const ACTIVITY_CLASS: &str = "MainActivity";
pub const INTERNET_PERMISSION: &str = "android.permission.INTERNET";
pub const NO_TITLE_THEME: &str = "@android:style/Theme.NoTitleBar";
pub const VERSION_CODE: &str = "1";

/// Template variable that can be replaced in template files
#[derive(Debug, Clone)]
pub struct TemplateVar {
    pub name: &'static str,
    pub value: String,
}

/// Structured app descriptor, rendered by [`render_manifest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub package: String,
    pub version_code: String,
    pub version_name: String,
    pub min_sdk: u32,
    pub target_sdk: u32,
    pub permissions: Vec<String>,
    pub label: String,
    pub icon: String,
    pub theme: String,
    /// Entry activity, relative to `package` (e.g. `.MainActivity`).
    pub activity: String,
    pub uses_cleartext_traffic: bool,
}

impl AppDescriptor {
    /// Builds the descriptor for a request with a resolved icon reference.
    pub fn new(
        request: &BuildRequest,
        identity: &AppIdentity,
        sdk: SdkVersions,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            package: identity.package_name.clone(),
            version_code: VERSION_CODE.to_string(),
            version_name: request.version.clone(),
            min_sdk: sdk.min_sdk,
            target_sdk: sdk.target_sdk,
            permissions: vec![INTERNET_PERMISSION.to_string()],
            label: request.app_name.clone(),
            icon: icon.into(),
            theme: NO_TITLE_THEME.to_string(),
            activity: format!(".{}", ACTIVITY_CLASS),
            uses_cleartext_traffic: true,
        }
    }
}

/// Everything the generator placed into the workspace.
#[derive(Debug, Clone)]
pub struct GeneratedInputs {
    pub descriptor: AppDescriptor,
    pub manifest: PathBuf,
    pub shell_source: PathBuf,
}

/// Stages the web content, icon, descriptor and shell source.
///
/// # Errors
///
/// * [`PackError::Input`] if the HTML entry file does not exist. Nothing else
///   is staged in that case.
/// * [`PackError::Io`] / [`PackError::Template`] on write or render failures.
pub fn generate_inputs(
    workspace: &Workspace,
    request: &BuildRequest,
    identity: &AppIdentity,
    sdk: SdkVersions,
) -> Result<GeneratedInputs, PackError> {
    if !request.html_path.is_file() {
        return Err(PackError::Input(format!(
            "HTML file {} not found",
            request.html_path.display()
        )));
    }
    fs::copy(
        &request.html_path,
        workspace.assets_dir().join(ENTRY_ASSET),
    )?;

    let icon = stage_icon(&workspace.res_dir(), request.icon_path.as_deref())?;
    let descriptor = AppDescriptor::new(request, identity, sdk, icon);

    let manifest = workspace.manifest_path();
    fs::write(&manifest, render_manifest(&descriptor))?;

    let source_dir = workspace.source_dir().join(identity.package_path());
    render_dir(&SHELL_TEMPLATES, &source_dir, &shell_vars(identity))?;
    let shell_source = source_dir.join(format!("{}.java", ACTIVITY_CLASS));

    debug!(
        package = %descriptor.package,
        icon = %descriptor.icon,
        "generated descriptor and shell source"
    );

    Ok(GeneratedInputs {
        descriptor,
        manifest,
        shell_source,
    })
}

/// Copies the icon into the resource tree and returns its reference.
///
/// A missing icon path falls back to [`DEFAULT_ICON`] with a warning.
pub fn stage_icon(res_dir: &Path, icon_path: Option<&Path>) -> Result<String, PackError> {
    let Some(icon_path) = icon_path else {
        return Ok(DEFAULT_ICON.to_string());
    };
    if !icon_path.is_file() {
        warn!(
            icon = %icon_path.display(),
            "icon path not found, using the default icon"
        );
        return Ok(DEFAULT_ICON.to_string());
    }

    let bucket = res_dir.join(ICON_BUCKET);
    fs::create_dir_all(&bucket)?;
    let file_name = match icon_path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", ICON_STEM, ext.to_lowercase()),
        None => ICON_STEM.to_string(),
    };
    fs::copy(icon_path, bucket.join(file_name))?;
    Ok(LAUNCHER_ICON.to_string())
}

/// Renders the descriptor as `AndroidManifest.xml`.
///
/// Every value is XML-escaped, so names like `Tom & Jerry` stay well-formed.
pub fn render_manifest(descriptor: &AppDescriptor) -> String {
    let permissions: String = descriptor
        .permissions
        .iter()
        .map(|p| {
            format!(
                "    <uses-permission android:name=\"{}\" />\n",
                escape(p)
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="{package}"
    android:versionCode="{version_code}"
    android:versionName="{version_name}">
    <uses-sdk android:minSdkVersion="{min_sdk}" android:targetSdkVersion="{target_sdk}" />
{permissions}    <application
        android:label="{label}"
        android:icon="{icon}"
        android:theme="{theme}"
        android:usesCleartextTraffic="{cleartext}">
        <activity android:name="{activity}"
            android:exported="true">
            <intent-filter>
                <action android:name="android.intent.action.MAIN" />
                <category android:name="android.intent.category.LAUNCHER" />
            </intent-filter>
        </activity>
    </application>
</manifest>
"#,
        package = escape(&descriptor.package),
        version_code = escape(&descriptor.version_code),
        version_name = escape(&descriptor.version_name),
        min_sdk = descriptor.min_sdk,
        target_sdk = descriptor.target_sdk,
        permissions = permissions,
        label = escape(&descriptor.label),
        icon = escape(&descriptor.icon),
        theme = escape(&descriptor.theme),
        cleartext = descriptor.uses_cleartext_traffic,
        activity = escape(&descriptor.activity),
    )
}

/// Renders the native shell source for a package.
pub fn render_shell_source(identity: &AppIdentity) -> Result<String, PackError> {
    let name = format!("{}.java.template", ACTIVITY_CLASS);
    let file = SHELL_TEMPLATES
        .get_file(&name)
        .ok_or_else(|| PackError::Template(format!("embedded template {} missing", name)))?;
    let text = file
        .contents_utf8()
        .ok_or_else(|| PackError::Template(format!("template {} is not UTF-8", name)))?;
    let rendered = render_template(text, &shell_vars(identity));
    validate_no_unreplaced_placeholders(&rendered, Path::new(&name))?;
    Ok(rendered)
}

fn shell_vars(identity: &AppIdentity) -> Vec<TemplateVar> {
    vec![
        TemplateVar {
            name: "PACKAGE_NAME",
            value: identity.package_name.clone(),
        },
        TemplateVar {
            name: "ACTIVITY_CLASS",
            value: ACTIVITY_CLASS.to_string(),
        },
        TemplateVar {
            name: "ENTRY_URL",
            value: ENTRY_URL.to_string(),
        },
    ]
}

fn render_dir(dir: &Dir, out_root: &Path, vars: &[TemplateVar]) -> Result<(), PackError> {
    for entry in dir.entries() {
        match entry {
            DirEntry::Dir(sub) => render_dir(sub, out_root, vars)?,
            DirEntry::File(file) => {
                let mut relative = file.path().to_path_buf();
                let mut contents = file.contents().to_vec();

                if relative.extension().is_some_and(|ext| ext == "template") {
                    // Remove .template extension from output filename
                    relative.set_extension("");
                    let text = std::str::from_utf8(&contents).map_err(|e| {
                        PackError::Template(format!("{:?} is not UTF-8: {}", relative, e))
                    })?;
                    let rendered = render_template(text, vars);
                    validate_no_unreplaced_placeholders(&rendered, &relative)?;
                    contents = rendered.into_bytes();
                }

                let out_path = out_root.join(relative);
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&out_path, contents)?;
            }
        }
    }
    Ok(())
}

/// Validates that no unreplaced template placeholders remain in the rendered content
fn validate_no_unreplaced_placeholders(content: &str, file_path: &Path) -> Result<(), PackError> {
    let mut pos = 0;
    let mut unreplaced = Vec::new();

    while let Some(start) = content[pos..].find("{{") {
        let abs_start = pos + start;
        if let Some(end) = content[abs_start..].find("}}") {
            let placeholder = &content[abs_start..abs_start + end + 2];
            let var_name = &content[abs_start + 2..abs_start + end];
            if !var_name.contains(' ') && !var_name.is_empty() {
                unreplaced.push(placeholder.to_string());
            }
            pos = abs_start + end + 2;
        } else {
            break;
        }
    }

    if !unreplaced.is_empty() {
        return Err(PackError::Template(format!(
            "unreplaced placeholders in {:?}: {:?}",
            file_path, unreplaced
        )));
    }

    Ok(())
}

fn render_template(input: &str, vars: &[TemplateVar]) -> String {
    let mut output = input.to_string();
    for var in vars {
        output = output.replace(&format!("{{{{{}}}}}", var.name), &var.value);
    }
    output
}
