//! Persistent signing identity shared by every build in one environment.
//!
//! The identity is a Java keystore kept in the SDK root, outside any build
//! workspace. It is created on first use and reused unchanged afterwards.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::toolchain::Toolchain;
use crate::types::PackError;

pub const KEYSTORE_FILE_NAME: &str = "debug.keystore";
pub const KEY_ALIAS: &str = "androiddebugkey";
pub const KEYSTORE_PASSWORD: &str = "android";
pub const KEY_PASSWORD: &str = "android";
pub const DISTINGUISHED_NAME: &str = "CN=Android Debug,O=Android,C=US";
pub const KEY_SIZE: u32 = 2048;
pub const VALIDITY_DAYS: u32 = 10000;

/// Credentials used by both the package and the bundle signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    pub keystore_path: PathBuf,
    pub alias: String,
    pub store_password: String,
    pub key_password: String,
    pub distinguished_name: String,
    pub key_size: u32,
    pub validity_days: u32,
}

impl SigningIdentity {
    /// The fixed debug identity stored in `store_dir`.
    pub fn debug_in(store_dir: &Path) -> Self {
        Self {
            keystore_path: store_dir.join(KEYSTORE_FILE_NAME),
            alias: KEY_ALIAS.to_string(),
            store_password: KEYSTORE_PASSWORD.to_string(),
            key_password: KEY_PASSWORD.to_string(),
            distinguished_name: DISTINGUISHED_NAME.to_string(),
            key_size: KEY_SIZE,
            validity_days: VALIDITY_DAYS,
        }
    }

    pub fn exists(&self) -> bool {
        self.keystore_path.is_file()
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    /// Where the keystore is generated before being moved into place.
    fn staging_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.keystore_path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Returns the identity in `store_dir`, creating it if absent.
///
/// An existing keystore is returned without locking. Creation happens under an
/// exclusive file lock and re-checks existence once the lock is held, so two
/// concurrent builds never generate conflicting keystores.
///
/// The keystore is generated at a sibling `.tmp` path and renamed into place
/// only once the tool succeeds. A failed or timed-out generation leaves no
/// keystore behind, and the next call generates a fresh one.
pub fn ensure_signing_identity(
    toolchain: &dyn Toolchain,
    store_dir: &Path,
) -> Result<SigningIdentity, PackError> {
    let identity = SigningIdentity::debug_in(store_dir);
    if identity.exists() {
        debug!(keystore = %identity.keystore_path.display(), "reusing signing identity");
        return Ok(identity);
    }

    fs::create_dir_all(store_dir)?;
    let lock = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(identity.lock_path())?;
    lock.lock_exclusive()?;

    let result = if identity.exists() {
        debug!(keystore = %identity.keystore_path.display(), "signing identity created concurrently");
        Ok(())
    } else {
        println!("Generating debug keystore...");
        info!(keystore = %identity.keystore_path.display(), "creating signing identity");
        create_staged(toolchain, &identity)
    };

    let _ = lock.unlock();
    result.map(|()| identity)
}

fn create_staged(toolchain: &dyn Toolchain, identity: &SigningIdentity) -> Result<(), PackError> {
    let staging = SigningIdentity {
        keystore_path: identity.staging_path(),
        ..identity.clone()
    };
    // keytool refuses to write into an existing file, even an empty one.
    remove_if_present(&staging.keystore_path)?;

    if let Err(err) = toolchain.create_identity(&staging) {
        let _ = remove_if_present(&staging.keystore_path);
        return Err(err);
    }
    if !staging.exists() {
        return Err(PackError::invocation(
            "create_identity",
            format!(
                "tool reported success but wrote no keystore at {}",
                staging.keystore_path.display()
            ),
        ));
    }
    fs::rename(&staging.keystore_path, &identity.keystore_path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), PackError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
