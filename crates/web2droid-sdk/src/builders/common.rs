//! Common utilities shared between the compile stage and both assemblers.
//!
//! ## Features
//!
//! - **Workspace staging** - A collision-free, single-use directory tree that is
//!   always removed when the build ends
//! - **Bounded command execution** - Every external tool runs with a deadline and
//!   its output captured for diagnostics
//! - **Container helpers** - Appending to, exploding and creating zip containers
//!
//! ## Error Messages
//!
//! Failed invocations report what was run, its exit status, and both captured
//! streams, so the failing stage can be diagnosed from the console alone.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::toolchain::ToolOutput;
use crate::types::PackError;

/// Fixed prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "build_temp_";

const MAX_NAME_ATTEMPTS: u32 = 100;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ephemeral build directory with a fixed sub-layout.
///
/// ```text
/// build_temp_<millis>/
/// ├── java/      # native shell source tree
/// ├── res/       # resource tree (layout/, values/, mipmap-hdpi/)
/// ├── assets/    # web content
/// ├── gen/       # generated accessor sources
/// ├── obj/       # intermediate object code
/// └── dex/       # converted bytecode
/// ```
///
/// A workspace belongs to exactly one build. [`Workspace::destroy`] removes it
/// without ever failing; dropping an undestroyed workspace does the same.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Creates a fresh workspace under `parent`.
    ///
    /// The name combines [`WORKSPACE_PREFIX`] with the build start time. If that
    /// name is taken, a numeric suffix is appended instead of reusing the
    /// existing directory.
    pub fn create(parent: &Path) -> Result<Self, PackError> {
        fs::create_dir_all(parent)?;
        let token = build_token();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                token.clone()
            } else {
                format!("{}_{}", token, attempt)
            };
            let candidate = parent.join(name);
            match fs::create_dir(&candidate) {
                Ok(()) => {
                    let workspace = Self {
                        root: candidate,
                        removed: false,
                    };
                    workspace.create_layout()?;
                    debug!(path = %workspace.root.display(), "workspace created");
                    return Ok(workspace);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(PackError::Io(e)),
            }
        }

        Err(PackError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "no free workspace name for token {} under {}",
                token,
                parent.display()
            ),
        )))
    }

    fn create_layout(&self) -> Result<(), PackError> {
        for dir in [
            self.source_dir(),
            self.res_dir().join("layout"),
            self.res_dir().join("values"),
            self.assets_dir(),
            self.gen_dir(),
            self.obj_dir(),
            self.dex_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file directly inside the workspace root.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join("java")
    }

    pub fn res_dir(&self) -> PathBuf {
        self.root.join("res")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn gen_dir(&self) -> PathBuf {
        self.root.join("gen")
    }

    pub fn obj_dir(&self) -> PathBuf {
        self.root.join("obj")
    }

    pub fn dex_dir(&self) -> PathBuf {
        self.root.join("dex")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("AndroidManifest.xml")
    }

    /// Removes the whole tree. Failures are logged, never returned.
    pub fn destroy(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "workspace removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.root.display(),
                error = %e,
                "failed to remove build workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Unique-per-build directory name derived from the current time.
pub fn build_token() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("{}{}", WORKSPACE_PREFIX, millis)
}

/// Runs an external command with a deadline and captured output.
///
/// # Arguments
/// * `cmd` - The command to execute
/// * `description` - Name of the operation, used in errors
/// * `timeout` - Upper bound on the run time; the child is killed when exceeded
///
/// # Returns
/// The captured output if the command exits successfully, otherwise a
/// [`PackError::Invocation`] carrying the exit status and both streams.
pub fn run_command(
    mut cmd: Command,
    description: &str,
    timeout: Duration,
) -> Result<ToolOutput, PackError> {
    debug!(command = ?cmd, "running {}", description);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            PackError::invocation(
                description,
                format!(
                    "Failed to start.\n\n\
                     Error: {}\n\n\
                     Ensure the tool is installed and the toolchain paths are correct.",
                    e
                ),
            )
        })?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);
    let deadline = Instant::now() + timeout;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            // Readers are left detached: a grandchild may still hold the pipes.
            return Err(PackError::invocation(
                description,
                format!("timed out after {}s and was killed", timeout.as_secs_f64()),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = ToolOutput {
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    };

    if !status.success() {
        return Err(PackError::invocation(
            description,
            format!(
                "Exit status: {}\n\n\
                 Stdout:\n{}\n\n\
                 Stderr:\n{}",
                status, output.stdout, output.stderr
            ),
        ));
    }
    Ok(output)
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Lists every file under `dir` with the given extension, sorted by path.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PackError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some(extension)
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Appends `source` to an existing zip container as `entry_name`.
///
/// Existing entries are left untouched; the new entry is stored uncompressed.
pub fn append_to_container(
    container: &Path,
    source: &Path,
    entry_name: &str,
) -> Result<(), PackError> {
    let file = OpenOptions::new().read(true).write(true).open(container)?;
    let mut zip = ZipWriter::new_append(file)?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file(entry_name, options)?;
    let mut input = File::open(source)?;
    io::copy(&mut input, &mut zip)?;
    zip.finish()?;
    Ok(())
}

/// Extracts every entry of a zip container into `dest`.
pub fn extract_container(container: &Path, dest: &Path) -> Result<(), PackError> {
    let file = File::open(container)?;
    let mut archive = ZipArchive::new(file)?;
    archive.extract(dest)?;
    Ok(())
}

/// Zips the contents of `dir` into `output`, paths relative to `dir`.
pub fn zip_dir(dir: &Path, output: &Path) -> Result<(), PackError> {
    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| PackError::Unexpected(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(name, options)?;
        let mut input = File::open(entry.path())?;
        io::copy(&mut input, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

/// Names of the entries in a zip container, in archive order.
pub fn container_entries(container: &Path) -> Result<Vec<String>, PackError> {
    let file = File::open(container)?;
    let archive = ZipArchive::new(file)?;
    Ok(archive.file_names().map(str::to_string).collect())
}
