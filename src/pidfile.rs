//! Advisory single-instance marker files.
//!
//! A pidfile holds exactly one line: the decimal process id of the process
//! that claimed it. [`claim`] creates it, [`PidFile::release`] removes it
//! again, but only while it still carries the pid recorded at claim time.
//!
//! This is not a lock. Two processes claiming the same path race on a single
//! create-exclusive open, and nothing stops a third party from rewriting the
//! file afterwards; release detects that instead of preventing it.

use crate::errors::*;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, warn};

lazy_static! {
    /// Location used by the command line tool when no path is configured.
    pub static ref DEFAULT_PIDFILE: PathBuf = PathBuf::from(".pidrec.pid");
}

/// Anything longer cannot be a single pid line.
const MAX_PIDFILE_LEN: u64 = 4096;

/// Handle for a claimed pidfile.
///
/// `PidFile::default()` is the empty handle; releasing it does nothing, so
/// shutdown paths can release unconditionally.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

/// Creates `path` and writes the current process id into it.
///
/// Fails with `AlreadyRunning` if anything exists at `path`, in which case
/// the existing entry is left alone.
pub fn claim<P: AsRef<Path>>(path: P) -> Result<PidFile> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        bail!(ErrorKind::InvalidArgument("pidfile path is empty".into()));
    }

    let mut file = match create_exclusive(path) {
        Ok(file) => file,
        Err(ref err) if err.kind() == io::ErrorKind::AlreadyExists => {
            bail!(ErrorKind::AlreadyRunning(path.to_path_buf()));
        }
        // Some platforms report an existing directory as a permission error.
        Err(_) if fs::symlink_metadata(path).is_ok() => {
            bail!(ErrorKind::AlreadyRunning(path.to_path_buf()));
        }
        Err(err) => {
            return Err(Error::with_chain(
                err,
                ErrorKind::Io(path.to_path_buf(), "create".into()),
            ));
        }
    };

    let pid = process::id();
    let written = writeln!(file, "{}", pid).and_then(|()| file.sync_all());
    drop(file);
    if let Err(err) = written {
        return Err(abandon_claim(path, err));
    }

    debug!(path = %path.display(), pid, "claimed pidfile");
    Ok(PidFile {
        path: path.to_path_buf(),
        pid,
    })
}

/// Releases `handle` if there is one.
pub fn release(handle: Option<PidFile>) -> Result<()> {
    match handle {
        Some(pidfile) => pidfile.release(),
        None => Ok(()),
    }
}

/// Reads the pid stored in the pidfile at `path`.
///
/// The file must hold a single line with a base 10 integer. Surrounding
/// spaces, tabs and newlines are ignored, and so are trailing blank lines.
/// Files larger than a few KiB are rejected without being read in full.
pub fn read_pid<P: AsRef<Path>>(path: P) -> Result<u32> {
    let path = path.as_ref();
    let file =
        fs::File::open(path).chain_err(|| ErrorKind::Io(path.to_path_buf(), "open".into()))?;

    let mut raw = Vec::new();
    file.take(MAX_PIDFILE_LEN + 1)
        .read_to_end(&mut raw)
        .chain_err(|| ErrorKind::Io(path.to_path_buf(), "read".into()))?;
    if raw.len() as u64 > MAX_PIDFILE_LEN {
        bail!(ErrorKind::MalformedContent(
            path.to_path_buf(),
            format!("content longer than {} bytes", MAX_PIDFILE_LEN)
        ));
    }
    let text = match String::from_utf8(raw) {
        Ok(text) => text,
        Err(_) => {
            bail!(ErrorKind::MalformedContent(
                path.to_path_buf(),
                "content is not utf-8".into()
            ));
        }
    };

    let mut lines = text.lines();
    let first = lines.next().unwrap_or("");
    if lines.any(|line| !trim(line).is_empty()) {
        bail!(ErrorKind::MalformedContent(
            path.to_path_buf(),
            "spurious content".into()
        ));
    }

    let content = trim(first);
    let pid = content.parse::<u32>().map_err(|err| -> Error {
        ErrorKind::MalformedContent(
            path.to_path_buf(),
            format!("content not a number '{}': {}", content, err),
        )
        .into()
    })?;
    debug!(path = %path.display(), pid, "read pidfile");
    Ok(pid)
}

impl PidFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Removes the pidfile if it still contains the pid recorded at claim
    /// time.
    ///
    /// On `PidMismatch` the file is left in place: some other process has
    /// claimed it since, and deciding what to do about that is up to the
    /// caller.
    pub fn release(self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        let found = read_pid(&self.path)?;
        if found != self.pid {
            bail!(ErrorKind::PidMismatch(self.path, self.pid, found));
        }

        fs::remove_file(&self.path)
            .chain_err(|| ErrorKind::Io(self.path.clone(), "remove".into()))?;
        debug!(path = %self.path.display(), pid = self.pid, "released pidfile");
        Ok(())
    }

    /// Wraps the handle so that it is released when the guard goes out of
    /// scope.
    pub fn into_guard(self) -> ReleaseGuard {
        ReleaseGuard {
            pidfile: Some(self),
        }
    }
}

/// Releases the wrapped pidfile on drop.
///
/// The pid check still applies: a tampered pidfile survives the drop.
#[derive(Debug)]
pub struct ReleaseGuard {
    pidfile: Option<PidFile>,
}

impl ReleaseGuard {
    pub fn path(&self) -> Option<&Path> {
        self.pidfile.as_ref().map(PidFile::path)
    }

    /// Releases now and reports the outcome instead of logging it.
    pub fn release(mut self) -> Result<()> {
        release(self.pidfile.take())
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        // We must never panic in drop.
        if let Some(pidfile) = self.pidfile.take() {
            let path = pidfile.path.clone();
            if let Err(err) = pidfile.release() {
                warn!(path = %path.display(), error = %err, "could not release pidfile");
            }
        }
    }
}

fn create_exclusive(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

/// Removes a pidfile whose write failed, so a failed claim leaves no marker.
fn abandon_claim(path: &Path, err: io::Error) -> Error {
    let _ = fs::remove_file(path);
    Error::with_chain(err, ErrorKind::Io(path.to_path_buf(), "write".into()))
}

fn trim(line: &str) -> &str {
    line.trim_matches(|c| c == ' ' || c == '\t' || c == '\n')
}
