use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::PollRead;

/// Default permission mode for created FIFO paths.
pub const DEFAULT_FIFO_MODE: u32 = 0o600;

/// Largest write the kernel guarantees not to interleave with other writers.
pub const PIPE_BUF: usize = libc::PIPE_BUF;

/// Make sure a FIFO special file exists at `path`.
///
/// Returns `true` when the FIFO was created by this call. An existing FIFO is
/// left untouched; any other kind of file at `path` is rejected.
pub fn ensure_fifo(path: impl AsRef<Path>, mode: u32) -> Result<bool> {
    let path = path.as_ref();

    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_fifo() => return Ok(false),
        Ok(_) => {
            return Err(TransportError::NotFifo {
                path: path.to_path_buf(),
            })
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(TransportError::Create {
                path: path.to_path_buf(),
                source: err,
            })
        }
    }

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| TransportError::Create {
        path: path.to_path_buf(),
        source: io::Error::new(ErrorKind::InvalidInput, "path contains an interior NUL byte"),
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == ErrorKind::AlreadyExists {
            // Lost a race with another creator; accept it if it is a FIFO.
            return ensure_fifo(path, mode);
        }
        return Err(TransportError::Create {
            path: path.to_path_buf(),
            source: err,
        });
    }

    // mkfifo honours the umask; apply the requested mode explicitly.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        TransportError::Create {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    info!(?path, mode = %format!("{mode:o}"), "created fifo");
    Ok(true)
}

/// Read end of a FIFO.
///
/// Opening blocks until a writer attaches. Once open, the descriptor is
/// switched to non-blocking mode so that reads never stall: readiness is
/// observed through [`PollRead::poll_readable`] with a bounded timeout.
pub struct FifoReader {
    file: File,
    path: PathBuf,
    identity: (u64, u64),
}

impl FifoReader {
    /// Create the FIFO if needed and open it for reading.
    ///
    /// Blocks until a writer opens the other end.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_mode(path, DEFAULT_FIFO_MODE)
    }

    /// Create the FIFO with an explicit mode if needed and open it for reading.
    pub fn open_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_fifo(&path, mode)?;

        let file = loop {
            match OpenOptions::new().read(true).open(&path) {
                Ok(file) => break file,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(TransportError::Open {
                        path: path.clone(),
                        source: err,
                    })
                }
            }
        };

        let metadata = file.metadata().map_err(|e| TransportError::Open {
            path: path.clone(),
            source: e,
        })?;
        set_nonblocking(&file).map_err(|e| TransportError::Open {
            path: path.clone(),
            source: e,
        })?;

        debug!(?path, "fifo writer attached");

        Ok(Self {
            file,
            path,
            identity: (metadata.dev(), metadata.ino()),
        })
    }

    /// The path this reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FifoReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl PollRead for FifoReader {
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `pfd` is a single valid pollfd and nfds is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }

        // POLLHUP without POLLIN means the writer left; a read will report EOF.
        Ok(rc > 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
    }

    fn is_detached(&self) -> bool {
        match std::fs::symlink_metadata(&self.path) {
            Ok(metadata) => {
                !metadata.file_type().is_fifo()
                    || (metadata.dev(), metadata.ino()) != self.identity
            }
            Err(_) => true,
        }
    }
}

impl std::fmt::Debug for FifoReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoReader")
            .field("path", &self.path)
            .finish()
    }
}

/// Write end of a FIFO.
pub struct FifoWriter {
    file: File,
    path: PathBuf,
}

impl FifoWriter {
    /// Open for writing, blocking until a reader attaches.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = loop {
            match OpenOptions::new().write(true).open(&path) {
                Ok(file) => break file,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(TransportError::Open {
                        path: path.clone(),
                        source: err,
                    })
                }
            }
        };
        Ok(Self { file, path })
    }

    /// Open for writing without blocking.
    ///
    /// Fails with [`TransportError::NoReader`] when nothing currently reads the FIFO.
    pub fn try_open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|err| {
                if err.raw_os_error() == Some(libc::ENXIO) {
                    TransportError::NoReader { path: path.clone() }
                } else {
                    TransportError::Open {
                        path: path.clone(),
                        source: err,
                    }
                }
            })?;
        Ok(Self { file, path })
    }

    /// Write `data` in a single `write(2)` so it cannot interleave with other writers.
    ///
    /// `data` must be at most [`PIPE_BUF`] bytes. On a writer opened with
    /// [`FifoWriter::try_open`] a full pipe yields [`TransportError::PipeFull`].
    pub fn write_atomic(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > PIPE_BUF {
            return Err(TransportError::WriteTooLarge {
                len: data.len(),
                max: PIPE_BUF,
            });
        }

        loop {
            match self.file.write(data) {
                Ok(n) if n == data.len() => return Ok(()),
                Ok(n) => {
                    return Err(TransportError::Io(io::Error::new(
                        ErrorKind::WriteZero,
                        format!("short fifo write ({n} of {} bytes)", data.len()),
                    )))
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Err(TransportError::PipeFull {
                        path: self.path.clone(),
                    })
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// The path this writer was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for FifoWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl std::fmt::Debug for FifoWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoWriter")
            .field("path", &self.path)
            .finish()
    }
}

fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is an open descriptor owned by `file` for the duration of both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above; only the O_NONBLOCK status flag is added.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
