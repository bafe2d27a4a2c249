use std::io::{self, Read};
use std::time::Duration;

/// A byte source that can report readiness without blocking indefinitely.
///
/// Implementors are expected to return `ErrorKind::WouldBlock` from `read`
/// once the currently buffered bytes are exhausted, and `Ok(0)` once the
/// writer side has gone away.
pub trait PollRead: Read {
    /// Wait up to `timeout` for bytes (or end-of-stream) to become available.
    ///
    /// Returns `Ok(false)` when the timeout elapsed with nothing to read.
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// True when the endpoint this source was opened on no longer exists
    /// (removed or replaced on disk). Sources without a filesystem identity
    /// never detach.
    fn is_detached(&self) -> bool {
        false
    }
}

impl<T: PollRead + ?Sized> PollRead for &mut T {
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).poll_readable(timeout)
    }

    fn is_detached(&self) -> bool {
        (**self).is_detached()
    }
}

impl<T: PollRead + ?Sized> PollRead for Box<T> {
    fn poll_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        (**self).poll_readable(timeout)
    }

    fn is_detached(&self) -> bool {
        (**self).is_detached()
    }
}
