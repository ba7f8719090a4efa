//! Scoped suppression of process-level stdout and stderr
//!
//! Some estimator backends write progress chatter straight to the C streams
//! during construction, bypassing Rust's `print!` machinery. The guard here
//! swaps file descriptors 1 and 2 for `/dev/null` and swaps them back when
//! dropped, unwinding included, so a noisy build stays quiet without losing
//! either stream.

pub use imp::StreamSilencer;

#[cfg(unix)]
mod imp {
    use std::io::Write;

    use crate::error::{ForecastError, Result};

    /// RAII guard over the swapped descriptors. Restoration happens in
    /// `Drop`, so it also runs when the silenced scope panics.
    #[derive(Debug)]
    pub struct StreamSilencer {
        saved_stdout: libc::c_int,
        saved_stderr: libc::c_int,
        null_fd: libc::c_int,
    }

    fn os_err(op: &str) -> ForecastError {
        let source = std::io::Error::last_os_error();
        ForecastError::Io(std::io::Error::new(
            source.kind(),
            format!("{op} failed: {source}"),
        ))
    }

    impl StreamSilencer {
        /// Redirect both standard streams into `/dev/null`.
        pub fn engage() -> Result<StreamSilencer> {
            // Pending Rust-side buffers belong on the real streams.
            let _ = std::io::stdout().flush();
            let _ = std::io::stderr().flush();

            // SAFETY: plain descriptor syscalls; every fd acquired here is
            // owned by the guard and released in Drop.
            unsafe {
                let null_fd = libc::open(
                    b"/dev/null\0".as_ptr() as *const libc::c_char,
                    libc::O_RDWR,
                );
                if null_fd < 0 {
                    return Err(os_err("open /dev/null"));
                }
                let saved_stdout = libc::dup(1);
                if saved_stdout < 0 {
                    let err = os_err("save stdout descriptor");
                    libc::close(null_fd);
                    return Err(err);
                }
                let saved_stderr = libc::dup(2);
                if saved_stderr < 0 {
                    let err = os_err("save stderr descriptor");
                    libc::close(null_fd);
                    libc::close(saved_stdout);
                    return Err(err);
                }
                if libc::dup2(null_fd, 1) < 0 || libc::dup2(null_fd, 2) < 0 {
                    let err = os_err("redirect standard streams");
                    libc::dup2(saved_stdout, 1);
                    libc::dup2(saved_stderr, 2);
                    libc::close(null_fd);
                    libc::close(saved_stdout);
                    libc::close(saved_stderr);
                    return Err(err);
                }
                Ok(StreamSilencer {
                    saved_stdout,
                    saved_stderr,
                    null_fd,
                })
            }
        }
    }

    impl Drop for StreamSilencer {
        fn drop(&mut self) {
            // Anything still buffered was written while silenced; flush it
            // into the null device before the real streams come back.
            let _ = std::io::stdout().flush();
            let _ = std::io::stderr().flush();
            // SAFETY: restores the descriptors saved in engage and closes
            // every fd this guard owns.
            unsafe {
                libc::dup2(self.saved_stdout, 1);
                libc::dup2(self.saved_stderr, 2);
                libc::close(self.saved_stdout);
                libc::close(self.saved_stderr);
                libc::close(self.null_fd);
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use crate::error::Result;

    /// No-op stand-in for platforms without POSIX descriptors.
    #[derive(Debug)]
    pub struct StreamSilencer;

    impl StreamSilencer {
        pub fn engage() -> Result<StreamSilencer> {
            Ok(StreamSilencer)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::sync::Mutex;

    use super::StreamSilencer;

    // The guards swap process-global descriptors, so these tests cannot
    // overlap with each other.
    static GATE: Mutex<()> = Mutex::new(());

    fn identity_of(fd: libc::c_int) -> (u64, u64) {
        // SAFETY: fstat on a descriptor the test already holds open.
        unsafe {
            let mut st: libc::stat = std::mem::zeroed();
            assert_eq!(libc::fstat(fd, &mut st), 0);
            (st.st_dev as u64, st.st_ino as u64)
        }
    }

    #[test]
    fn test_streams_point_at_null_while_engaged() {
        let _serial = GATE.lock().unwrap();
        let null = std::fs::File::open("/dev/null").unwrap();
        let null_identity = identity_of(null.as_raw_fd());
        let stdout_before = identity_of(1);
        let stderr_before = identity_of(2);

        {
            let _quiet = StreamSilencer::engage().unwrap();
            assert_eq!(identity_of(1), null_identity);
            assert_eq!(identity_of(2), null_identity);
            let mut out = std::io::stdout();
            assert!(writeln!(out, "swallowed").is_ok());
            assert!(out.flush().is_ok());
        }

        assert_eq!(identity_of(1), stdout_before);
        assert_eq!(identity_of(2), stderr_before);
    }

    #[test]
    fn test_streams_restore_after_panic() {
        let _serial = GATE.lock().unwrap();
        let stdout_before = identity_of(1);
        let outcome = std::panic::catch_unwind(|| {
            let _quiet = StreamSilencer::engage().unwrap();
            panic!("construction blew up");
        });
        assert!(outcome.is_err());
        assert_eq!(identity_of(1), stdout_before);
    }

    #[test]
    fn test_guards_nest_and_unwind_in_order() {
        let _serial = GATE.lock().unwrap();
        let stdout_before = identity_of(1);
        {
            let _outer = StreamSilencer::engage().unwrap();
            {
                let _inner = StreamSilencer::engage().unwrap();
            }
            // Inner drop put the outer redirection back, which is still null.
            let null = std::fs::File::open("/dev/null").unwrap();
            assert_eq!(identity_of(1), identity_of(null.as_raw_fd()));
        }
        assert_eq!(identity_of(1), stdout_before);
    }
}
