//! Subprocess execution with split capture of both standard streams.
//!
//! Commands run under `/bin/sh -c` with stdout and stderr redirected into
//! two pipes; the parent polls both pipes and accumulates the output into
//! string buffers that stay readable from other threads while the command
//! runs.  We don't use std::process here because the scheduler must be able
//! to SIGKILL an in-flight child from another thread and read its partial
//! output afterward.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use anyhow::bail;

/// Bytes read from a pipe per poll wakeup.
const POLL_BUFFER_SIZE: usize = 512;

fn check_posix(func: &str, ret: libc::c_int) -> anyhow::Result<libc::c_int> {
    if ret < 0 {
        bail!("{}: {}", func, std::io::Error::last_os_error());
    }
    Ok(ret)
}

fn close_fd(fd: &mut libc::c_int) {
    if *fd > 0 {
        unsafe { libc::close(*fd) };
        *fd = 0;
    }
}

/// A shell-wrapped child process and its captured output.
///
/// The pid and buffers are shared state: a worker thread owns the exec loop
/// while the scheduler thread may call kill() or read the buffers.
pub struct Process {
    pid: AtomicI32,
    out: Mutex<Vec<u8>>,
    err: Mutex<Vec<u8>>,
}

impl Process {
    pub fn new() -> Self {
        Process {
            pid: AtomicI32::new(0),
            out: Mutex::new(Vec::new()),
            err: Mutex::new(Vec::new()),
        }
    }

    pub fn out_buffer(&self) -> String {
        String::from_utf8_lossy(&self.out.lock().unwrap()).into_owned()
    }

    pub fn err_buffer(&self) -> String {
        String::from_utf8_lossy(&self.err.lock().unwrap()).into_owned()
    }

    fn fail(&self, diagnostic: &str) {
        let mut err = self.err.lock().unwrap();
        err.clear();
        err.extend_from_slice(diagnostic.as_bytes());
    }

    /// Run `cmdline` to completion, filling the output buffers as the child
    /// produces data.  Returns the child's exit status; anything that
    /// prevents obtaining one (pipe/fork/poll/read failure, child killed by
    /// a signal) is an error with a short diagnostic left in err_buffer.
    pub fn exec(&self, cmdline: &str) -> anyhow::Result<i32> {
        self.out.lock().unwrap().clear();
        self.err.lock().unwrap().clear();

        let mut out_pipe: [libc::c_int; 2] = [0; 2];
        let mut err_pipe: [libc::c_int; 2] = [0; 2];

        // The child only calls async-signal-safe functions, so all
        // allocation happens before the fork.
        let cmdline_nul = match std::ffi::CString::new(cmdline) {
            Ok(s) => s,
            Err(_) => {
                self.fail("command contains NUL");
                bail!("command contains NUL");
            }
        };
        let shell = b"/bin/sh\0".as_ptr() as *const libc::c_char;
        let dash_c = b"-c\0".as_ptr() as *const libc::c_char;
        let argv: [*const libc::c_char; 4] =
            [shell, dash_c, cmdline_nul.as_ptr(), std::ptr::null()];

        unsafe {
            if libc::pipe(out_pipe.as_mut_ptr()) < 0 {
                self.fail("pipe(out) failed");
                bail!("pipe: {}", std::io::Error::last_os_error());
            }
            if libc::pipe(err_pipe.as_mut_ptr()) < 0 {
                self.fail("pipe(err) failed");
                close_fd(&mut out_pipe[0]);
                close_fd(&mut out_pipe[1]);
                bail!("pipe: {}", std::io::Error::last_os_error());
            }

            let pid = libc::fork();
            if pid < 0 {
                self.fail("fork() failed");
                close_fd(&mut out_pipe[0]);
                close_fd(&mut out_pipe[1]);
                close_fd(&mut err_pipe[0]);
                close_fd(&mut err_pipe[1]);
                bail!("fork: {}", std::io::Error::last_os_error());
            }

            if pid == 0 {
                // Child.  Mask SIGINT so Ctrl-C targets deltamake, not the
                // compilers; redirect both streams into the pipes; exec.
                let mut sa: libc::sigaction = std::mem::zeroed();
                sa.sa_sigaction = libc::SIG_IGN;
                if libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut()) == -1 {
                    libc::_exit(127);
                }

                libc::close(out_pipe[0]);
                libc::close(err_pipe[0]);
                if libc::dup2(out_pipe[1], 1) < 0 || libc::dup2(err_pipe[1], 2) < 0 {
                    libc::_exit(127);
                }
                libc::close(out_pipe[1]);
                libc::close(err_pipe[1]);

                libc::execv(shell, argv.as_ptr());
                libc::_exit(127);
            }

            // Parent.
            self.pid.store(pid, Ordering::SeqCst);
            close_fd(&mut out_pipe[1]);
            close_fd(&mut err_pipe[1]);

            let result = self.capture(out_pipe[0], err_pipe[0]);

            let mut status: libc::c_int = 0;
            let reaped = loop {
                let r = libc::waitpid(pid, &mut status, 0);
                let interrupted = r == -1
                    && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR);
                if !interrupted {
                    break r;
                }
            };
            self.pid.store(0, Ordering::SeqCst);
            close_fd(&mut out_pipe[0]);
            close_fd(&mut err_pipe[0]);

            result?;
            check_posix("waitpid", reaped)?;

            if !libc::WIFEXITED(status) {
                self.fail("child did not exit normally");
                bail!("child did not exit normally");
            }

            Ok(libc::WEXITSTATUS(status))
        }
    }

    /// Poll both pipe read ends until the stdout end hangs up, appending
    /// whatever arrives to the matching buffer.
    fn capture(&self, out_fd: libc::c_int, err_fd: libc::c_int) -> anyhow::Result<()> {
        let mut pfds = [
            libc::pollfd {
                fd: out_fd,
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: err_fd,
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        loop {
            let ready = unsafe { libc::poll(pfds.as_mut_ptr(), 2, -1) };
            if ready < 0 {
                if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                self.fail("poll() failed");
                bail!("poll() failed");
            }

            // The stdout end decides when we're done; stderr is best-effort.
            if !self.drain(&pfds[0], &self.out)? {
                self.sweep_stderr(pfds[1].fd);
                return Ok(());
            }
            if !self.drain(&pfds[1], &self.err)? {
                // Stop polling a hung-up stderr so we don't spin.
                pfds[1].fd = -1;
            }
        }
    }

    /// Non-blocking pickup of stderr bytes still pending when stdout hangs
    /// up, so a diagnostic written right before exit isn't lost to event
    /// coalescing.
    fn sweep_stderr(&self, err_fd: libc::c_int) {
        loop {
            let mut pfd = libc::pollfd {
                fd: err_fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ready = unsafe { libc::poll(&mut pfd, 1, 0) };
            if ready <= 0 || pfd.revents & libc::POLLIN == 0 {
                return;
            }
            let mut chunk = [0u8; POLL_BUFFER_SIZE];
            let n = unsafe {
                libc::read(pfd.fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len())
            };
            if n <= 0 {
                return;
            }
            self.err.lock().unwrap().extend_from_slice(&chunk[..n as usize]);
        }
    }

    /// Service one pollfd: on POLLIN, read a chunk into `buf`.  Returns
    /// false once the fd reports only POLLERR/POLLHUP.
    fn drain(&self, pfd: &libc::pollfd, buf: &Mutex<Vec<u8>>) -> anyhow::Result<bool> {
        if pfd.revents == 0 {
            return Ok(true);
        }
        if pfd.revents & libc::POLLIN != 0 {
            let mut chunk = [0u8; POLL_BUFFER_SIZE];
            let n = unsafe {
                libc::read(pfd.fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len())
            };
            if n < 0 {
                self.fail("read() failed");
                bail!("read() failed");
            }
            if n > 0 {
                buf.lock().unwrap().extend_from_slice(&chunk[..n as usize]);
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// SIGKILL the child, if one is currently running.
    pub fn kill(&self) {
        let pid = self.pid.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe { libc::kill(pid, libc::SIGKILL) };
        }
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}
