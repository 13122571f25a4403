//! Terminal control and logging: cursor movement, size queries, colored
//! leveled output, and the synchronous command path used by build hooks.
//!
//! Everything here runs on the orchestrator/scheduler thread only; worker
//! threads never touch the terminal (their output is captured by Process
//! and printed here by the scheduler).

use std::cell::{Cell, RefCell};
use std::io::Write;

use anyhow::bail;

/// Log level.  Detail is suppressed unless verbose mode is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Detail,
    Warning,
    Error,
}

/// Output buffering mode for the terminal's stdout path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Buffering {
    /// Show only after flush().
    Full,
    /// Show after a newline.
    Line,
    /// Show immediately.
    None,
}

const SGR_RESET: &str = "\x1b[0m";
const SGR_RED: &str = "\x1b[0;31m";
const SGR_YELLOW: &str = "\x1b[0;33m";
const SGR_CYAN: &str = "\x1b[0;36m";

pub struct Terminal {
    verbose: bool,
    columns: Cell<usize>,
    rows: Cell<usize>,
    buffering: Cell<Buffering>,
    /// Pending stdout bytes, drained according to the buffering mode.
    pending: RefCell<Vec<u8>>,
}

impl Terminal {
    pub fn new(verbose: bool) -> Self {
        let term = Terminal {
            verbose,
            columns: Cell::new(80),
            rows: Cell::new(24),
            buffering: Cell::new(Buffering::Line),
            pending: RefCell::new(Vec::new()),
        };
        term.update_size();
        term
    }

    /// Re-query the terminal dimensions.  Keeps the previous (or default
    /// 80x24) values when stdout is not a tty or the size is degenerate.
    pub fn update_size(&self) {
        if let Some((cols, rows)) = query_size() {
            self.columns.set(cols);
            self.rows.set(rows);
        }
    }

    pub fn columns(&self) -> usize {
        self.columns.get()
    }

    pub fn rows(&self) -> usize {
        self.rows.get()
    }

    pub fn set_buffering(&self, mode: Buffering) {
        self.buffering.set(mode);
        if mode != Buffering::Full {
            self.flush();
        }
    }

    pub fn move_up(&self, n: usize) {
        if n > 0 {
            self.write(&format!("\x1b[{}A", n));
        }
    }

    pub fn move_down(&self, n: usize) {
        if n > 0 {
            self.write(&format!("\x1b[{}B", n));
        }
    }

    pub fn move_right(&self, n: usize) {
        if n > 0 {
            self.write(&format!("\x1b[{}C", n));
        }
    }

    pub fn move_left(&self, n: usize) {
        if n > 0 {
            self.write(&format!("\x1b[{}D", n));
        }
    }

    /// Clear from the cursor to the end of the screen.
    pub fn clear_down(&self) {
        self.write("\x1b[0J");
    }

    /// Clear from the cursor to the end of the line.
    pub fn clear_left(&self) {
        self.write("\x1b[0K");
    }

    pub fn show_cursor(&self, show: bool) {
        self.write(if show { "\x1b[?25h" } else { "\x1b[?25l" });
        self.flush();
    }

    pub fn write(&self, msg: &str) {
        self.write_bytes(msg.as_bytes());
    }

    fn write_bytes(&self, bytes: &[u8]) {
        let mut pending = self.pending.borrow_mut();
        pending.extend_from_slice(bytes);
        let flush = match self.buffering.get() {
            Buffering::Full => false,
            Buffering::Line => bytes.contains(&b'\n'),
            Buffering::None => true,
        };
        if flush {
            let _ = std::io::stdout().write_all(&pending);
            let _ = std::io::stdout().flush();
            pending.clear();
        }
    }

    pub fn flush(&self) {
        let mut pending = self.pending.borrow_mut();
        if !pending.is_empty() {
            let _ = std::io::stdout().write_all(&pending);
            pending.clear();
        }
        let _ = std::io::stdout().flush();
    }

    /// Log a message at the given level.  Detail messages are dropped unless
    /// verbose; errors go to stderr.  Colors are always reset afterward.
    pub fn log(&self, level: Level, msg: &str) {
        if level == Level::Detail && !self.verbose {
            return;
        }

        match level {
            Level::Error => {
                // Errors bypass the stdout buffer so ordering stays sane
                // when stdout is still holding overlay bytes.
                self.flush();
                let mut err = std::io::stderr();
                let _ = write!(err, "{}{}{}", SGR_RED, msg, SGR_RESET);
                let _ = err.flush();
            }
            Level::Warning => {
                self.write(SGR_YELLOW);
                self.write(msg);
                self.write(SGR_RESET);
            }
            Level::Detail => {
                self.write(SGR_CYAN);
                self.write(msg);
                self.write(SGR_RESET);
            }
            Level::Info => {
                self.write(msg);
            }
        }
    }

    /// Query the cursor position with a DSR (`ESC[6n`) round trip, switching
    /// stdin to raw mode for the reply and restoring it unconditionally.
    /// Returns (0, 0) when stdin is not a tty.
    pub fn cursor_position(&self) -> (usize, usize) {
        self.flush();
        query_cursor_position().unwrap_or((0, 0))
    }

    /// Run a command synchronously through `/bin/sh -c`, inheriting the
    /// terminal.  Used for pre/post hooks and the link step; the concurrent
    /// compile path goes through Process instead.
    pub fn exec_system(&self, cmd: &str) -> anyhow::Result<i32> {
        self.flush();
        let status = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(cmd)
            .status()?;
        let code = status.code().unwrap_or(-1);
        if code != 0 {
            bail!("command failed with status {}: {}", code, cmd);
        }
        Ok(code)
    }

    /// mtime of a path in whole seconds.
    pub fn last_modification_time(&self, path: &std::path::Path) -> std::io::Result<i64> {
        use std::os::unix::fs::MetadataExt;
        Ok(std::fs::metadata(path)?.mtime())
    }
}

fn query_size() -> Option<(usize, usize)> {
    unsafe {
        let mut winsize = std::mem::zeroed::<libc::winsize>();
        if libc::ioctl(1, libc::TIOCGWINSZ, &mut winsize) < 0 {
            return None;
        }
        if winsize.ws_col < 10 {
            // Ignore too-narrow widths, matching degenerate ptys.
            return None;
        }
        Some((winsize.ws_col as usize, winsize.ws_row as usize))
    }
}

fn query_cursor_position() -> Option<(usize, usize)> {
    unsafe {
        if libc::isatty(0) != 1 {
            return None;
        }

        let mut saved = std::mem::zeroed::<libc::termios>();
        if libc::tcgetattr(0, &mut saved) != 0 {
            return None;
        }

        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        if libc::tcsetattr(0, libc::TCSANOW, &raw) != 0 {
            return None;
        }

        let query = b"\x1b[6n";
        libc::write(1, query.as_ptr() as *const libc::c_void, query.len());

        // Reply is "ESC[<row>;<col>R".
        let mut buf = [0u8; 32];
        let mut len = 0;
        while len < buf.len() {
            let mut ch = 0u8;
            if libc::read(0, &mut ch as *mut u8 as *mut libc::c_void, 1) != 1 {
                break;
            }
            buf[len] = ch;
            len += 1;
            if ch == b'R' {
                break;
            }
        }

        libc::tcsetattr(0, libc::TCSANOW, &saved);

        parse_dsr_reply(&buf[..len])
    }
}

/// Parse a "ESC[<row>;<col>R" cursor position report into (x, y).
fn parse_dsr_reply(buf: &[u8]) -> Option<(usize, usize)> {
    let text = std::str::from_utf8(buf).ok()?;
    let body = text.rfind('[').map(|i| &text[i + 1..])?;
    let body = body.strip_suffix('R').unwrap_or(body);
    let (row, col) = body.split_once(';')?;
    Some((col.trim().parse().ok()?, row.trim().parse().ok()?))
}
