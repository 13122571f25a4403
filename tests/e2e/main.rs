//! Support code for e2e tests, which run deltamake as a binary inside a
//! temp dir with stub "compiler" shell scripts standing in for real tools.

mod basic;
mod interrupt;
mod subsolution;

pub fn deltamake_binary() -> std::path::PathBuf {
    std::env::current_exe()
        .expect("test binary path")
        .parent()
        .expect("test binary directory")
        .parent()
        .expect("binary directory")
        .join("deltamake")
}

pub fn deltamake_command(args: Vec<&str>) -> std::process::Command {
    let mut cmd = std::process::Command::new(deltamake_binary());
    cmd.args(args);
    cmd
}

fn print_output(out: &std::process::Output) {
    // Gross: use print! instead of writing to stdout so the Rust test
    // framework can capture it.
    print!("{}", String::from_utf8_lossy(&out.stdout));
    print!("{}", String::from_utf8_lossy(&out.stderr));
}

pub fn assert_output_contains(out: &std::process::Output, text: &str) {
    let stdout = String::from_utf8_lossy(&out.stdout);
    if !stdout.contains(text) {
        panic!(
            "assertion failed; expected output to contain {:?} but got:\n{}",
            text, stdout
        );
    }
}

pub fn assert_stderr_contains(out: &std::process::Output, text: &str) {
    let stderr = String::from_utf8_lossy(&out.stderr);
    if !stderr.contains(text) {
        panic!(
            "assertion failed; expected stderr to contain {:?} but got:\n{}",
            text, stderr
        );
    }
}

/// A "compiler" that logs the source it was given and copies it to the
/// output.  Invoked as `sh cc.sh -c "<src>" -o "<out>"`.
pub const CC_SCRIPT: &str = "echo \"$2\" >> compile.log\ncat \"$2\" > \"$4\"\n";

/// A compiler that fails with a diagnostic on stderr.
pub const FAIL_CC_SCRIPT: &str = "echo oops >&2\nexit 1\n";

/// A "linker" that concatenates its objects.  Invoked as
/// `sh ld.sh "<obj>"... -o "<out>"`.
pub const LD_SCRIPT: &str = "out=\"\"\nobjs=\"\"\nwhile [ $# -gt 0 ]; do\n  case \"$1\" in\n    -o) out=\"$2\"; shift 2 ;;\n    *) objs=\"$objs $1\"; shift ;;\n  esac\ndone\ncat $objs > \"$out\"\necho linked >> link.log\n";

/// Manages a temporary directory for invoking deltamake.
pub struct TestSpace {
    dir: tempfile::TempDir,
}

impl TestSpace {
    pub fn new() -> anyhow::Result<Self> {
        let space = TestSpace {
            dir: tempfile::tempdir()?,
        };
        space.write("cc.sh", CC_SCRIPT)?;
        space.write("ld.sh", LD_SCRIPT)?;
        Ok(space)
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Write a file into the working space.
    pub fn write(&self, path: &str, content: &str) -> std::io::Result<()> {
        std::fs::write(self.dir.path().join(path), content)
    }

    /// Read a file from the working space.
    pub fn read(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.dir.path().join(path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.dir.path().join(path).exists()
    }

    /// mtime of a file in the working space, in whole seconds.
    pub fn mtime(&self, path: &str) -> i64 {
        use std::os::unix::fs::MetadataExt;
        std::fs::metadata(self.dir.path().join(path))
            .expect("metadata")
            .mtime()
    }

    /// A minimal manifest over `files`, compiling with cc.sh and linking
    /// with ld.sh.
    pub fn write_solution(&self, files: &[&str], build_extra: &str) -> std::io::Result<()> {
        let file_list: Vec<String> = files.iter().map(|f| format!("\"{}\"", f)).collect();
        self.write(
            "solution.json",
            &format!(
                r#"{{
                    "version": "1.0.0",
                    "paths": {{ "scan": "src", "build": "build", "tmp": "tmp" }},
                    "files": [{}],
                    "builds": {{
                        "default": {{ "compiler": "sh cc.sh", "linker": "sh ld.sh"{} }}
                    }}
                }}"#,
                file_list.join(", "),
                build_extra
            ),
        )
    }

    /// Lines logged by cc.sh, one per compile invocation.
    pub fn compile_count(&self) -> usize {
        self.read("compile.log")
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    /// Parse the diff sidecar's recorded mtime for (build, source).
    pub fn recorded_mtime(&self, build: &str, source: &str) -> Option<i64> {
        let text = self.read("deltamake.json").ok()?;
        let value: serde_json::Value = serde_json::from_str(&text).ok()?;
        value["diff"][build][source].as_i64()
    }

    /// Invoke deltamake, returning process output.
    pub fn run(&self, cmd: &mut std::process::Command) -> std::io::Result<std::process::Output> {
        cmd.current_dir(self.dir.path()).output()
    }

    /// Like run, but also print output if the build failed.
    pub fn run_expect(
        &self,
        cmd: &mut std::process::Command,
    ) -> anyhow::Result<std::process::Output> {
        let out = self.run(cmd)?;
        if !out.status.success() {
            print_output(&out);
            anyhow::bail!("build failed, status {}", out.status);
        }
        Ok(out)
    }
}
