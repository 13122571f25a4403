//! SIGINT behavior: the first interrupt drains the queue, the second kills
//! whatever is still running.

use crate::*;
use std::time::{Duration, Instant};

/// A compiler slow enough that we can interrupt mid-compile.  It only logs
/// after the sleep, so a killed compile leaves no log line.
fn slow_cc(seconds: u32) -> String {
    format!(
        "sleep {}\necho \"$2\" >> compile.log\ncat \"$2\" > \"$4\"\n",
        seconds
    )
}

fn sigint(child: &std::process::Child) {
    unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
}

#[test]
fn first_sigint_drains_gracefully() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    space.write("b.c", "BB")?;
    space.write("c.c", "CC")?;
    space.write("slowcc.sh", &slow_cc(2))?;
    space.write(
        "solution.json",
        r#"{
            "version": "1.0.0",
            "paths": { "scan": "src", "build": "build", "tmp": "tmp" },
            "files": ["a.c", "b.c", "c.c"],
            "builds": {
                "default": { "compiler": "sh slowcc.sh", "linker": "sh ld.sh" }
            }
        }"#,
    )?;

    let mut child = deltamake_command(vec!["-w", "1"])
        .current_dir(space.path())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    // Let the first compile get in flight, then ask for a graceful stop.
    std::thread::sleep(Duration::from_millis(800));
    sigint(&child);

    let status = child.wait()?;
    assert!(!status.success());
    // The in-flight compile finished; the queued ones never started.
    assert_eq!(space.compile_count(), 1);
    Ok(())
}

#[test]
fn second_sigint_kills_in_flight_compiles() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    // exec keeps the sleep on the recorded pid, so the SIGKILL lands on it
    // and the capture pipes close immediately.
    space.write("slowcc.sh", "exec sleep 10\n")?;
    space.write(
        "solution.json",
        r#"{
            "version": "1.0.0",
            "paths": { "scan": "src", "build": "build", "tmp": "tmp" },
            "files": ["a.c"],
            "builds": {
                "default": { "compiler": "sh slowcc.sh", "linker": "sh ld.sh" }
            }
        }"#,
    )?;

    let started = Instant::now();
    let mut child = deltamake_command(vec!["-w", "1"])
        .current_dir(space.path())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    std::thread::sleep(Duration::from_millis(800));
    sigint(&child);
    std::thread::sleep(Duration::from_millis(300));
    sigint(&child);

    let status = child.wait()?;
    assert!(!status.success());
    // Nowhere near the compiler's 10 second sleep: the child was killed.
    assert!(started.elapsed() < Duration::from_secs(8));
    assert_eq!(space.compile_count(), 0);
    Ok(())
}
