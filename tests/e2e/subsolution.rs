use crate::*;

/// Parent solution with one sub-solution.  The sub's scripts are shared by
/// running everything from the parent directory (deltamake's cwd), but the
/// sub keeps its own manifest and diff sidecar.
fn write_pair(space: &TestSpace) -> anyhow::Result<()> {
    space.write("main.c", "MM")?;
    space.write(
        "solution.json",
        r#"{
            "version": "1.0.0",
            "paths": { "scan": "src", "build": "build", "tmp": "tmp" },
            "solutions": { "core": "core" },
            "files": ["main.c"],
            "builds": {
                "default": {
                    "compiler": "sh cc.sh",
                    "linker": "sh ld.sh",
                    "solutions": { "core": {} }
                }
            }
        }"#,
    )?;

    std::fs::create_dir_all(space.path().join("core"))?;
    space.write("core/core.c", "KK")?;
    space.write(
        "core/solution.json",
        r#"{
            "version": "1.0.0",
            "paths": { "scan": "src", "build": "build", "tmp": "tmp" },
            "files": ["core.c"],
            "builds": {
                "default": { "compiler": "sh cc.sh", "linker": "sh ld.sh" }
            }
        }"#,
    )?;
    Ok(())
}

#[test]
fn sub_compiles_before_the_parent() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    write_pair(&space)?;

    let out = space.run_expect(&mut deltamake_command(vec!["-w", "1"]))?;
    assert_output_contains(&out, "Done.");

    // One worker runs the queue in order: the sub's compile is enqueued
    // before the parent's.
    let log = space.read("compile.log")?;
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("core.c"));
    assert!(lines[1].ends_with("main.c"));

    // Sub objects land in the parent's tmp dir; each solution keeps its
    // own diff sidecar.
    assert!(space.exists("tmp/default_core"));
    assert!(space.exists("tmp/default_main"));
    assert!(space.exists("core/deltamake.json"));
    assert_eq!(space.recorded_mtime("default", "main.c"), Some(space.mtime("main.c")));

    let sub_diff: serde_json::Value =
        serde_json::from_str(&space.read("core/deltamake.json")?)?;
    assert_eq!(
        sub_diff["diff"]["default"]["core.c"].as_i64(),
        Some(space.mtime("core/core.c"))
    );

    assert!(space.exists("build/out"));
    Ok(())
}

#[test]
fn stale_sub_forces_parent_relink() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    write_pair(&space)?;

    space.run_expect(&mut deltamake_command(vec!["-w", "1"]))?;
    assert_eq!(space.compile_count(), 2);
    let links_after_first = space.read("link.log")?.lines().count();

    // Age the sub's recorded mtime so only core.c looks stale.
    space.write(
        "core/deltamake.json",
        &format!(
            "{{ \"version\": \"3.0.0\", \"diff\": {{ \"default\": {{ \"core.c\": {} }} }} }}",
            space.mtime("core/core.c") - 10
        ),
    )?;

    space.run_expect(&mut deltamake_command(vec!["-w", "1"]))?;
    // Only the sub recompiled, but the parent relinked anyway.
    assert_eq!(space.compile_count(), 3);
    assert!(space.read("link.log")?.lines().count() > links_after_first);
    Ok(())
}
