use crate::*;

#[test]
fn full_build() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    space.write("b.c", "BB")?;
    space.write("c.c", "CC")?;
    space.write_solution(&["a.c", "b.c", "c.c"], "")?;

    let out = space.run_expect(&mut deltamake_command(vec!["-w", "2"]))?;
    assert_output_contains(&out, "Done.");

    assert_eq!(space.compile_count(), 3);
    assert!(space.exists("tmp/default_a"));
    assert!(space.exists("tmp/default_b"));
    assert!(space.exists("tmp/default_c"));
    // The stub linker concatenates objects in source order.
    assert_eq!(space.read("build/out")?, "AABBCC");

    // The diff records each source's on-disk mtime.
    for src in ["a.c", "b.c", "c.c"] {
        assert_eq!(space.recorded_mtime("default", src), Some(space.mtime(src)));
    }
    Ok(())
}

#[test]
fn missing_source_warns_but_builds() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    space.write_solution(&["a.c", "ghost.c"], "")?;

    let out = space.run_expect(&mut deltamake_command(vec![]))?;
    assert_output_contains(&out, "ghost.c");
    assert_output_contains(&out, "does not exist");
    assert_eq!(space.compile_count(), 1);
    assert_eq!(space.read("build/out")?, "AA");
    Ok(())
}

#[test]
fn no_build_flag_exits_before_building() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    space.write_solution(&["a.c"], "")?;

    space.run_expect(&mut deltamake_command(vec!["-n"]))?;
    assert_eq!(space.compile_count(), 0);
    assert!(!space.exists("deltamake.json"));
    Ok(())
}

#[test]
fn unknown_build_name_fails() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    space.write_solution(&["a.c"], "")?;

    let out = space.run(&mut deltamake_command(vec!["release"]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "build not found");
    Ok(())
}

#[test]
fn missing_manifest_fails() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut deltamake_command(vec![]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "solution.json");
    Ok(())
}

#[test]
fn manifest_without_paths_names_the_key() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write(
        "solution.json",
        r#"{ "version": "1.0.0", "files": [], "builds": { "default": {} } }"#,
    )?;
    let out = space.run(&mut deltamake_command(vec![]))?;
    assert!(!out.status.success());
    assert_stderr_contains(&out, "value not set: paths");
    Ok(())
}

#[test]
fn help_prints_usage() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    let out = space.run(&mut deltamake_command(vec!["--help"]))?;
    assert!(out.status.success());
    assert_output_contains(&out, "Usage");
    Ok(())
}

#[test]
fn pre_and_post_hooks_run_synchronously() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    space.write_solution(
        &["a.c"],
        r#", "pre": "echo pre-ran >> hooks.log", "post": "echo post-ran >> hooks.log""#,
    )?;

    space.run_expect(&mut deltamake_command(vec![]))?;
    let hooks = space.read("hooks.log")?;
    assert_eq!(hooks, "pre-ran\npost-ran\n");
    Ok(())
}

#[test]
fn failing_pre_hook_aborts_the_build() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    space.write_solution(&["a.c"], r#", "pre": "exit 9""#)?;

    let out = space.run(&mut deltamake_command(vec![]))?;
    assert!(!out.status.success());
    assert_eq!(space.compile_count(), 0);
    Ok(())
}

#[test]
fn lib_build_archives_instead_of_linking() -> anyhow::Result<()> {
    let space = TestSpace::new()?;
    space.write("a.c", "AA")?;
    // The stub "archiver" records its full argument list.
    space.write("arch.sh", "echo \"$@\" > archive.log\n")?;
    space.write(
        "solution.json",
        r#"{
            "version": "1.0.0",
            "paths": { "scan": "src", "build": "build", "tmp": "tmp" },
            "files": ["a.c"],
            "builds": {
                "default": {
                    "compiler": "sh cc.sh",
                    "archiver": "sh arch.sh",
                    "type": "lib",
                    "outname": "libout.a"
                }
            }
        }"#,
    )?;

    let out = space.run_expect(&mut deltamake_command(vec![]))?;
    assert_output_contains(&out, "Archiving");
    let archive = space.read("archive.log")?;
    assert!(archive.starts_with("rcs "));
    assert!(archive.contains("libout.a"));
    assert!(archive.contains("default_a"));
    Ok(())
}
