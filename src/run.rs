//! CLI entry: wires the terminal, plugin registry, scheduler, and root
//! solution together and drives the build lifecycle.

use std::path::Path;

use crate::manifest::{DIFF_FILENAME, SOLUTION_FILENAME};
use crate::plugin::Registry;
use crate::scheduler::{Outcome, Scheduler, TaskList};
use crate::solution::{Context, Solution};
use crate::terminal::{Level, Terminal};

#[derive(argh::FromArgs)]
/// DeltaMake, an incremental build orchestrator.
struct Opts {
    /// enable verbose logging
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// don't build anything (useful with --scan)
    #[argh(switch, short = 'n')]
    no_build: bool,

    /// force rebuild of all solutions (ignore recorded diffs)
    #[argh(switch, short = 'f')]
    force: bool,

    /// don't save the differential file
    #[argh(switch, short = 'd')]
    dont_save_diff: bool,

    /// scan solution folders for source files
    #[argh(switch, short = 's')]
    scan: bool,

    /// max number of workers [default: cpu count]
    #[argh(option, short = 'w')]
    workers: Option<usize>,

    /// build names; "default" when empty
    #[argh(positional)]
    builds: Vec<String>,
}

fn effective_workers(requested: Option<usize>, cores: usize) -> usize {
    match requested {
        Some(n) => n.max(1),
        None => cores.max(1),
    }
}

pub fn run() -> anyhow::Result<i32> {
    let opts: Opts = argh::from_env();

    let terminal = Terminal::new(opts.verbose);
    terminal.log(
        Level::Info,
        &format!("DeltaMake v{}\n", env!("CARGO_PKG_VERSION")),
    );
    terminal.log(
        Level::Detail,
        &format!("Terminal: {}x{}\n", terminal.columns(), terminal.rows()),
    );

    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let n_workers = effective_workers(opts.workers, cores);
    terminal.log(
        Level::Detail,
        &format!("CPU cores: {}, workers: {}\n", cores, n_workers),
    );

    let registry = Registry::with_builtins();
    for name in registry.names() {
        terminal.log(
            Level::Detail,
            &format!("Solution plugin loaded: {}\n", name),
        );
    }

    let mut scheduler = Scheduler::new(&terminal, n_workers);
    let ctx = Context {
        terminal: &terminal,
        registry: &registry,
        force: opts.force,
    };

    let mut root = Solution::load(Path::new(SOLUTION_FILENAME), &ctx)?;

    if opts.scan {
        root.scan_folders(&ctx)?;
    }

    if opts.no_build {
        return Ok(0);
    }

    if !opts.force {
        root.load_diff(Path::new(DIFF_FILENAME), &terminal);
    }

    let build_names: Vec<String> = if opts.builds.is_empty() {
        terminal.log(Level::Detail, "No builds set. Default value is used.\n");
        vec!["default".to_string()]
    } else {
        opts.builds
    };

    let mut builders = Vec::new();
    for name in &build_names {
        terminal.log(Level::Detail, &format!("Selected build: \"{}\"\n", name));
        builders.push(root.gen_build(name, &ctx)?);
    }

    for build in &mut builders {
        build.pre_build(&root, &ctx)?;
        build.build(&mut root, &mut scheduler, &ctx);
    }

    if scheduler.task_count() == 0 {
        terminal.log(Level::Info, "Nothing to do.\n");
        return Ok(0);
    }

    let outcome = scheduler.start();

    // Linking after a failed or interrupted run would only cascade errors;
    // the diff is still saved so it reflects what was scheduled.
    if outcome == Outcome::Success {
        for build in &mut builders {
            build.post_build(&mut root, &ctx)?;
        }
    }

    if !opts.dont_save_diff {
        root.save_diff(Path::new(DIFF_FILENAME), &terminal)?;
    }

    match outcome {
        Outcome::Success => {
            terminal.log(Level::Info, "Done.\n");
            Ok(0)
        }
        Outcome::Interrupted => {
            terminal.log(Level::Warning, "Interrupted.\n");
            Ok(1)
        }
        Outcome::Failed => Ok(1),
    }
}
