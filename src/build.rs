//! Build phases for one profile of a solution: directory setup and the pre
//! hook, stale-source compile commands fed to the scheduler, and the final
//! link/archive plus the post hook.
//!
//! Sub-solutions are instantiated when the build is, and every phase
//! recurses into them first; a sub that compiles anything forces the parent
//! to relink.

use std::path::PathBuf;

use anyhow::{anyhow, bail};

use crate::manifest::{BuildConfig, DIFF_FILENAME, SOLUTION_FILENAME};
use crate::scheduler::TaskList;
use crate::solution::{Context, Solution};
use crate::task::MAX_TITLE;
use crate::terminal::Level;

#[derive(Debug)]
struct SubBuild {
    path: PathBuf,
    solution: Solution,
    build: Build,
}

#[derive(Debug)]
pub struct Build {
    name: String,
    config: BuildConfig,
    /// Set once any compile command is scheduled (here or in a sub).
    needs_link: bool,
    /// Every object of this build, up to date or not; the link consumes all.
    objects: Vec<PathBuf>,
    subs: Vec<SubBuild>,
}

impl Build {
    pub fn new(
        solution: &Solution,
        name: &str,
        config: BuildConfig,
        ctx: &Context,
    ) -> anyhow::Result<Build> {
        let terminal = ctx.terminal;

        let mut subs = Vec::new();
        if let Some(sub_refs) = &config.solutions {
            for (code, params) in sub_refs {
                let rel = solution
                    .sub_solutions
                    .get(code)
                    .ok_or_else(|| anyhow!("codename not found: \"{}\"", code))?;
                let sub_path = solution.current_path.join(rel);

                let mut sub_solution =
                    Solution::load(&sub_path.join(SOLUTION_FILENAME), ctx)?;
                // Sub artifacts land in the parent's output directories.
                sub_solution.build_path = solution.build_path.clone();
                sub_solution.tmp_path = solution.tmp_path.clone();

                let sub_name = match &params.build {
                    Some(name) => name.clone(),
                    None => {
                        terminal.log(
                            Level::Detail,
                            "Sub build is not set. Default value is used.\n",
                        );
                        "default".to_string()
                    }
                };

                let sub_build = sub_solution.gen_build(&sub_name, ctx)?;

                if !ctx.force {
                    sub_solution.load_diff(&sub_path.join(DIFF_FILENAME), terminal);
                }

                subs.push(SubBuild {
                    path: sub_path,
                    solution: sub_solution,
                    build: sub_build,
                });
            }
        }

        Ok(Build {
            name: name.to_string(),
            config,
            needs_link: false,
            objects: Vec::new(),
            subs,
        })
    }

    pub fn needs_link(&self) -> bool {
        self.needs_link
    }

    /// Ensure output directories exist, recurse, then run the pre hook.
    pub fn pre_build(&mut self, solution: &Solution, ctx: &Context) -> anyhow::Result<()> {
        let terminal = ctx.terminal;

        if !solution.build_path.exists() {
            terminal.log(
                Level::Detail,
                "Build directory does not exist. Creating...\n",
            );
            std::fs::create_dir_all(&solution.build_path)?;
        }
        if !solution.tmp_path.exists() {
            terminal.log(
                Level::Detail,
                "Temporary directory does not exist. Creating...\n",
            );
            std::fs::create_dir_all(&solution.tmp_path)?;
        }

        for sub in &mut self.subs {
            sub.build.pre_build(&sub.solution, ctx)?;
        }

        if let Some(pre) = &self.config.pre {
            terminal.log(Level::Detail, &format!("Pre build command: \"{}\"\n", pre));
            terminal.exec_system(pre)?;
        }

        Ok(())
    }

    /// Queue a compile command for every stale source, recording the new
    /// mtime in the diff as each command is scheduled.  Returns how many
    /// commands this build (not its subs) queued.
    pub fn build(
        &mut self,
        solution: &mut Solution,
        list: &mut dyn TaskList,
        ctx: &Context,
    ) -> usize {
        let terminal = ctx.terminal;

        for sub in &mut self.subs {
            if sub.build.build(&mut sub.solution, list, ctx) != 0 {
                // Fresh sub objects mean our artifact is stale too.
                self.needs_link = true;
            }
        }

        let prefix = self.compile_prefix();

        let build_diff = solution
            .diff
            .diff
            .entry(self.name.clone())
            .or_default();

        let mut queued = 0;
        for (key, file) in &solution.sources {
            let stem = file
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| key.clone());
            let out_path = solution.tmp_path.join(format!("{}_{}", self.name, stem));
            self.objects.push(out_path.clone());

            if let Some(&recorded) = build_diff.get(key) {
                if recorded >= file.mtime {
                    continue;
                }
            }

            self.needs_link = true;
            queued += 1;
            // Recorded at dispatch time, not completion: a failed compile
            // will look up to date on the next run.
            build_diff.insert(key.clone(), file.mtime);

            let mut title = stem;
            if title.len() >= MAX_TITLE {
                title.truncate(MAX_TITLE - 1);
            }

            let cmd = format!(
                "{}\"{}\" -o \"{}\"",
                prefix,
                file.path.display(),
                out_path.display()
            );
            terminal.log(Level::Detail, &format!("\t{}\n", cmd));

            list.add_command(&title, cmd, true);
        }

        queued
    }

    /// Recurse (persisting sub diffs), then link or archive if anything
    /// changed, then run the post hook.
    pub fn post_build(&mut self, solution: &mut Solution, ctx: &Context) -> anyhow::Result<()> {
        let terminal = ctx.terminal;

        for sub in &mut self.subs {
            sub.build.post_build(&mut sub.solution, ctx)?;
            if !ctx.force {
                sub.solution
                    .save_diff(&sub.path.join(DIFF_FILENAME), terminal)?;
            }
        }

        if !self.needs_link {
            terminal.log(Level::Detail, "Nothing to link.\n");
            return Ok(());
        }

        let artifact = self.config.artifact.as_deref().unwrap_or("exec");
        let outname = self.config.outname.as_deref().unwrap_or("out");
        let out_path = solution.build_path.join(outname);
        let target_name = solution
            .current_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let cmd = match artifact {
            "lib" => {
                terminal.log(Level::Info, &format!("Archiving \"{}\"...\n", target_name));
                let archiver = self.config.archiver.as_deref().unwrap_or("ar");
                let mut cmd = format!("{} rcs \"{}\" ", archiver, out_path.display());
                for object in &self.objects {
                    cmd += &format!("\"{}\" ", object.display());
                }
                cmd
            }
            "exec" => {
                terminal.log(Level::Info, &format!("Linking \"{}\"...\n", target_name));
                let linker = self.config.linker.as_deref().unwrap_or("g++");
                let mut cmd = format!("{} ", linker);
                if let Some(flags) = &self.config.linker_flags {
                    cmd += &format!("{} ", flags);
                }
                for object in &self.objects {
                    cmd += &format!("\"{}\" ", object.display());
                }
                if let Some(libs) = &self.config.static_libs {
                    for lib in libs {
                        cmd += &format!("\"{}\" ", lib);
                    }
                }
                cmd += &format!("-o \"{}\"", out_path.display());
                cmd
            }
            other => bail!("unknown build type \"{}\"", other),
        };

        terminal.log(Level::Detail, &format!("Command:\n\t{}\n", cmd));
        terminal.exec_system(&cmd)?;

        if let Some(post) = &self.config.post {
            terminal.log(Level::Detail, &format!("Post build command: \"{}\"\n", post));
            terminal.exec_system(post)?;
        }

        Ok(())
    }

    /// Everything of the compile command up to the source path:
    /// `<compiler> <flags> -I... -L... -D... -c `.
    fn compile_prefix(&self) -> String {
        let mut prefix = format!("{} ", self.config.compiler.as_deref().unwrap_or("g++"));

        if let Some(flags) = &self.config.compiler_flags {
            prefix += &format!("{} ", flags);
        }

        if let Some(paths) = &self.config.paths {
            if let Some(includes) = &paths.include {
                for include in includes {
                    prefix += &format!("-I\"{}\" ", include);
                }
            }
            if let Some(libs) = &paths.lib {
                for lib in libs {
                    prefix += &format!("-L\"{}\" ", lib);
                }
            }
        }

        if let Some(defines) = &self.config.defines {
            for define in defines {
                prefix += &format!("-D\"{}\" ", define);
            }
        }

        prefix += "-c ";
        prefix
    }
}
