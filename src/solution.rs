//! Solution loading: the manifest, the collected source set, and the diff
//! sidecar that drives incremental rebuild decisions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context as _};

use crate::build::Build;
use crate::manifest::{BuildConfig, DiffFile, Manifest};
use crate::plugin::Registry;
use crate::terminal::{Level, Terminal};

/// Shared orchestrator context threaded through loading and build phases.
pub struct Context<'a> {
    pub terminal: &'a Terminal,
    pub registry: &'a Registry,
    /// Ignore recorded diffs and rebuild everything.
    pub force: bool,
}

/// A declared source file that exists on disk.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    /// On-disk mtime in whole seconds, captured at load time.
    pub mtime: i64,
}

#[derive(Debug)]
pub struct Solution {
    /// Directory containing the manifest; all relative paths hang off it.
    pub current_path: PathBuf,
    pub source_paths: Vec<PathBuf>,
    pub build_path: PathBuf,
    pub tmp_path: PathBuf,
    /// Relative path (the manifest/diff key) to source file, in manifest
    /// iteration order.
    pub sources: BTreeMap<String, SourceFile>,
    /// Sub-solution code names to relative paths.
    pub sub_solutions: BTreeMap<String, String>,
    pub builds: BTreeMap<String, BuildConfig>,
    /// In-memory mirror of the diff sidecar.
    pub diff: DiffFile,
    /// Plugin key from the manifest; "default" when unset.
    pub type_name: String,
}

impl Solution {
    /// Load a solution manifest.  Requiredness is checked here so missing
    /// or mistyped keys fail with their dotted path named.
    pub fn load(path: &Path, ctx: &Context) -> anyhow::Result<Solution> {
        let terminal = ctx.terminal;
        terminal.log(
            Level::Detail,
            &format!("Loading solution \"{}\"...\n", path.display()),
        );

        let text = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("can't open \"{}\": {}", path.display(), err))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .with_context(|| format!("can't parse \"{}\"", path.display()))?;

        let current_path = path
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        terminal.log(
            Level::Detail,
            &format!("Absolute path: \"{}\"\n", current_path.display()),
        );

        let version = manifest.version.ok_or_else(|| anyhow!("value not set: version"))?;
        terminal.log(Level::Detail, &format!("Solution version: {}\n", version));

        let type_name = match manifest.solution_type {
            Some(name) => {
                terminal.log(Level::Detail, &format!("Solution type: {}\n", name));
                if ctx.registry.get(&name).is_none() {
                    bail!("solution type \"{}\" is unknown", name);
                }
                name
            }
            None => {
                terminal.log(
                    Level::Detail,
                    "Solution type is not set. Default value is used.\n",
                );
                "default".to_string()
            }
        };

        let paths = manifest.paths.ok_or_else(|| anyhow!("value not set: paths"))?;
        let scan = paths
            .scan
            .ok_or_else(|| anyhow!("value not set: paths.scan"))?;
        let source_paths: Vec<PathBuf> = scan
            .roots()
            .iter()
            .map(|root| current_path.join(root))
            .collect();
        for root in &source_paths {
            terminal.log(Level::Detail, &format!("Scan path: \"{}\"\n", root.display()));
        }

        let build_path = current_path.join(
            paths
                .build
                .ok_or_else(|| anyhow!("value not set: paths.build"))?,
        );
        terminal.log(
            Level::Detail,
            &format!("Build path: \"{}\"\n", build_path.display()),
        );

        let tmp_path = current_path.join(
            paths.tmp.ok_or_else(|| anyhow!("value not set: paths.tmp"))?,
        );
        terminal.log(
            Level::Detail,
            &format!("Temporary path: \"{}\"\n", tmp_path.display()),
        );

        let sub_solutions = manifest.solutions.unwrap_or_default();
        for (code, rel) in &sub_solutions {
            terminal.log(Level::Detail, &format!("Sub solution \"{}\" -> \"{}\"\n", code, rel));
        }

        let files = manifest.files.ok_or_else(|| anyhow!("value not set: files"))?;
        let mut sources = BTreeMap::new();
        for rel in files {
            let full = current_path.join(&rel);
            if !full.exists() {
                // A declared-but-absent source is not fatal.
                terminal.log(
                    Level::Warning,
                    &format!("File \"{}\" does not exist!..\n", full.display()),
                );
                continue;
            }
            let mtime = terminal.last_modification_time(&full)?;
            sources.insert(rel, SourceFile { path: full, mtime });
        }

        let builds = manifest
            .builds
            .ok_or_else(|| anyhow!("value not set: builds"))?;
        for name in builds.keys() {
            terminal.log(Level::Detail, &format!("Build \"{}\"\n", name));
        }

        Ok(Solution {
            current_path,
            source_paths,
            build_path,
            tmp_path,
            sources,
            sub_solutions,
            builds,
            diff: DiffFile::new(),
            type_name,
        })
    }

    /// Load the diff sidecar; a missing or unreadable file just means a
    /// full rebuild, not an error.
    pub fn load_diff(&mut self, path: &Path, terminal: &Terminal) -> bool {
        terminal.log(
            Level::Detail,
            &format!("Loading diff \"{}\"...\n", path.display()),
        );

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                terminal.log(
                    Level::Detail,
                    &format!("Can't open \"{}\". Ignoring..\n", path.display()),
                );
                return false;
            }
        };

        let diff: DiffFile = match serde_json::from_str(&text) {
            Ok(diff) => diff,
            Err(err) => {
                terminal.log(
                    Level::Error,
                    &format!("Can't parse diff \"{}\": {}\n", path.display(), err),
                );
                return false;
            }
        };

        if diff.version.is_empty() {
            terminal.log(Level::Error, "Can't get diff version\n");
            return false;
        }
        terminal.log(Level::Detail, &format!("Diff version: {}\n", diff.version));

        self.diff = diff;
        true
    }

    pub fn save_diff(&self, path: &Path, terminal: &Terminal) -> anyhow::Result<()> {
        terminal.log(
            Level::Detail,
            &format!("Saving diff \"{}\"...\n", path.display()),
        );
        let text = serde_json::to_string_pretty(&self.diff)?;
        std::fs::write(path, text)
            .with_context(|| format!("write \"{}\"", path.display()))?;
        Ok(())
    }

    /// Instantiate a build profile, recursively loading its sub-solutions.
    pub fn gen_build(&self, name: &str, ctx: &Context) -> anyhow::Result<Build> {
        let config = self
            .builds
            .get(name)
            .ok_or_else(|| anyhow!("build not found: \"{}\"", name))?
            .clone();
        Build::new(self, name, config, ctx)
    }

    /// Scan the configured roots for sources, per the solution type.
    pub fn scan_folders(&mut self, ctx: &Context) -> anyhow::Result<()> {
        let plugin = ctx
            .registry
            .get(&self.type_name)
            .ok_or_else(|| anyhow!("solution type \"{}\" is unknown", self.type_name))?;
        plugin.scan_folders(self, ctx.terminal)
    }
}
