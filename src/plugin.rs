//! Solution-type plugins.
//!
//! The manifest's `type` key selects one of the registered solution types;
//! the registry is populated once at startup and consulted by the loader.
//! Dynamic loading is out of scope: plugins are factory values compiled in.

use anyhow::bail;

use crate::solution::Solution;
use crate::terminal::{Level, Terminal};

pub trait SolutionPlugin {
    fn name(&self) -> &'static str;

    /// Populate the solution's source set by walking its scan roots.
    fn scan_folders(&self, solution: &mut Solution, terminal: &Terminal) -> anyhow::Result<()>;
}

/// The built-in solution type used when the manifest has no `type` key.
struct DefaultSolution;

impl SolutionPlugin for DefaultSolution {
    fn name(&self) -> &'static str {
        "default"
    }

    fn scan_folders(&self, _solution: &mut Solution, _terminal: &Terminal) -> anyhow::Result<()> {
        bail!("default solution type does not have scan mode")
    }
}

/// Solution type for C/C++ projects.
struct CppSolution;

impl SolutionPlugin for CppSolution {
    fn name(&self) -> &'static str {
        "c/cpp"
    }

    // TODO: walk the scan roots for translation units and track header
    // mtimes so edits to includes mark their users stale.
    fn scan_folders(&self, _solution: &mut Solution, terminal: &Terminal) -> anyhow::Result<()> {
        terminal.log(Level::Warning, "c/cpp scan is not implemented yet\n");
        bail!("c/cpp solution scan is not implemented")
    }
}

pub struct Registry {
    plugins: Vec<Box<dyn SolutionPlugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            plugins: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Registry::new();
        registry.register(Box::new(DefaultSolution));
        registry.register(Box::new(CppSolution));
        registry
    }

    pub fn register(&mut self, plugin: Box<dyn SolutionPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SolutionPlugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.name() == name)
            .map(Box::as_ref)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
