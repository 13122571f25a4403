//! Serde models for the solution manifest (`solution.json`) and the diff
//! sidecar (`deltamake.json`).
//!
//! Every field is optional at the parse layer; requiredness and defaults
//! are enforced by the solution loader so that a missing or wrongly-typed
//! key surfaces as a `value not set: <dotted.path>` diagnostic instead of a
//! serde type error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const SOLUTION_FILENAME: &str = "solution.json";
pub const DIFF_FILENAME: &str = "deltamake.json";

/// Deserialize a field but treat a type mismatch the same as an absent
/// value, so the loader's "value not set" checks cover both.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<String>,

    /// Plugin key; absent means the built-in default solution type.
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub solution_type: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub paths: Option<Paths>,

    /// Sub-solution code names to relative paths.
    #[serde(default, deserialize_with = "lenient")]
    pub solutions: Option<BTreeMap<String, String>>,

    #[serde(default, deserialize_with = "lenient")]
    pub files: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient")]
    pub builds: Option<BTreeMap<String, BuildConfig>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paths {
    #[serde(default, deserialize_with = "lenient")]
    pub scan: Option<ScanPaths>,

    #[serde(default, deserialize_with = "lenient")]
    pub build: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub tmp: Option<String>,
}

/// `paths.scan` accepts a single root or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScanPaths {
    One(String),
    Many(Vec<String>),
}

impl ScanPaths {
    pub fn roots(&self) -> Vec<&str> {
        match self {
            ScanPaths::One(root) => vec![root.as_str()],
            ScanPaths::Many(roots) => roots.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default, deserialize_with = "lenient")]
    pub compiler: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub compiler_flags: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub paths: Option<BuildPaths>,

    #[serde(default, deserialize_with = "lenient")]
    pub defines: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient")]
    pub linker: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub linker_flags: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub static_libs: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient")]
    pub archiver: Option<String>,

    /// "exec" (default) or "lib".
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub artifact: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub outname: Option<String>,

    /// Hook run synchronously before compiles are queued.
    #[serde(default, deserialize_with = "lenient")]
    pub pre: Option<String>,

    /// Hook run synchronously after the link step.
    #[serde(default, deserialize_with = "lenient")]
    pub post: Option<String>,

    /// Sub-solution code names to per-sub build selection.
    #[serde(default, deserialize_with = "lenient")]
    pub solutions: Option<BTreeMap<String, SubBuildRef>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildPaths {
    #[serde(default, deserialize_with = "lenient")]
    pub include: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient")]
    pub lib: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubBuildRef {
    #[serde(default, deserialize_with = "lenient")]
    pub build: Option<String>,
}

/// The persisted sidecar: per-build mapping from relative source path to the
/// mtime recorded when its compile was last scheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffFile {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub diff: BTreeMap<String, BTreeMap<String, i64>>,
}

impl DiffFile {
    pub fn new() -> Self {
        DiffFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            diff: BTreeMap::new(),
        }
    }
}

impl Default for DiffFile {
    fn default() -> Self {
        Self::new()
    }
}
