use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXECUTABLE: &str = "minisat";
pub const DEFAULT_BUILD_TARGET: &str = "s";

/// Filesystem layout and build policy shared by every variant.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub source_dir: PathBuf,
    pub build_root: PathBuf,
    pub benchmark_dir: PathBuf,
    pub benchmark_extension: String,
    pub ledger_path: PathBuf,
    pub build_program: String,
    /// Arguments placed before the target, e.g. `-j8`.
    pub build_args: Vec<String>,
    pub clean_target: String,
    /// Name the substituted solver source takes inside a build directory.
    pub primary_source: String,
    /// Sources starting with this prefix are never copied verbatim.
    pub solver_source_prefix: String,
    pub source_extension: String,
    pub header_extension: String,
    pub aux_files: Vec<String>,
    pub solver_timeout: Option<Duration>,
    pub job_retention: Option<usize>,
}

impl HarnessConfig {
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        HarnessConfig {
            source_dir: root.clone(),
            build_root: root.join("build"),
            benchmark_dir: root.clone(),
            benchmark_extension: "cnf".to_string(),
            ledger_path: root.join("results.csv"),
            build_program: "make".to_string(),
            build_args: Vec::new(),
            clean_target: "clean".to_string(),
            primary_source: "solver.c".to_string(),
            solver_source_prefix: "solver".to_string(),
            source_extension: "c".to_string(),
            header_extension: "h".to_string(),
            aux_files: vec!["Makefile".to_string(), "depend.mak".to_string()],
            solver_timeout: None,
            job_retention: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantSpec {
    pub key: String,
    pub label: String,
    pub solver_source: String,
    pub build_dir: PathBuf,
    pub executable: String,
    pub build_target: String,
}

impl VariantSpec {
    pub fn executable_path(&self) -> PathBuf {
        self.build_dir.join(&self.executable)
    }
}

/// Short form handed to clients listing variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantSummary {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
struct VariantEntry {
    key: String,
    label: String,
    solver_source: String,
    #[serde(default)]
    executable: Option<String>,
    #[serde(default)]
    build_target: Option<String>,
    #[serde(default)]
    build_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
struct VariantFile {
    variants: Vec<VariantEntry>,
}

/// Immutable set of buildable variants, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantRegistry {
    variants: IndexMap<String, VariantSpec>,
}

impl VariantRegistry {
    pub fn new(specs: Vec<VariantSpec>) -> Result<Self> {
        if specs.is_empty() {
            bail!("variant registry is empty");
        }
        let mut variants = IndexMap::new();
        for spec in specs {
            if spec.key.is_empty() {
                bail!("variant key must not be empty");
            }
            let key = spec.key.clone();
            if variants.insert(key.clone(), spec).is_some() {
                bail!("duplicate variant key '{}'", key);
            }
        }
        Ok(Self { variants })
    }

    /// The stock pair: `solver.c` as baseline and `solver2.c` as challenger.
    pub fn minisat_defaults(build_root: &Path) -> Self {
        let spec = |key: &str, label: &str, source: &str| VariantSpec {
            key: key.to_string(),
            label: label.to_string(),
            solver_source: source.to_string(),
            build_dir: build_root.join(key),
            executable: DEFAULT_EXECUTABLE.to_string(),
            build_target: DEFAULT_BUILD_TARGET.to_string(),
        };
        let mut variants = IndexMap::new();
        for v in [
            spec("baseline", "Baseline (solver.c)", "solver.c"),
            spec("variant2", "Variant2 (solver2.c)", "solver2.c"),
        ] {
            variants.insert(v.key.clone(), v);
        }
        Self { variants }
    }

    /// Loads `{"variants": [{key, label, solver_source, ...}]}`. Relative
    /// build directories are resolved under `build_root`; absent ones
    /// default to `build_root/<key>`.
    pub fn from_json_str(text: &str, build_root: &Path) -> Result<Self> {
        let parsed: VariantFile = serde_json::from_str(text).context("invalid variant file")?;
        let specs = parsed
            .variants
            .into_iter()
            .map(|e| VariantSpec {
                build_dir: match e.build_dir {
                    Some(dir) => build_root.join(dir),
                    None => build_root.join(&e.key),
                },
                executable: e
                    .executable
                    .unwrap_or_else(|| DEFAULT_EXECUTABLE.to_string()),
                build_target: e
                    .build_target
                    .unwrap_or_else(|| DEFAULT_BUILD_TARGET.to_string()),
                key: e.key,
                label: e.label,
                solver_source: e.solver_source,
            })
            .collect();
        Self::new(specs)
    }

    pub fn from_json_file(path: &Path, build_root: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read variant file {}", path.display()))?;
        Self::from_json_str(&text, build_root)
    }

    pub fn get(&self, key: &str) -> Option<&VariantSpec> {
        self.variants.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantSpec> {
        self.variants.values()
    }

    pub fn summaries(&self) -> Vec<VariantSummary> {
        self.iter()
            .map(|v| VariantSummary {
                key: v.key.clone(),
                label: v.label.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_declaration_order() {
        let reg = VariantRegistry::minisat_defaults(Path::new("/tmp/b"));
        let keys = reg.iter().map(|v| v.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["baseline", "variant2"]);
        let v2 = reg.get("variant2").expect("variant2");
        assert_eq!(v2.executable_path(), PathBuf::from("/tmp/b/variant2/minisat"));
        assert_eq!(v2.build_target, "s");
    }

    #[test]
    fn json_registry_fills_defaults() {
        let text = r#"{"variants": [
            {"key": "fast", "label": "Fast", "solver_source": "solver_fast.c"},
            {"key": "dbg", "label": "Debug", "solver_source": "solver.c",
             "build_target": "d", "executable": "minisat_debug", "build_dir": "debug"}
        ]}"#;
        let reg = VariantRegistry::from_json_str(text, Path::new("/b")).expect("parse");
        let fast = reg.get("fast").expect("fast");
        assert_eq!(fast.build_dir, PathBuf::from("/b/fast"));
        assert_eq!(fast.executable, DEFAULT_EXECUTABLE);
        let dbg = reg.get("dbg").expect("dbg");
        assert_eq!(dbg.executable_path(), PathBuf::from("/b/debug/minisat_debug"));
        assert_eq!(dbg.build_target, "d");
    }

    #[test]
    fn duplicate_and_empty_registries_are_rejected() {
        let dup = r#"{"variants": [
            {"key": "a", "label": "A", "solver_source": "solver.c"},
            {"key": "a", "label": "A again", "solver_source": "solver2.c"}
        ]}"#;
        let err = match VariantRegistry::from_json_str(dup, Path::new("/b")) {
            Ok(_) => panic!("expected duplicate error"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("duplicate"));
        assert!(VariantRegistry::from_json_str(r#"{"variants": []}"#, Path::new("/b")).is_err());
    }
}
