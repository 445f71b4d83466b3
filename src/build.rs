use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::config::{HarnessConfig, VariantRegistry, VariantSpec};
use crate::error::{HarnessError, HarnessResult};

/// Produces variant executables from isolated copies of the solver sources.
///
/// Builds of the same variant are serialised; different variants may build
/// at the same time since they never share a directory.
#[derive(Debug)]
pub struct BuildManager {
    config: Arc<HarnessConfig>,
    registry: Arc<VariantRegistry>,
    locks: IndexMap<String, Mutex<()>>,
}

impl BuildManager {
    pub fn new(config: Arc<HarnessConfig>, registry: Arc<VariantRegistry>) -> Self {
        let locks = registry
            .iter()
            .map(|v| (v.key.clone(), Mutex::new(())))
            .collect();
        Self {
            config,
            registry,
            locks,
        }
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    pub fn executable_path(&self, key: &str) -> HarnessResult<PathBuf> {
        self.spec(key).map(VariantSpec::executable_path)
    }

    /// Makes sure the executable for `key` exists, rebuilding it from scratch
    /// when it is missing or when `force` is set.
    pub fn ensure_built(&self, key: &str, force: bool) -> HarnessResult<()> {
        let spec = self.spec(key)?;
        let _guard = self
            .locks
            .get(key)
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));

        let exe = spec.executable_path();
        if !force && exe.exists() {
            debug!("variant {} already built at {}", key, exe.display());
            return Ok(());
        }

        info!(
            "building variant {} in {} (force={})",
            key,
            spec.build_dir.display(),
            force
        );
        if spec.build_dir.exists() {
            fs::remove_dir_all(&spec.build_dir)?;
        }
        fs::create_dir_all(&spec.build_dir)?;
        materialize_sources(&self.config, spec)?;

        let clean = self.invoke(spec, &self.config.clean_target)?;
        if !clean.status.success() {
            debug!("clean step for {} exited with {}", key, clean.status);
        }
        let build = self.invoke(spec, &spec.build_target)?;
        if !build.status.success() {
            warn!("build of variant {} failed with {}", key, build.status);
            return Err(HarnessError::Build(format!(
                "{} {} failed ({}):\n{}\n{}",
                self.config.build_program,
                spec.build_target,
                build.status,
                String::from_utf8_lossy(&build.stdout),
                String::from_utf8_lossy(&build.stderr),
            )));
        }
        if !exe.exists() {
            return Err(HarnessError::Build(format!(
                "build succeeded but executable {} is missing in {}",
                spec.executable,
                spec.build_dir.display()
            )));
        }
        info!("variant {} built at {}", key, exe.display());
        Ok(())
    }

    fn spec(&self, key: &str) -> HarnessResult<&VariantSpec> {
        self.registry
            .get(key)
            .ok_or_else(|| HarnessError::UnknownVariant(key.to_string()))
    }

    fn invoke(&self, spec: &VariantSpec, target: &str) -> HarnessResult<Output> {
        Command::new(&self.config.build_program)
            .args(&self.config.build_args)
            .arg(target)
            .current_dir(&spec.build_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                HarnessError::Build(format!(
                    "failed to launch {} {}: {}",
                    self.config.build_program, target, e
                ))
            })
    }
}

/// Copies headers, non-solver sources and auxiliary build files into the
/// variant's build directory, then drops the variant's solver source in
/// under the primary name.
fn materialize_sources(config: &HarnessConfig, spec: &VariantSpec) -> HarnessResult<()> {
    let src_dir = &config.source_dir;
    let dst_dir = &spec.build_dir;

    let substitute = src_dir.join(&spec.solver_source);
    if !substitute.is_file() {
        return Err(HarnessError::Build(format!(
            "missing source file: {}",
            spec.solver_source
        )));
    }

    for name in &config.aux_files {
        let src = src_dir.join(name);
        if src.is_file() {
            fs::copy(&src, dst_dir.join(name))?;
        }
    }

    for entry in fs::read_dir(src_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if should_copy(config, &path, name) {
            fs::copy(&path, dst_dir.join(name))?;
        }
    }

    fs::copy(&substitute, dst_dir.join(&config.primary_source))?;
    Ok(())
}

fn should_copy(config: &HarnessConfig, path: &Path, name: &str) -> bool {
    let ext = path.extension().and_then(|x| x.to_str()).unwrap_or("");
    if ext == config.header_extension {
        return true;
    }
    ext == config.source_extension && !name.starts_with(&config.solver_source_prefix)
}
