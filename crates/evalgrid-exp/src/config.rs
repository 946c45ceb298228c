use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use evalgrid_core::{
    io_error, stable_hash_string, AlgorithmVariant, DataCondition, ErrorInfo, EvalError,
    EvalResult,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable consulted when no thread count is configured.
pub const THREAD_COUNT_ENV: &str = "EVALGRID_THREAD_COUNT";

/// Run settings of an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Worker threads. Unset or zero defers to [`THREAD_COUNT_ENV`] and then
    /// to the number of available processors.
    #[serde(default)]
    pub thread_count: Option<usize>,
    /// Reuse structurally identical components across jobs of a group.
    #[serde(default = "ExperimentConfig::default_share_components")]
    pub share_components: bool,
    /// Directory for persisted components. Requires sharing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// CSV file receiving the aggregate table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    /// CSV file receiving task detail rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_output_file: Option<PathBuf>,
}

impl ExperimentConfig {
    fn default_share_components() -> bool {
        true
    }

    /// Thread count after applying the configured value, the environment
    /// override and the processor count, in that order.
    pub fn effective_thread_count(&self) -> usize {
        let from_env = env::var(THREAD_COUNT_ENV).ok();
        resolve_thread_count(self.thread_count, from_env.as_deref())
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            thread_count: None,
            share_components: true,
            cache_dir: None,
            output_file: None,
            detail_output_file: None,
        }
    }
}

/// Picks the thread count: a positive configured value wins, then a
/// positive environment value, then the processor count.
pub fn resolve_thread_count(configured: Option<usize>, from_env: Option<&str>) -> usize {
    if let Some(count) = configured.filter(|count| *count > 0) {
        return count;
    }
    if let Some(raw) = from_env {
        match raw.trim().parse::<usize>() {
            Ok(count) if count > 0 => return count,
            Ok(_) => {}
            Err(err) => warn!(
                variable = THREAD_COUNT_ENV,
                value = raw,
                error = %err,
                "ignoring invalid thread count"
            ),
        }
    }
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// Declarative experiment: settings plus the conditions and algorithms to
/// cross.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    /// Run settings.
    #[serde(default)]
    pub settings: ExperimentConfig,
    /// Data conditions, in submission order.
    pub conditions: Vec<DataCondition>,
    /// Algorithm variants, in submission order.
    pub algorithms: Vec<AlgorithmVariant>,
}

impl ExperimentPlan {
    /// Returns the deterministic hash of the plan contents.
    pub fn plan_hash(&self) -> EvalResult<String> {
        stable_hash_string(self)
    }

    /// Rejects plans with duplicate condition ids or algorithm names.
    pub fn validate(&self) -> EvalResult<()> {
        let mut seen = HashSet::new();
        for condition in &self.conditions {
            if !seen.insert(condition.id()) {
                return Err(duplicate("condition", condition.id()));
            }
        }
        seen.clear();
        for algorithm in &self.algorithms {
            if !seen.insert(algorithm.name()) {
                return Err(duplicate("algorithm", algorithm.name()));
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let settings = &mut self.settings;
        for path in [
            &mut settings.cache_dir,
            &mut settings.output_file,
            &mut settings.detail_output_file,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }
}

fn duplicate(kind: &str, name: &str) -> EvalError {
    EvalError::Config(
        ErrorInfo::new("duplicate_entry", format!("{kind} listed twice"))
            .with_context(kind, name),
    )
}

/// Loads a plan from YAML (JSON is accepted as a YAML subset). Relative
/// output and cache paths are resolved against the plan's directory.
pub fn load_plan<P: AsRef<Path>>(path: P) -> EvalResult<ExperimentPlan> {
    let plan_path = path.as_ref();
    let bytes = fs::read(plan_path).map_err(|err| {
        io_error("plan_read", err).with_context("path", plan_path.display())
    })?;
    let mut plan: ExperimentPlan = serde_yaml::from_slice(&bytes).map_err(|err| {
        EvalError::Config(
            ErrorInfo::new("plan_parse", "failed to parse experiment plan")
                .with_context("path", plan_path.display())
                .with_hint(err.to_string()),
        )
    })?;
    plan.validate()?;
    let base_dir = plan_path.parent().unwrap_or_else(|| Path::new("."));
    plan.resolve_paths(base_dir);
    Ok(plan)
}
