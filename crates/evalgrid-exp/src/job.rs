use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use evalgrid_cache::{BuildKey, Component, ComponentCache, ComponentNode, MergePool};
use evalgrid_core::{
    AlgorithmVariant, Attributes, DataCondition, ErrorInfo, EvalError, EvalResult, GroupKey,
    ResultRow,
};
use evalgrid_table::{ResultTable, BUILD_TIME_COLUMN, TEST_TIME_COLUMN};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::resolve::{ConfigResolver, ResolverCodec};
use crate::task::{EvalTask, TaskOutput};

/// Collaborators shared by every job of one run.
pub struct RunContext {
    /// Resolver turning algorithm descriptors into component graphs.
    pub resolver: Arc<dyn ConfigResolver>,
    /// Tasks run against each built model, in order.
    pub tasks: Vec<Arc<dyn EvalTask>>,
    /// Component cache consulted for shareable nodes.
    pub cache: Arc<ComponentCache>,
    /// Aggregate result table.
    pub output: Arc<ResultTable>,
    /// Detail table receiving per-task detail rows, when configured.
    pub detail_output: Option<Arc<ResultTable>>,
}

/// State shared by the jobs of one isolation group.
pub struct GroupContext {
    key: GroupKey,
    pool: Option<MergePool>,
    cancel: CancelToken,
}

impl GroupContext {
    /// Creates the context for a group. The merge pool is only kept when
    /// component sharing is enabled.
    pub fn new(key: GroupKey, share_components: bool) -> Self {
        let pool = share_components.then(|| MergePool::new(key.clone()));
        Self {
            key,
            pool,
            cancel: CancelToken::new(),
        }
    }

    /// Group key.
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Cancellation token checked by the group's jobs.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Merge pool, when sharing is enabled.
    pub fn pool(&self) -> Option<&MergePool> {
        self.pool.as_ref()
    }
}

/// One (algorithm, data condition) evaluation unit.
pub struct Job {
    algorithm: Arc<AlgorithmVariant>,
    condition: Arc<DataCondition>,
    group: Arc<GroupContext>,
    run: Arc<RunContext>,
}

impl Job {
    /// Creates a job bound to its group and run contexts.
    pub fn new(
        algorithm: Arc<AlgorithmVariant>,
        condition: Arc<DataCondition>,
        group: Arc<GroupContext>,
        run: Arc<RunContext>,
    ) -> Self {
        Self {
            algorithm,
            condition,
            group,
            run,
        }
    }

    /// Label of the form `algorithm@condition`.
    pub fn label(&self) -> String {
        format!("{}@{}", self.algorithm.name(), self.condition.id())
    }

    /// Algorithm evaluated by the job.
    pub fn algorithm(&self) -> &AlgorithmVariant {
        &self.algorithm
    }

    /// Data condition evaluated by the job.
    pub fn condition(&self) -> &DataCondition {
        &self.condition
    }

    /// Isolation group of the job.
    pub fn group(&self) -> &GroupKey {
        &self.group.key
    }

    /// Builds the model, runs every task and writes the result row.
    ///
    /// Nothing is written once the group's cancellation token is set, and a
    /// panic anywhere in the job surfaces as [`EvalError::Task`].
    pub fn run(&self) -> EvalResult<ResultRow> {
        let label = self.label();
        match panic::catch_unwind(AssertUnwindSafe(|| self.execute(&label))) {
            Ok(outcome) => outcome.map_err(|err| {
                err.with_context("job", label.clone())
                    .with_context("group", self.group.key.as_str())
            }),
            Err(payload) => Err(EvalError::Task(
                ErrorInfo::new("task_panicked", "job panicked")
                    .with_context("job", label)
                    .with_context("group", self.group.key.as_str())
                    .with_hint(panic_message(payload.as_ref())),
            )),
        }
    }

    fn execute(&self, label: &str) -> EvalResult<ResultRow> {
        let cancel = &self.group.cancel;
        cancel.check(label)?;

        debug!(job = %label, group = %self.group.key, "building model");
        let started = Instant::now();
        let model = self.build_model()?;
        let build_time = started.elapsed();

        let mut row = ResultRow::new();
        row.extend_from(self.condition.attributes());
        for (column, value) in self.algorithm.attributes() {
            if !row.contains(column) {
                row.set(column.clone(), value.clone());
            }
        }
        row.set(BUILD_TIME_COLUMN, build_time.as_secs_f64());

        let mut test_time = Duration::ZERO;
        let mut details = Vec::new();
        for task in &self.run.tasks {
            cancel.check(label)?;
            debug!(job = %label, task = task.name(), "running task");
            let started = Instant::now();
            let output = self.run_task(task.as_ref(), &model)?;
            test_time += started.elapsed();
            for (column, value) in output.measurements {
                row.set(column, value);
            }
            details.extend(output.details);
        }
        row.set(TEST_TIME_COLUMN, test_time.as_secs_f64());

        cancel.check(label)?;
        if let Some(detail_output) = &self.run.detail_output {
            for detail in details {
                detail_output.write(self.detail_row(detail))?;
            }
        }
        self.run.output.write(row.clone())?;
        debug!(job = %label, "job finished");
        Ok(row)
    }

    fn build_model(&self) -> EvalResult<Component> {
        let root = self
            .run
            .resolver
            .resolve(&self.algorithm, &self.condition)
            .map_err(|err| as_build_error(err, &self.group.cancel))?;
        let root = Arc::new(root);
        let root = match self.group.pool() {
            Some(pool) => pool.merge(root),
            None => root,
        };
        let mut built = HashMap::new();
        self.build_node(&root, &mut built)
    }

    /// Builds a node after its inputs. Shareable nodes go through the cache,
    /// so a cache hit skips building the node's inputs entirely.
    fn build_node(
        &self,
        node: &Arc<ComponentNode>,
        built: &mut HashMap<BuildKey, Component>,
    ) -> EvalResult<Component> {
        if let Some(component) = built.get(node.key()) {
            return Ok(component.clone());
        }
        let component = if node.is_shareable() {
            let codec = ResolverCodec(self.run.resolver.as_ref());
            self.run
                .cache
                .build_node(&self.group.key, node, &codec, || self.instantiate(node, built))?
        } else {
            self.instantiate(node, built)?
        };
        built.insert(node.key().clone(), component.clone());
        Ok(component)
    }

    fn instantiate(
        &self,
        node: &ComponentNode,
        built: &mut HashMap<BuildKey, Component>,
    ) -> EvalResult<Component> {
        self.group.cancel.check(&self.label())?;
        let inputs = node
            .inputs()
            .iter()
            .map(|input| self.build_node(input, built))
            .collect::<EvalResult<Vec<_>>>()?;
        self.run
            .resolver
            .instantiate(node, &inputs)
            .map_err(|err| {
                as_build_error(err, &self.group.cancel).with_context("component", node.kind())
            })
    }

    fn run_task(&self, task: &dyn EvalTask, model: &Component) -> EvalResult<TaskOutput> {
        task.run(model, &self.condition).map_err(|err| {
            let err = match err {
                task_error @ EvalError::Task(_) => task_error,
                cancelled @ EvalError::Cancelled(_) if self.group.cancel.is_cancelled() => {
                    cancelled
                }
                other => EvalError::Task(
                    ErrorInfo::new("task_failed", "evaluation task failed")
                        .with_hint(other.to_string()),
                ),
            };
            err.with_context("task", task.name())
        })
    }

    fn detail_row(&self, detail: Attributes) -> ResultRow {
        let mut row = ResultRow::new();
        row.extend_from(self.condition.attributes());
        for (column, value) in self.algorithm.attributes() {
            if !row.contains(column) {
                row.set(column.clone(), value.clone());
            }
        }
        row.extend_from(&detail);
        row
    }
}

/// Cancellations only pass through while the group token is set; anything
/// else a resolver reports is a build failure.
fn as_build_error(err: EvalError, cancel: &CancelToken) -> EvalError {
    match err {
        build @ EvalError::Build(_) => build,
        cancelled @ EvalError::Cancelled(_) if cancel.is_cancelled() => cancelled,
        other => EvalError::Build(
            ErrorInfo::new("build_failed", "component build failed").with_hint(other.to_string()),
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
