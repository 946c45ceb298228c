use std::sync::Arc;

use evalgrid_cache::{CacheStats, ComponentCache};
use evalgrid_core::{AlgorithmVariant, DataCondition, EvalResult};
use evalgrid_table::{
    CsvSink, OutputLayout, ResourceScope, ResultTable, Table, TableLayout, TableSink,
};
use tracing::info;

use crate::cancel::Interrupt;
use crate::config::{ExperimentConfig, ExperimentPlan};
use crate::job::RunContext;
use crate::resolve::ConfigResolver;
use crate::scheduler::Scheduler;
use crate::task::EvalTask;

/// Opens an extra sink for the aggregate table once its layout is known.
pub type SinkOpener = Box<dyn Fn(&TableLayout) -> EvalResult<Box<dyn TableSink>> + Send + Sync>;

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Aggregate rows, in write order.
    pub table: Table,
    /// Cache counters at the end of the run.
    pub cache: CacheStats,
    /// Threads the jobs ran on.
    pub threads: usize,
}

/// Cross product of data conditions and algorithm variants, evaluated by a
/// list of tasks.
pub struct Experiment {
    config: ExperimentConfig,
    conditions: Vec<DataCondition>,
    algorithms: Vec<AlgorithmVariant>,
    tasks: Vec<Arc<dyn EvalTask>>,
    resolver: Arc<dyn ConfigResolver>,
    sinks: Vec<SinkOpener>,
    interrupt: Interrupt,
}

impl Experiment {
    /// Creates an empty experiment using the given resolver.
    pub fn new(resolver: Arc<dyn ConfigResolver>) -> Self {
        Self {
            config: ExperimentConfig::default(),
            conditions: Vec::new(),
            algorithms: Vec::new(),
            tasks: Vec::new(),
            resolver,
            sinks: Vec::new(),
            interrupt: Interrupt::new(),
        }
    }

    /// Creates an experiment from a loaded plan.
    pub fn from_plan(plan: ExperimentPlan, resolver: Arc<dyn ConfigResolver>) -> Self {
        Self::new(resolver)
            .with_config(plan.settings)
            .add_conditions(plan.conditions)
            .add_algorithms(plan.algorithms)
    }

    /// Replaces the run settings.
    pub fn with_config(mut self, config: ExperimentConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConfigResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Adds a data condition.
    pub fn add_condition(mut self, condition: DataCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds several data conditions.
    pub fn add_conditions(mut self, conditions: impl IntoIterator<Item = DataCondition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Adds an algorithm variant.
    pub fn add_algorithm(mut self, algorithm: AlgorithmVariant) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    /// Adds several algorithm variants.
    pub fn add_algorithms(mut self, algorithms: impl IntoIterator<Item = AlgorithmVariant>) -> Self {
        self.algorithms.extend(algorithms);
        self
    }

    /// Adds an evaluation task.
    pub fn add_task(mut self, task: Arc<dyn EvalTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Adds a sink receiving every aggregate row next to the CSV output.
    pub fn add_sink(mut self, opener: SinkOpener) -> Self {
        self.sinks.push(opener);
        self
    }

    /// Run settings.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Handle for stopping a run from another thread.
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Runs every job and returns the aggregate table.
    pub fn run(&self) -> EvalResult<Table> {
        self.run_with_report().map(|report| report.table)
    }

    /// Runs every job and returns the aggregate table with run statistics.
    ///
    /// Every table and sink opened for the run is closed exactly once before
    /// this returns, whatever the outcome. Errors are wrapped as
    /// [`evalgrid_core::EvalError::Evaluation`].
    pub fn run_with_report(&self) -> EvalResult<RunReport> {
        let mut scope = ResourceScope::new();
        let outcome = self.run_in_scope(&mut scope);
        scope.finish(outcome)
    }

    fn run_in_scope(&self, scope: &mut ResourceScope) -> EvalResult<RunReport> {
        let threads = self.config.effective_thread_count();
        info!(
            conditions = self.conditions.len(),
            algorithms = self.algorithms.len(),
            tasks = self.tasks.len(),
            threads,
            "starting experiment"
        );
        let layout = OutputLayout::build(&self.conditions, &self.algorithms);

        let measure_columns: Vec<String> = self
            .tasks
            .iter()
            .flat_map(|task| task.measure_columns())
            .collect();
        let output = scope.register(ResultTable::open(
            "global",
            layout.table_layout(&measure_columns),
        ));
        if let Some(path) = &self.config.output_file {
            output.attach(Box::new(CsvSink::create(path, output.layout())?))?;
        }
        for opener in &self.sinks {
            output.attach(opener(output.layout())?)?;
        }

        let detail_output = match &self.config.detail_output_file {
            Some(path) => {
                let detail_columns: Vec<String> = self
                    .tasks
                    .iter()
                    .flat_map(|task| task.detail_columns())
                    .collect();
                let table = scope.register(ResultTable::open(
                    "detail",
                    layout.detail_layout(&detail_columns),
                ));
                table.attach(Box::new(CsvSink::create(path, table.layout())?))?;
                Some(table)
            }
            None => None,
        };

        let cache = Arc::new(self.open_cache());
        let run = Arc::new(RunContext {
            resolver: Arc::clone(&self.resolver),
            tasks: self.tasks.clone(),
            cache: Arc::clone(&cache),
            output: Arc::clone(&output),
            detail_output,
        });

        let mut scheduler = Scheduler::new(
            threads,
            self.config.share_components,
            self.interrupt.clone(),
        );
        scheduler.build_job_list(&self.conditions, &self.algorithms, run);
        scheduler.run()?;

        let stats = cache.stats();
        info!(
            rows = output.len(),
            builds = stats.builds,
            memory_hits = stats.memory_hits,
            disk_hits = stats.disk_hits,
            "experiment finished"
        );
        Ok(RunReport {
            table: output.snapshot(),
            cache: stats,
            threads,
        })
    }

    fn open_cache(&self) -> ComponentCache {
        if !self.config.share_components {
            return ComponentCache::disabled();
        }
        match &self.config.cache_dir {
            Some(dir) => ComponentCache::with_store(dir),
            None => ComponentCache::new(),
        }
    }
}
