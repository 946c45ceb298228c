#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use evalgrid_cache::{Component, ComponentCodec, ComponentNode};
use evalgrid_core::{
    AlgorithmVariant, Attributes, DataCondition, ErrorInfo, EvalError, EvalResult, ResultRow,
};
use evalgrid_exp::{ConfigResolver, EvalTask, Interrupt, SinkOpener, TaskOutput};
use evalgrid_table::{TableLayout, TableSink};
use serde_json::{json, Value};

/// Ratings loaded for a dataset.
#[derive(Debug)]
pub struct Dataset {
    pub name: String,
    pub ratings: Vec<u32>,
}

/// Training split of a dataset.
#[derive(Debug)]
pub struct Split {
    pub condition: String,
    pub size: usize,
}

/// Trained model.
#[derive(Debug)]
pub struct Model {
    pub algorithm: String,
    pub condition: String,
}

/// Resolves every job into `dataset -> split -> model`. The dataset node only
/// depends on the condition's `dataset` attribute (defaulting to its group),
/// so conditions over the same dataset share it.
#[derive(Default)]
pub struct GridResolver {
    builds: Mutex<HashMap<String, usize>>,
    conditions: Mutex<HashMap<String, usize>>,
}

impl GridResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of instantiations of a node kind.
    pub fn builds(&self, kind: &str) -> usize {
        self.builds.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    /// Number of split or model instantiations for a condition.
    pub fn builds_for(&self, condition: &str) -> usize {
        self.conditions
            .lock()
            .unwrap()
            .get(condition)
            .copied()
            .unwrap_or(0)
    }
}

impl ComponentCodec for GridResolver {
    fn encode(&self, node: &ComponentNode, component: &Component) -> Option<Vec<u8>> {
        if node.kind() != "dataset" {
            return None;
        }
        let dataset = component.downcast_ref::<Dataset>()?;
        serde_json::to_vec(&json!({"name": dataset.name, "ratings": dataset.ratings})).ok()
    }

    fn decode(&self, node: &ComponentNode, bytes: &[u8]) -> Option<Component> {
        if node.kind() != "dataset" {
            return None;
        }
        let value: Value = serde_json::from_slice(bytes).ok()?;
        let ratings = serde_json::from_value(value["ratings"].clone()).ok()?;
        Some(Component::new(Dataset {
            name: value["name"].as_str()?.to_string(),
            ratings,
        }))
    }
}

impl ConfigResolver for GridResolver {
    fn resolve(
        &self,
        algorithm: &AlgorithmVariant,
        condition: &DataCondition,
    ) -> EvalResult<ComponentNode> {
        if algorithm.config()["unresolvable"] == json!(true) {
            return Err(EvalError::Config(ErrorInfo::new(
                "unresolvable",
                "algorithm cannot be resolved",
            )));
        }
        let dataset_name = condition
            .attributes()
            .get("dataset")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| condition.group().to_string());
        let dataset = ComponentNode::new("dataset", json!({ "name": dataset_name }));
        let split = ComponentNode::new("split", json!({ "condition": condition.id() }))
            .with_input(dataset);
        let model = ComponentNode::new(
            "model",
            json!({
                "algorithm": algorithm.name(),
                "config": algorithm.config(),
            }),
        )
        .with_input(split);
        // `scorer: <bool>` adds a parameterless leaf with that shareability.
        Ok(match algorithm.config()["scorer"].as_bool() {
            Some(shareable) => {
                model.with_input(ComponentNode::new("scorer", json!({})).shareable(shareable))
            }
            None => model,
        })
    }

    fn instantiate(&self, node: &ComponentNode, inputs: &[Component]) -> EvalResult<Component> {
        *self
            .builds
            .lock()
            .unwrap()
            .entry(node.kind().to_string())
            .or_insert(0) += 1;
        match node.kind() {
            "dataset" => {
                thread::sleep(Duration::from_millis(5));
                Ok(Component::new(Dataset {
                    name: node.params()["name"].as_str().unwrap_or_default().to_string(),
                    ratings: (1..=5).collect(),
                }))
            }
            "split" => {
                let condition = node.params()["condition"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                *self
                    .conditions
                    .lock()
                    .unwrap()
                    .entry(condition.clone())
                    .or_insert(0) += 1;
                let dataset = inputs[0]
                    .downcast_ref::<Dataset>()
                    .ok_or_else(|| build_error("split input is not a dataset"))?;
                Ok(Component::new(Split {
                    condition,
                    size: dataset.ratings.len(),
                }))
            }
            "scorer" => Ok(Component::new(node.is_shareable())),
            "model" => {
                let split = inputs[0]
                    .downcast_ref::<Split>()
                    .ok_or_else(|| build_error("model input is not a split"))?;
                let config = &node.params()["config"];
                if config["fail_build"] == json!(true) {
                    return Err(build_error("training diverged"));
                }
                if let Some(millis) = config["train_ms"].as_u64() {
                    thread::sleep(Duration::from_millis(millis));
                }
                Ok(Component::new(Model {
                    algorithm: node.params()["algorithm"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    condition: split.condition.clone(),
                }))
            }
            other => Err(build_error(&format!("unknown node kind {other}"))),
        }
    }
}

fn build_error(message: &str) -> EvalError {
    EvalError::Build(ErrorInfo::new("fixture_build", message.to_string()))
}

/// Returns a constant measurement.
pub struct ConstTask {
    pub column: &'static str,
    pub value: f64,
}

impl EvalTask for ConstTask {
    fn name(&self) -> &str {
        "const"
    }

    fn measure_columns(&self) -> Vec<String> {
        vec![self.column.to_string()]
    }

    fn run(&self, model: &Component, _condition: &DataCondition) -> EvalResult<TaskOutput> {
        model
            .downcast_ref::<Model>()
            .ok_or_else(|| EvalError::Task(ErrorInfo::new("not_a_model", "unexpected model")))?;
        Ok(TaskOutput::new().with_measurement(self.column, self.value))
    }
}

/// Fails for one condition id and succeeds elsewhere.
pub struct FailOn {
    pub condition: &'static str,
}

impl EvalTask for FailOn {
    fn name(&self) -> &str {
        "fail-on"
    }

    fn measure_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn run(&self, _model: &Component, condition: &DataCondition) -> EvalResult<TaskOutput> {
        if condition.id() == self.condition {
            return Err(EvalError::Io(ErrorInfo::new(
                "predictions_unreadable",
                "could not read predictions",
            )));
        }
        Ok(TaskOutput::new())
    }
}

/// Reports its own failure as a cancellation.
pub struct GivesUp;

impl EvalTask for GivesUp {
    fn name(&self) -> &str {
        "gives-up"
    }

    fn measure_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn run(&self, _model: &Component, _condition: &DataCondition) -> EvalResult<TaskOutput> {
        Err(EvalError::Cancelled(ErrorInfo::new(
            "solver_aborted",
            "solver aborted the evaluation",
        )))
    }
}

/// Panics for every job.
pub struct PanicTask;

impl EvalTask for PanicTask {
    fn name(&self) -> &str {
        "panic"
    }

    fn measure_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn run(&self, _model: &Component, _condition: &DataCondition) -> EvalResult<TaskOutput> {
        panic!("metric exploded")
    }
}

/// Emits one detail row per rating in the model's split.
pub struct PerUserTask;

impl EvalTask for PerUserTask {
    fn name(&self) -> &str {
        "per-user"
    }

    fn measure_columns(&self) -> Vec<String> {
        vec!["users".to_string()]
    }

    fn detail_columns(&self) -> Vec<String> {
        vec!["user".to_string(), "hit".to_string()]
    }

    fn run(&self, _model: &Component, _condition: &DataCondition) -> EvalResult<TaskOutput> {
        let mut output = TaskOutput::new().with_measurement("users", 2);
        for user in 0..2 {
            let mut row = Attributes::new();
            row.insert("user".to_string(), json!(user));
            row.insert("hit".to_string(), json!(user % 2 == 0));
            output = output.with_detail(row);
        }
        Ok(output)
    }
}

/// Raises an interrupt on its first run and then sleeps.
pub struct InterruptingTask {
    pub interrupt: Interrupt,
    pub sleep: Duration,
}

impl EvalTask for InterruptingTask {
    fn name(&self) -> &str {
        "interrupting"
    }

    fn measure_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn run(&self, _model: &Component, _condition: &DataCondition) -> EvalResult<TaskOutput> {
        self.interrupt.raise();
        thread::sleep(self.sleep);
        Ok(TaskOutput::new())
    }
}

/// In-memory sink recording rows and close calls.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub rows: Arc<Mutex<Vec<ResultRow>>>,
    pub closes: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn opener(&self) -> SinkOpener {
        let sink = self.clone();
        Box::new(move |_layout: &TableLayout| {
            sink.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(sink.clone()) as Box<dyn TableSink>)
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl TableSink for RecordingSink {
    fn write_row(&mut self, _layout: &TableLayout, row: &ResultRow) -> EvalResult<()> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }

    fn close(&mut self) -> EvalResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn condition(id: &str, group: &str, split: &str) -> DataCondition {
    DataCondition::new(id)
        .in_group(group)
        .with_attribute("split", split)
}

pub fn algorithm(name: &str, k: i64) -> AlgorithmVariant {
    AlgorithmVariant::new(name).with_attribute("k", k)
}

/// Row without the timing columns, for order independent comparisons.
pub fn without_timings(row: &ResultRow) -> String {
    let stripped: Vec<(&str, &Value)> = row
        .iter()
        .filter(|(column, _)| *column != "BuildTime" && *column != "TestTime")
        .collect();
    serde_json::to_string(&stripped).unwrap()
}
