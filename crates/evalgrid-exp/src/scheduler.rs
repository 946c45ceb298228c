use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use evalgrid_core::{
    AlgorithmVariant, DataCondition, ErrorInfo, EvalError, EvalResult, GroupKey, ResultRow,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::Interrupt;
use crate::job::{GroupContext, Job, RunContext};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Lifecycle of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Created, no jobs yet.
    Idle,
    /// Enumerating jobs.
    BuildingJobList,
    /// Running groups.
    Executing,
    /// Every job finished.
    Done,
    /// A job failed or the run was interrupted.
    Failed,
}

struct JobGroup {
    context: Arc<GroupContext>,
    jobs: Vec<Arc<Job>>,
}

/// Runs jobs group by group, with at most `thread_count` jobs in flight.
///
/// Groups run strictly in first-seen order. Within a group jobs run
/// sequentially when `thread_count <= 1`, otherwise on a shared worker pool.
/// The first failure cancels the rest of its group and stops the run.
pub struct Scheduler {
    state: SchedulerState,
    thread_count: usize,
    share_components: bool,
    interrupt: Interrupt,
    groups: IndexMap<GroupKey, JobGroup>,
}

impl Scheduler {
    /// Creates an idle scheduler.
    pub fn new(thread_count: usize, share_components: bool, interrupt: Interrupt) -> Self {
        Self {
            state: SchedulerState::Idle,
            thread_count,
            share_components,
            interrupt,
            groups: IndexMap::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of threads jobs run on.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Enumerates one job per (condition, algorithm) pair, condition-major,
    /// and files each under its condition's group.
    pub fn build_job_list(
        &mut self,
        conditions: &[DataCondition],
        algorithms: &[AlgorithmVariant],
        run: Arc<RunContext>,
    ) {
        self.state = SchedulerState::BuildingJobList;
        let algorithms: Vec<Arc<AlgorithmVariant>> =
            algorithms.iter().cloned().map(Arc::new).collect();
        for condition in conditions {
            let condition = Arc::new(condition.clone());
            let share_components = self.share_components;
            let group = self
                .groups
                .entry(condition.group().clone())
                .or_insert_with(|| JobGroup {
                    context: Arc::new(GroupContext::new(
                        condition.group().clone(),
                        share_components,
                    )),
                    jobs: Vec::new(),
                });
            for algorithm in &algorithms {
                group.jobs.push(Arc::new(Job::new(
                    Arc::clone(algorithm),
                    Arc::clone(&condition),
                    Arc::clone(&group.context),
                    Arc::clone(&run),
                )));
            }
        }
        debug!(
            groups = self.groups.len(),
            jobs = self.job_count(),
            "built job list"
        );
    }

    /// Total number of jobs.
    pub fn job_count(&self) -> usize {
        self.groups.values().map(|group| group.jobs.len()).sum()
    }

    /// Number of isolation groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Job labels per group, in execution order.
    pub fn job_labels(&self) -> Vec<(GroupKey, Vec<String>)> {
        self.groups
            .iter()
            .map(|(key, group)| {
                let labels = group.jobs.iter().map(|job| job.label()).collect();
                (key.clone(), labels)
            })
            .collect()
    }

    /// Runs every group. Failures come back wrapped by [`EvalError::fatal`].
    pub fn run(&mut self) -> EvalResult<()> {
        self.state = SchedulerState::Executing;
        info!(
            threads = self.thread_count,
            groups = self.groups.len(),
            jobs = self.job_count(),
            "running jobs"
        );
        let outcome = if self.thread_count <= 1 {
            self.run_sequential()
        } else {
            self.run_pooled()
        };
        self.state = match outcome {
            Ok(()) => SchedulerState::Done,
            Err(_) => SchedulerState::Failed,
        };
        outcome.map_err(EvalError::fatal)
    }

    fn run_sequential(&self) -> EvalResult<()> {
        for (key, group) in &self.groups {
            info!(group = %key, jobs = group.jobs.len(), "running group");
            for job in &group.jobs {
                if self.interrupt.is_raised() {
                    info!(group = %key, "run interrupted");
                    return Err(self.interrupt.error());
                }
                job.run()?;
            }
        }
        Ok(())
    }

    fn run_pooled(&self) -> EvalResult<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_count)
            .thread_name(|index| format!("evalgrid-worker-{index}"))
            .build()
            .map_err(|err| {
                EvalError::Config(
                    ErrorInfo::new("thread_pool", "failed to start worker pool")
                        .with_hint(err.to_string()),
                )
            })?;
        for (key, group) in &self.groups {
            if self.interrupt.is_raised() {
                info!(group = %key, "run interrupted");
                return Err(self.interrupt.error());
            }
            info!(group = %key, jobs = group.jobs.len(), "running group");
            let (sender, receiver) = mpsc::channel();
            for (index, job) in group.jobs.iter().enumerate() {
                let job = Arc::clone(job);
                let sender = sender.clone();
                pool.spawn(move || {
                    let outcome = job.run();
                    // The receiver only goes away once every job reported.
                    let _ = sender.send((index, outcome));
                });
            }
            drop(sender);
            self.drain(key, group, receiver)?;
        }
        Ok(())
    }

    /// Waits for every job of the group to report back, in completion order.
    /// Returns the first real failure once nothing from the group is still
    /// running.
    fn drain(
        &self,
        key: &GroupKey,
        group: &JobGroup,
        receiver: Receiver<(usize, EvalResult<ResultRow>)>,
    ) -> EvalResult<()> {
        let cancel = group.context.cancel_token();
        let mut pending = group.jobs.len();
        let mut failure: Option<EvalError> = None;
        while pending > 0 {
            if failure.is_none() && self.interrupt.is_raised() {
                info!(group = %key, "run interrupted, cancelling pending jobs");
                cancel.cancel();
                failure = Some(self.interrupt.error());
            }
            let (index, outcome) = match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(group = %key, pending, "worker pool dropped jobs");
                    return Err(failure.unwrap_or_else(|| {
                        EvalError::Cancelled(
                            ErrorInfo::new("jobs_lost", "jobs finished without reporting")
                                .with_context("group", key.as_str()),
                        )
                    }));
                }
            };
            pending -= 1;
            let label = group.jobs[index].label();
            match outcome {
                Ok(_) => debug!(job = %label, "job reported"),
                Err(err) if failure.is_some() => {
                    debug!(job = %label, error = %err, "ignoring error after group failure")
                }
                Err(err) => {
                    warn!(job = %label, error = %err, "job failed, cancelling group");
                    cancel.cancel();
                    failure = Some(err);
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }
}
