//! Executing nodes and propagating evaluation downstream.

use crate::{
    config::{Config, Visited},
    controls::{self, ControlsCache},
    exec::{ExecError, ExecutionResult, Executor},
    graph::Index,
    node::{self, ErrorInfo, Record, Values},
    store::Store,
};
use indexmap::IndexSet;
use std::cell::{Cell, RefCell};

/// Executes nodes against the store and walks their downstream closure.
pub(crate) struct Scheduler<E, C> {
    pub(crate) store: Store,
    pub(crate) index: RefCell<Index>,
    pub(crate) executor: E,
    pub(crate) cache: C,
    pub(crate) config: Config,
    /// Bumped every time a pass begins. A pass whose generation no longer
    /// matches has been superseded.
    generation: Cell<u64>,
    /// Nodes that were triggered while already in flight.
    dropped: RefCell<IndexSet<node::Id>>,
}

/// A single evaluation pass, e.g. one sync or one manual evaluation.
#[derive(Debug)]
pub(crate) struct Pass {
    generation: Cell<u64>,
}

/// The result of attempting to execute a single node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The node has no record.
    Missing,
    /// The node's code is empty. Its results were cleared.
    Empty,
    /// The node was already in flight.
    Dropped,
    Succeeded,
    Failed,
    /// The executor itself raised an error.
    Faulted,
    /// The pass was superseded while the node was in flight.
    Cancelled,
    /// The pass was superseded, but a newer pass had tried to trigger this
    /// node while in flight. The node was re-run on behalf of the newer pass.
    Adopted,
}

/// How a walk over the downstream closure ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Walk {
    Completed,
    Cancelled,
    /// The walk switched over to the newest pass part way through.
    Adopted,
}

impl Pass {
    fn adopt(&self, generation: u64) {
        self.generation.set(generation);
    }
}

impl<E, C> Scheduler<E, C>
where
    E: Executor,
    C: ControlsCache,
{
    pub(crate) fn new(executor: E, cache: C, config: Config) -> Self {
        Scheduler {
            store: Store::new(),
            index: RefCell::new(Index::default()),
            executor,
            cache,
            config,
            generation: Cell::new(0),
            dropped: RefCell::new(IndexSet::new()),
        }
    }

    /// Begin a new pass, superseding any pass still in flight.
    pub(crate) fn begin_pass(&self) -> Pass {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        Pass {
            generation: Cell::new(generation),
        }
    }

    fn is_cancelled(&self, pass: &Pass) -> bool {
        self.config.cancel_superseded && self.generation.get() != pass.generation.get()
    }

    /// Evaluate each seed and its downstream closure in order.
    pub(crate) async fn run(&self, seeds: Vec<node::Id>, pass: &Pass) -> Walk {
        let mut visited = IndexSet::new();
        for seed in seeds {
            if self.config.visited == Visited::PerSeed {
                visited.clear();
            }
            match self.walk(&seed, &mut visited, pass).await {
                Walk::Completed => (),
                walk => return walk,
            }
        }
        Walk::Completed
    }

    /// Depth-first, pre-order walk from `seed` along outgoing edges.
    ///
    /// Every node is executed at most once per `visited` set, which also
    /// guarantees termination through cycles.
    pub(crate) async fn walk(
        &self,
        seed: &str,
        visited: &mut IndexSet<node::Id>,
        pass: &Pass,
    ) -> Walk {
        let mut adopted = false;
        let mut stack = vec![seed.to_string()];
        while let Some(id) = stack.pop() {
            if self.is_cancelled(pass) {
                return Walk::Cancelled;
            }
            if !visited.insert(id.clone()) {
                log::trace!("node {id} already visited in this pass");
                continue;
            }
            match self.execute_node(&id, pass).await {
                Outcome::Cancelled => return Walk::Cancelled,
                Outcome::Adopted => {
                    // The rest of the superseded walk is no longer wanted.
                    adopted = true;
                    stack.clear();
                    visited.clear();
                    visited.insert(id.clone());
                }
                _ => (),
            }
            if self.is_cancelled(pass) {
                return Walk::Cancelled;
            }
            let targets: Vec<node::Id> = self.index.borrow().targets(&id).cloned().collect();
            stack.extend(targets.into_iter().rev());
        }
        if adopted {
            Walk::Adopted
        } else {
            Walk::Completed
        }
    }

    /// Execute a single node and commit the result to the store.
    pub(crate) async fn execute_node(&self, id: &str, pass: &Pass) -> Outcome {
        let mut adopted = false;
        loop {
            let Some(record) = self.store.get(id) else {
                return Outcome::Missing;
            };
            let code = if self.config.trim_code {
                record.code.trim()
            } else {
                record.code.as_str()
            };
            if code.is_empty() {
                // An execution still in flight keeps its flag until it returns.
                let cleared = Record {
                    outputs: Values::new(),
                    logs: vec![],
                    errors: vec![],
                    warnings: vec![],
                    ..(*record).clone()
                };
                if cleared != *record {
                    self.store.set(id, cleared);
                }
                return Outcome::Empty;
            }
            if record.is_evaluating {
                log::trace!("node {id} is already evaluating, dropping trigger");
                self.dropped.borrow_mut().insert(id.to_string());
                return Outcome::Dropped;
            }

            let code = code.to_string();
            let inputs = self.inputs(id, &record);
            self.store.set(
                id,
                Record {
                    is_evaluating: true,
                    ..(*record).clone()
                },
            );
            log::debug!("executing node {id} with {} inputs", inputs.len());
            let result = self.executor.execute(&code, &inputs).await;

            // The node may have been removed while suspended.
            let Some(record) = self.store.get(id) else {
                self.dropped.borrow_mut().shift_remove(id);
                return Outcome::Missing;
            };
            if self.is_cancelled(pass) {
                self.store.set(
                    id,
                    Record {
                        is_evaluating: false,
                        ..(*record).clone()
                    },
                );
                if self.dropped.borrow_mut().shift_remove(id) {
                    log::debug!("node {id} was re-triggered by a newer pass, re-running");
                    pass.adopt(self.generation.get());
                    adopted = true;
                    continue;
                }
                log::warn!("pass superseded while node {id} was evaluating, discarding result");
                return Outcome::Cancelled;
            }
            self.dropped.borrow_mut().shift_remove(id);
            let outcome = self.commit(id, &record, result);
            return if adopted { Outcome::Adopted } else { outcome };
        }
    }

    /// Gather the outputs of every source in adjacency order, overlaid by the
    /// node's own control values.
    fn inputs(&self, id: &str, record: &Record) -> Values {
        let mut inputs = Values::new();
        let index = self.index.borrow();
        for source in index.sources(id) {
            // Sources without a record contribute nothing.
            if let Some(upstream) = self.store.get(source) {
                inputs.extend(upstream.outputs.clone());
            }
        }
        inputs.extend(controls::values(&record.controls));
        inputs
    }

    fn commit(
        &self,
        id: &str,
        prev: &Record,
        result: Result<ExecutionResult, ExecError>,
    ) -> Outcome {
        match result {
            Ok(result) if result.success => {
                let record = Record {
                    code: prev.code.clone(),
                    is_evaluating: false,
                    controls: result.controls,
                    outputs: result.outputs,
                    logs: result.logs,
                    errors: vec![],
                    warnings: result.warnings,
                };
                let controls = record.controls.clone();
                self.store.set(id, record);
                log::debug!("node {id} succeeded");
                self.cache
                    .set(id, (!controls.is_empty()).then_some(controls));
                Outcome::Succeeded
            }
            Ok(result) => {
                let errors = if result.errors.is_empty() {
                    vec![ErrorInfo::new(self.config.unknown_error.clone())]
                } else {
                    result.errors
                };
                log::debug!("node {id} failed with {} errors", errors.len());
                let record = Record {
                    code: prev.code.clone(),
                    is_evaluating: false,
                    controls: controls::merge(&prev.controls, result.controls),
                    outputs: Values::new(),
                    logs: result.logs,
                    errors,
                    warnings: result.warnings,
                };
                self.store.set(id, record);
                Outcome::Failed
            }
            Err(err) => {
                log::warn!("executor fault while evaluating node {id}: {err}");
                let record = Record {
                    is_evaluating: false,
                    errors: vec![err.into()],
                    ..prev.clone()
                };
                self.store.set(id, record);
                Outcome::Faulted
            }
        }
    }
}
