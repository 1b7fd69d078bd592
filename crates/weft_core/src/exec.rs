//! The interface to whatever actually runs a node's code.

use crate::node::{Control, ErrorInfo, Values};
use serde::{Deserialize, Serialize};
use std::{future::Future, rc::Rc};
use thiserror::Error;

/// Runs a single node's code against a flat map of named inputs.
///
/// An executor knows nothing about the graph. User-code errors must be
/// reported through [`ExecutionResult::errors`] with `success: false`. An
/// [`ExecError`] is reserved for faults in the execution mechanism itself.
///
/// The returned future may suspend, e.g. while waiting on a sandbox. Other
/// nodes may be scheduled in the meantime.
pub trait Executor {
    fn execute(
        &self,
        code: &str,
        inputs: &Values,
    ) -> impl Future<Output = Result<ExecutionResult, ExecError>>;
}

/// Everything produced by executing a node once.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub outputs: Values,
    /// The controls declared during execution.
    #[serde(default)]
    pub controls: Vec<Control>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
    #[serde(default)]
    pub warnings: Vec<ErrorInfo>,
}

/// A fault in the execution mechanism, as opposed to an error in user code.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    /// The host failed to run the code at all.
    #[error("{message}")]
    Host {
        message: String,
        stack: Option<String>,
    },
}

/// An [`Executor`] backed by a synchronous function.
#[derive(Clone, Copy, Debug)]
pub struct FnExecutor<F>(pub F);

impl ExecutionResult {
    /// A successful result with the given outputs.
    pub fn success(outputs: Values) -> Self {
        ExecutionResult {
            success: true,
            outputs,
            ..Default::default()
        }
    }

    /// A failed result with the given errors.
    pub fn failure(errors: Vec<ErrorInfo>) -> Self {
        ExecutionResult {
            success: false,
            errors,
            ..Default::default()
        }
    }

    pub fn with_controls(mut self, controls: Vec<Control>) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<ErrorInfo>) -> Self {
        self.warnings = warnings;
        self
    }
}

impl ExecError {
    /// A host fault with only a message.
    pub fn host(message: impl Into<String>) -> Self {
        ExecError::Host {
            message: message.into(),
            stack: None,
        }
    }
}

impl From<ExecError> for ErrorInfo {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Host { message, stack } => ErrorInfo {
                message,
                stack,
                ..Default::default()
            },
        }
    }
}

impl<F> Executor for FnExecutor<F>
where
    F: Fn(&str, &Values) -> Result<ExecutionResult, ExecError>,
{
    fn execute(
        &self,
        code: &str,
        inputs: &Values,
    ) -> impl Future<Output = Result<ExecutionResult, ExecError>> {
        std::future::ready((self.0)(code, inputs))
    }
}

impl<E> Executor for &E
where
    E: Executor,
{
    fn execute(
        &self,
        code: &str,
        inputs: &Values,
    ) -> impl Future<Output = Result<ExecutionResult, ExecError>> {
        (**self).execute(code, inputs)
    }
}

impl<E> Executor for Rc<E>
where
    E: Executor,
{
    fn execute(
        &self,
        code: &str,
        inputs: &Values,
    ) -> impl Future<Output = Result<ExecutionResult, ExecError>> {
        (**self).execute(code, inputs)
    }
}

/// Create an [`Executor`] from a synchronous function.
pub fn from_fn<F>(f: F) -> FnExecutor<F>
where
    F: Fn(&str, &Values) -> Result<ExecutionResult, ExecError>,
{
    FnExecutor(f)
}
