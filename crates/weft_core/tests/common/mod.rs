// A tiny line-based script language for driving the controller in tests.
//
// Each non-empty line is one statement:
//
// - `out NAME = EXPR` where `EXPR` is a number, a name, or `NAME OP NUMBER`
//   with `OP` one of `+ - * /`. Referring to an unknown name is an error.
// - `slider NAME DEFAULT` declares a slider and binds its value to `NAME`.
// - `log TEXT` and `warn TEXT` collect a log line or a warning.
// - `fail MESSAGE` fails with the given error.
// - `failsilent` fails without saying why.
// - `fault MESSAGE` raises an `ExecError`.
// - `gate NAME` suspends until the matching sender from
//   `ScriptExecutor::gate` fires. Ungated names pass straight through.

#![allow(dead_code)]

use futures::channel::oneshot;
use std::{cell::RefCell, collections::HashMap, future::Future};
use weft_core::{
    ExecError, ExecutionResult, Executor,
    node::{Control, ControlKind, ErrorInfo, Value, Values},
};

/// A single call made to the executor.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub code: String,
    pub inputs: Values,
}

#[derive(Debug, Default)]
pub struct ScriptExecutor {
    calls: RefCell<Vec<Call>>,
    gates: RefCell<HashMap<String, oneshot::Receiver<()>>>,
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// The number of calls whose code contains the given marker.
    pub fn count(&self, marker: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.code.contains(marker))
            .count()
    }

    /// The last call whose code contains the given marker.
    pub fn last(&self, marker: &str) -> Option<Call> {
        self.calls
            .borrow()
            .iter()
            .rev()
            .find(|c| c.code.contains(marker))
            .cloned()
    }

    /// Hold any `gate NAME` statement until the returned sender fires.
    pub fn gate(&self, name: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(name.to_string(), rx);
        tx
    }

    async fn run(&self, code: &str, inputs: &Values) -> Result<ExecutionResult, ExecError> {
        self.calls.borrow_mut().push(Call {
            code: code.to_string(),
            inputs: inputs.clone(),
        });
        let mut env = inputs.clone();
        let mut result = ExecutionResult::success(Values::new());
        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
            match word {
                "gate" => {
                    let rx = self.gates.borrow_mut().remove(rest);
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                }
                "out" => {
                    let Some((name, expr)) = rest.split_once(" = ") else {
                        return Ok(fail(result, format!("malformed output `{rest}`")));
                    };
                    match eval(expr, &env) {
                        Ok(value) => {
                            env.insert(name.to_string(), value.clone());
                            result.outputs.insert(name.to_string(), value);
                        }
                        Err(msg) => return Ok(fail(result, msg)),
                    }
                }
                "slider" => {
                    let mut parts = rest.split_whitespace();
                    let (Some(name), Some(default)) = (parts.next(), parts.next()) else {
                        return Ok(fail(result, format!("malformed slider `{rest}`")));
                    };
                    let Ok(default) = default.parse::<f64>() else {
                        return Ok(fail(result, format!("bad default `{default}`")));
                    };
                    let mut control = Control {
                        min: Some(0.0),
                        max: Some(10.0),
                        step: Some(1.0),
                        ..Control::new(name, ControlKind::Slider, number(default))
                    };
                    let value = match inputs.get(name) {
                        Some(input) if *input != control.default_value => {
                            control.current_value = Some(input.clone());
                            input.clone()
                        }
                        _ => control.default_value.clone(),
                    };
                    env.insert(name.to_string(), value);
                    result.controls.push(control);
                }
                "log" => result.logs.push(rest.to_string()),
                "warn" => result.warnings.push(ErrorInfo::new(rest)),
                "fail" => return Ok(fail(result, rest.to_string())),
                "failsilent" => {
                    result.success = false;
                    result.outputs.clear();
                    return Ok(result);
                }
                "fault" => return Err(ExecError::host(rest)),
                _ => return Ok(fail(result, format!("unknown statement `{line}`"))),
            }
        }
        Ok(result)
    }
}

impl Executor for ScriptExecutor {
    fn execute(
        &self,
        code: &str,
        inputs: &Values,
    ) -> impl Future<Output = Result<ExecutionResult, ExecError>> {
        self.run(code, inputs)
    }
}

/// Initialise logging for the test binary. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Shorthand for building a `Values` map.
pub fn values<const N: usize>(entries: [(&str, Value); N]) -> Values {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn fail(mut result: ExecutionResult, message: String) -> ExecutionResult {
    result.success = false;
    result.outputs.clear();
    result.errors.push(ErrorInfo::new(message));
    result
}

fn eval(expr: &str, env: &Values) -> Result<Value, String> {
    let atom = |s: &str| -> Result<f64, String> {
        if let Ok(n) = s.parse::<f64>() {
            return Ok(n);
        }
        match env.get(s) {
            Some(v) => v.as_f64().ok_or_else(|| format!("`{s}` is not a number")),
            None => Err(format!("`{s}` is not defined")),
        }
    };
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    let n = match tokens[..] {
        [a] => atom(a)?,
        [a, op, b] => {
            let (a, b) = (atom(a)?, atom(b)?);
            match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                _ => return Err(format!("unknown operator `{op}`")),
            }
        }
        _ => return Err(format!("malformed expression `{expr}`")),
    };
    Ok(number(n))
}

/// Integral numbers are kept as integers.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}
