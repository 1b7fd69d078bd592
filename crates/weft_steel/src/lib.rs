//! A [`weft_core::Executor`] that runs node code as [Steel] scheme.
//!
//! Every execution gets a fresh [`Engine`]. Each input is bound as a global of
//! the same name, and node code reports back through a handful of builtins:
//!
//! - `(output name value)` records a named output.
//! - `(log/info value)` and `(log/warn value)` collect a log line or a warning.
//! - `(slider name default min max step)`, `(input name default)` and
//!   `(switch name default)` declare a control and evaluate to its value.
//!
//! [Steel]: https://github.com/mattwparas/steel

use std::{
    future::Future,
    sync::{Arc, Mutex},
};
use steel::{
    SteelVal,
    steel_vm::{engine::Engine, register_fn::RegisterFn},
};
use weft_core::{
    ExecError, ExecutionResult, Executor,
    node::{Control, ControlKind, ErrorInfo, Values},
};

pub use convert::ConvertError;

pub mod convert;

/// Runs node code in a fresh steel VM.
#[derive(Clone, Debug, Default)]
pub struct SteelExecutor {
    /// Code run before every node, e.g. shared helper definitions.
    prelude: Option<String>,
}

/// Everything the builtins collect during a single execution.
#[derive(Debug, Default)]
struct Capture {
    outputs: Values,
    controls: Vec<Control>,
    logs: Vec<String>,
    warnings: Vec<ErrorInfo>,
    errors: Vec<ErrorInfo>,
}

/// State shared by the registered builtins.
#[derive(Clone)]
struct Builtins {
    capture: Arc<Mutex<Capture>>,
    inputs: Arc<Values>,
}

impl SteelExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the given code before every node.
    pub fn with_prelude(prelude: impl Into<String>) -> Self {
        SteelExecutor {
            prelude: Some(prelude.into()),
        }
    }

    /// Run the given code to completion.
    ///
    /// Errors in the code itself are reported through the result. Only a
    /// broken prelude is a fault.
    pub fn run(&self, code: &str, inputs: &Values) -> Result<ExecutionResult, ExecError> {
        let builtins = Builtins {
            capture: Arc::new(Mutex::new(Capture::default())),
            inputs: Arc::new(inputs.clone()),
        };
        let mut vm = Engine::new_base();
        for (name, value) in inputs {
            match convert::to_steel(value) {
                Ok(val) => {
                    vm.register_value(name, val);
                }
                Err(err) => builtins.warn(format!("input `{name}` is unavailable: {err}")),
            }
        }
        builtins.register(&mut vm);

        if let Some(prelude) = &self.prelude {
            vm.run(prelude.clone()).map_err(|e| ExecError::Host {
                message: format!("failed to run prelude: {e}"),
                stack: None,
            })?;
        }
        let run = vm.run(code.to_string());

        let capture = {
            let mut capture = builtins
                .capture
                .lock()
                .map_err(|_| ExecError::host("capture lock poisoned"))?;
            std::mem::take(&mut *capture)
        };
        let mut errors = capture.errors;
        if let Err(e) = run {
            log::trace!("steel error: {e}");
            errors.insert(0, ErrorInfo::new(e.to_string()));
        }
        let result = ExecutionResult {
            success: errors.is_empty(),
            outputs: capture.outputs,
            controls: capture.controls,
            logs: capture.logs,
            errors,
            warnings: capture.warnings,
        };
        Ok(result)
    }
}

impl Executor for SteelExecutor {
    fn execute(
        &self,
        code: &str,
        inputs: &Values,
    ) -> impl Future<Output = Result<ExecutionResult, ExecError>> {
        std::future::ready(self.run(code, inputs))
    }
}

impl Builtins {
    fn register(&self, vm: &mut Engine) {
        let b = self.clone();
        vm.register_fn("output", move |name: SteelVal, value: SteelVal| {
            b.output(&name, &value)
        });
        let b = self.clone();
        vm.register_fn("log/info", move |value: SteelVal| b.log(convert::text(&value)));
        let b = self.clone();
        vm.register_fn("log/warn", move |value: SteelVal| b.warn(convert::text(&value)));
        let b = self.clone();
        vm.register_fn(
            "slider",
            move |name: SteelVal, default: SteelVal, min: SteelVal, max: SteelVal, step: SteelVal| {
                let range = [&min, &max, &step].map(convert::number);
                b.declare(&name, ControlKind::Slider, default, range)
            },
        );
        let b = self.clone();
        vm.register_fn("input", move |name: SteelVal, default: SteelVal| {
            b.declare(&name, ControlKind::Input, default, [None; 3])
        });
        let b = self.clone();
        vm.register_fn("switch", move |name: SteelVal, default: SteelVal| {
            b.declare(&name, ControlKind::Switch, default, [None; 3])
        });
    }

    fn with_capture(&self, f: impl FnOnce(&mut Capture)) {
        if let Ok(mut capture) = self.capture.lock() {
            f(&mut capture);
        }
    }

    fn output(&self, name: &SteelVal, value: &SteelVal) {
        let name = convert::text(name);
        match convert::to_json(value) {
            Ok(value) => self.with_capture(|c| {
                c.outputs.insert(name, value);
            }),
            Err(err) => self.error(format!("output `{name}`: {err}")),
        }
    }

    fn log(&self, line: String) {
        self.with_capture(|c| c.logs.push(line));
    }

    fn warn(&self, message: String) {
        self.with_capture(|c| c.warnings.push(ErrorInfo::new(message)));
    }

    fn error(&self, message: String) {
        self.with_capture(|c| c.errors.push(ErrorInfo::new(message)));
    }

    /// Declare a control and produce the value it resolves to.
    ///
    /// The input of the same name wins over the default.
    fn declare(
        &self,
        name: &SteelVal,
        kind: ControlKind,
        default: SteelVal,
        [min, max, step]: [Option<f64>; 3],
    ) -> SteelVal {
        let name = convert::text(name);
        let default_value = match convert::to_json(&default) {
            Ok(value) => value,
            Err(err) => {
                self.error(format!("control `{name}`: {err}"));
                return default;
            }
        };
        let mut control = Control {
            min,
            max,
            step,
            ..Control::new(name.clone(), kind, default_value)
        };
        let mut val = default;
        if let Some(input) = self.inputs.get(&name) {
            if *input != control.default_value {
                match convert::to_steel(input) {
                    Ok(input_val) => {
                        control.current_value = Some(input.clone());
                        val = input_val;
                    }
                    Err(err) => self.warn(format!("control `{name}`: {err}")),
                }
            }
        }
        self.with_capture(|c| match c.controls.iter_mut().find(|x| x.name == name) {
            Some(existing) => *existing = control,
            None => c.controls.push(control),
        });
        val
    }
}
