//! The per-node evaluation record and the types it is made of.

use serde::{Deserialize, Serialize};

/// Type used to represent a node's ID within a canvas.
///
/// IDs are assigned by the host and are stable across edits.
pub type Id = String;

/// Any value that may flow along an edge or be held by a control.
pub type Value = serde_json::Value;

/// A set of named values, e.g. a node's outputs or the inputs gathered for it.
pub type Values = serde_json::Map<String, Value>;

/// The kind of widget a control is presented with.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Slider,
    Input,
    Switch,
}

/// A named, user-adjustable value declared by a node's own execution.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    /// Unique within the node that declared it.
    pub name: String,
    pub kind: ControlKind,
    /// The value used until the user adjusts the control.
    pub default_value: Value,
    /// The value most recently set by the user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

/// A diagnostic produced while executing a node, either an error or a warning.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Everything known about a node's most recent evaluation.
///
/// Records are only ever replaced whole, so a reader never observes a record
/// that is halfway through an update.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// The node's current source, as last provided by the host.
    pub code: String,
    /// `true` exactly while an execution of this node is in flight.
    pub is_evaluating: bool,
    pub controls: Vec<Control>,
    /// The outputs of the most recent *successful* execution.
    ///
    /// Emptied whenever an execution fails.
    pub outputs: Values,
    pub logs: Vec<String>,
    /// Non-empty only when the most recent execution failed.
    pub errors: Vec<ErrorInfo>,
    pub warnings: Vec<ErrorInfo>,
}

impl Control {
    /// A control of the given kind with no user-set value.
    pub fn new(
        name: impl Into<String>,
        kind: ControlKind,
        default_value: impl Into<Value>,
    ) -> Self {
        Control {
            name: name.into(),
            kind,
            default_value: default_value.into(),
            current_value: None,
            min: None,
            max: None,
            step: None,
        }
    }

    /// Shorthand for a slider with the given range and step.
    pub fn slider(
        name: impl Into<String>,
        default_value: f64,
        min: f64,
        max: f64,
        step: f64,
    ) -> Self {
        Control {
            min: Some(min),
            max: Some(max),
            step: Some(step),
            ..Control::new(name, ControlKind::Slider, default_value)
        }
    }

    /// Produce a copy of this control with the given user-set value.
    pub fn with_current_value(mut self, value: impl Into<Value>) -> Self {
        self.current_value = Some(value.into());
        self
    }

    /// The value this control currently resolves to.
    ///
    /// Shorthand for [`crate::controls::resolve`].
    pub fn value(&self) -> &Value {
        crate::controls::resolve(self)
    }
}

impl ErrorInfo {
    /// A diagnostic with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        ErrorInfo {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Attach a source location.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl Record {
    /// The initial record for a node that has never been evaluated.
    pub fn new(code: impl Into<String>) -> Self {
        Record {
            code: code.into(),
            ..Default::default()
        }
    }

    /// The control with the given name, if declared.
    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.name == name)
    }

    /// Whether the most recent execution failed.
    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl From<&str> for ErrorInfo {
    fn from(message: &str) -> Self {
        ErrorInfo::new(message)
    }
}

impl From<String> for ErrorInfo {
    fn from(message: String) -> Self {
        ErrorInfo::new(message)
    }
}
