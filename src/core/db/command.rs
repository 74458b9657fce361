/// Statement Request Module
///
/// A `StatementRequest` is the statement text plus its ordered parameters.
/// Binding happens in request order; null input values are normalized to
/// `Value::Null` before they reach the backend.

use super::value::Value;
use crate::core::{GatewayError, Result};
use rusqlite::Statement;
use tracing::trace;

/// Direction of a bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    Input,
    /// SQLite has no output parameters: bound as a NULL placeholder
    Output,
    InputOutput,
}

/// A single statement parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Placeholder name (`:id`, `@id`, `$id` or bare `id`); empty binds by position
    pub name: String,
    pub direction: ParameterDirection,
    pub value: Option<Value>,
}

impl Parameter {
    pub fn input(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Parameter {
            name: name.into(),
            direction: ParameterDirection::Input,
            value: Some(value.into()),
        }
    }

    /// A positional input parameter
    pub fn positional(value: impl Into<Value>) -> Self {
        Self::input("", value)
    }

    pub fn new(name: impl Into<String>, direction: ParameterDirection, value: Option<Value>) -> Self {
        Parameter {
            name: name.into(),
            direction,
            value,
        }
    }

    /// Replaces an absent input or input-output value with `Value::Null`.
    pub fn normalize(&mut self) {
        if matches!(self.direction, ParameterDirection::Input | ParameterDirection::InputOutput)
            && self.value.is_none()
        {
            self.value = Some(Value::Null);
        }
    }

    fn bound_value(&self) -> &Value {
        self.value.as_ref().unwrap_or(&Value::Null)
    }

    fn placeholder(&self) -> Option<String> {
        let name = self.name.trim();
        if name.is_empty() {
            None
        } else if name.starts_with([':', '@', '$', '?']) {
            Some(name.to_string())
        } else {
            Some(format!(":{}", name))
        }
    }
}

/// Statement text with its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRequest {
    pub text: String,
    pub parameters: Vec<Parameter>,
}

impl StatementRequest {
    pub fn new(text: impl Into<String>) -> Self {
        StatementRequest {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// Appends a parameter, normalizing a null input value on the way in.
    pub fn param(mut self, mut parameter: Parameter) -> Self {
        parameter.normalize();
        self.parameters.push(parameter);
        self
    }

    /// Shorthand for a named input parameter.
    pub fn bind(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.param(Parameter::input(name, value))
    }

    pub(crate) fn normalized(&self) -> Vec<Parameter> {
        let mut parameters = self.parameters.clone();
        parameters.iter_mut().for_each(Parameter::normalize);
        parameters
    }
}

impl From<&str> for StatementRequest {
    fn from(text: &str) -> Self {
        StatementRequest::new(text)
    }
}

impl From<String> for StatementRequest {
    fn from(text: String) -> Self {
        StatementRequest::new(text)
    }
}

/// Binds `parameters` to `stmt` in order.
///
/// Named parameters go to their placeholder; unnamed parameters bind to the
/// slot matching their position in the list.
pub(crate) fn bind_parameters(stmt: &mut Statement<'_>, parameters: &[Parameter]) -> Result<()> {
    for (position, parameter) in parameters.iter().enumerate() {
        let index = match parameter.placeholder() {
            Some(name) => stmt.parameter_index(&name)?.ok_or_else(|| {
                GatewayError::Binding(format!("statement has no parameter named '{}'", name))
            })?,
            None => position + 1,
        };
        if index > stmt.parameter_count() {
            return Err(GatewayError::Binding(format!(
                "parameter {} is out of range: statement takes {}",
                index,
                stmt.parameter_count()
            )));
        }

        trace!(index, direction = ?parameter.direction, "binding parameter");
        stmt.raw_bind_parameter(index, parameter.bound_value())?;
    }
    Ok(())
}
