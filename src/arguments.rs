//! Tool argument decoding.
//!
//! Arguments arrive as a loosely typed JSON object. [`Arguments`] checks them
//! against the tool's input schema and extracts typed values, naming the
//! offending field in every error so the calling agent can fix its call.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Borrowed view over a tool call's argument object.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Arguments<'a> {
    /// Wrap an argument object.
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    /// Check every name in the schema's `required` list is present and not null.
    pub fn check_required(&self, schema: &Value) -> Result<()> {
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for name in required.iter().filter_map(Value::as_str) {
            match self.map.get(name) {
                None | Some(Value::Null) => return Err(Error::MissingArgument(name.to_string())),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// A required, non-blank string.
    pub fn required_str(&self, field: &str) -> Result<String> {
        match self.map.get(field) {
            None | Some(Value::Null) => Err(Error::MissingArgument(field.to_string())),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Err(Error::MissingArgument(field.to_string()))
            }
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(Error::invalid_argument(
                field,
                format!("expected a string, got {}", type_name(other)),
            )),
        }
    }

    /// A required, non-empty array of non-blank strings.
    pub fn required_str_list(&self, field: &str) -> Result<Vec<String>> {
        let items = self.optional_str_list(field)?;
        if items.is_empty() {
            return Err(Error::invalid_argument(field, "at least one item is required"));
        }
        Ok(items)
    }

    /// An optional array of non-blank strings; absent or null means empty.
    pub fn optional_str_list(&self, field: &str) -> Result<Vec<String>> {
        let items = match self.map.get(field) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::invalid_argument(
                    field,
                    format!("expected an array of strings, got {}", type_name(other)),
                ))
            }
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
                Value::String(_) => Err(Error::invalid_argument(
                    field,
                    format!("item {i} is empty"),
                )),
                other => Err(Error::invalid_argument(
                    field,
                    format!("item {i} should be a string, got {}", type_name(other)),
                )),
            })
            .collect()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
