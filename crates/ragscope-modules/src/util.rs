//! Helpers shared by the built-in modules.

use ragscope_module::{ModuleError, ModuleInputs, ModuleOutput};
use ragscope_store::TestCaseResult;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Round to 4 decimal places.
pub(crate) fn round4(value: f64) -> f64 {
  (value * 10_000.0).round() / 10_000.0
}

/// Arithmetic mean, 0.0 for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  values.iter().sum::<f64>() / values.len() as f64
}

/// `value / total`, 0.0 when `total` is zero.
pub(crate) fn ratio(value: usize, total: usize) -> f64 {
  if total == 0 {
    0.0
  } else {
    value as f64 / total as f64
  }
}

/// Convert a JSON object literal into a module output.
pub(crate) fn object(value: Value) -> ModuleOutput {
  match value {
    Value::Object(map) => map,
    _ => ModuleOutput::new(),
  }
}

/// Deserialize `field` of an upstream output.
pub(crate) fn field<T: DeserializeOwned>(output: &ModuleOutput, field: &str) -> Result<T, ModuleError> {
  let value = output
    .get(field)
    .ok_or_else(|| ModuleError::MissingInput(field.to_string()))?;
  serde_json::from_value(value.clone()).map_err(|e| ModuleError::invalid(field, e.to_string()))
}

/// Deserialize `field` from the first upstream output that carries it.
pub(crate) fn upstream_field<T: DeserializeOwned>(
  inputs: &ModuleInputs,
  name: &str,
) -> Result<T, ModuleError> {
  let output = inputs
    .first_with(name)
    .ok_or_else(|| ModuleError::MissingInput(name.to_string()))?;
  field(output, name)
}

/// Like [`upstream_field`] but absent fields yield `None`.
pub(crate) fn optional_upstream_field<T: DeserializeOwned>(
  inputs: &ModuleInputs,
  name: &str,
) -> Result<Option<T>, ModuleError> {
  match inputs.first_with(name) {
    Some(output) => field(output, name).map(Some),
    None => Ok(None),
  }
}

/// Test cases emitted by `data_loader`.
pub(crate) fn upstream_cases(inputs: &ModuleInputs) -> Result<Vec<TestCaseResult>, ModuleError> {
  upstream_field(inputs, "cases")
}

/// Numeric `field` of an output.
pub(crate) fn number(output: &ModuleOutput, name: &str) -> Result<f64, ModuleError> {
  output
    .get(name)
    .and_then(Value::as_f64)
    .ok_or_else(|| ModuleError::invalid(name, "expected a number"))
}
