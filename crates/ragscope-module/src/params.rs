//! Typed accessors for module parameters.

use crate::error::ModuleError;
use crate::module::Params;

/// Numeric parameter, or `default` when absent. Present but non-numeric is an
/// error.
pub fn param_f64(params: &Params, key: &str, default: f64) -> Result<f64, ModuleError> {
  match params.get(key) {
    None | Some(serde_json::Value::Null) => Ok(default),
    Some(value) => value
      .as_f64()
      .ok_or_else(|| ModuleError::invalid(key, format!("expected a number, got {}", value))),
  }
}

/// Unsigned integer parameter, or `default` when absent.
pub fn param_u64(params: &Params, key: &str, default: u64) -> Result<u64, ModuleError> {
  match params.get(key) {
    None | Some(serde_json::Value::Null) => Ok(default),
    Some(value) => value.as_u64().ok_or_else(|| {
      ModuleError::invalid(key, format!("expected a non-negative integer, got {}", value))
    }),
  }
}

/// String parameter, `None` when absent or null.
pub fn param_str<'a>(params: &'a Params, key: &str) -> Result<Option<&'a str>, ModuleError> {
  match params.get(key) {
    None | Some(serde_json::Value::Null) => Ok(None),
    Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
    Some(value) => Err(ModuleError::invalid(
      key,
      format!("expected a string, got {}", value),
    )),
  }
}
