//! Parameter metadata for detector, risk and history configs
//!
//! This module provides metadata about tunable parameters, enabling:
//! - Grid search optimization
//! - Parameter documentation
//! - Construction of configs from flat key/value maps (settings files, UIs)
//!
//! # Example
//!
//! ```rust
//! use wyckoff_spring::params::{ParamMeta, ParamType, Parameterized};
//! use wyckoff_spring::prelude::*;
//!
//! let params = RiskConfig::param_meta();
//! for param in params {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{Period, Ratio, Result, WyckoffError};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value in 0.0..=1.0
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Unbounded positive real (multiples, point thresholds)
  Value,
}

/// Metadata for a single config parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "max_volume_ratio")
  pub name: &'static str,
  /// Parameter type
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Create a new ParamMeta for a positive real parameter
  pub const fn value(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Value, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(WyckoffError::InvalidValue("Parameter cannot be NaN or infinite"));
    }
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(WyckoffError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(WyckoffError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Value => {
        if value <= 0.0 {
          return Err(WyckoffError::InvalidValue("Value must be positive"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED CONFIG TRAIT
// ============================================================

/// Trait for configs that support parameterization
///
/// Implementing this trait enables:
/// - Discovery of available parameters
/// - Creation of configs with custom parameter values
/// - Grid search optimization
pub trait Parameterized: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a config with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the config's name, used as a key prefix by callers
  fn config_name() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 1.0 || value.fract() != 0.0 {
    return Err(WyckoffError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Helper to get a positive finite value from params with default fallback
pub fn get_value(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() || value <= 0.0 {
    return Err(WyckoffError::InvalidValue("Value must be positive and finite"));
  }
  Ok(value)
}

/// Validate every key in `params` against `meta`, rejecting unknown names.
pub fn check_params(meta: &[ParamMeta], params: &HashMap<&str, f64>) -> Result<()> {
  for (key, value) in params {
    let param = meta
      .iter()
      .find(|m| m.name == *key)
      .ok_or_else(|| WyckoffError::InvalidConfig(format!("unknown parameter `{key}`")))?;
    param.validate(*value)?;
  }
  Ok(())
}

// ============================================================
// TESTS
// ============================================================
