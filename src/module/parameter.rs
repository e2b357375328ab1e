//! Step parameters
//!
//! Parameters reach `configure()` as uninterpreted `(name, value)` strings;
//! the typed accessors fail with an error naming the parameter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StepflowError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Trimmed, lowercased value
    pub fn lowercase_value(&self) -> String {
        self.value.trim().to_lowercase()
    }

    pub fn as_int(&self) -> Result<i64> {
        self.value
            .trim()
            .parse()
            .map_err(|_| self.invalid("expected an integer"))
    }

    /// Accepts true/false, yes/no, on/off and 1/0
    pub fn as_bool(&self) -> Result<bool> {
        match self.lowercase_value().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid("expected a boolean")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.value
            .trim()
            .parse()
            .map_err(|_| self.invalid("expected a number"))
    }

    /// Error naming this parameter, for module-specific validation
    pub fn invalid(&self, reason: &str) -> StepflowError {
        StepflowError::InvalidParameter {
            name: self.name.clone(),
            reason: format!("{reason} (got '{}')", self.value),
        }
    }

    /// Error for a parameter a module does not know
    pub fn unknown(&self, module: &str) -> StepflowError {
        StepflowError::InvalidParameter {
            name: self.name.clone(),
            reason: format!("unknown parameter for module '{module}'"),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        assert_eq!(Parameter::new("threads", " 4 ").as_int().unwrap(), 4);
        assert!(Parameter::new("paired", "Yes").as_bool().unwrap());
        assert!(!Parameter::new("paired", "0").as_bool().unwrap());
        assert_eq!(Parameter::new("ratio", "0.5").as_f64().unwrap(), 0.5);
        assert_eq!(Parameter::new("mode", " FAST ").lowercase_value(), "fast");
    }

    #[test]
    fn errors_name_the_parameter() {
        let err = Parameter::new("threads", "many").as_int().unwrap_err();
        assert_eq!(err.code(), "SF-010");
        assert!(err.to_string().contains("threads"));
        assert!(err.to_string().contains("many"));

        let err = Parameter::new("color", "x").unknown("filterreads");
        assert!(err.to_string().contains("filterreads"));
    }
}
