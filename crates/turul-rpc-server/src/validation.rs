//! Declarative parameter validation
//!
//! Rules are attached to parameters at registration and checked after
//! authorization, immediately before the method runs. The first failing rule
//! produces a `BadRequest` with the message `"<param>: <reason>"`.

use regex::Regex;
use serde_json::Value;

use crate::descriptor::ParamDescriptor;

#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// Value must not be `null`
    Required,
    /// Numeric bounds, inclusive
    Range { min: Option<f64>, max: Option<f64> },
    /// Minimum length of a string (in chars) or array
    MinLength(usize),
    /// Maximum length of a string (in chars) or array
    MaxLength(usize),
    /// String must match the expression
    Pattern(Regex),
    /// Value must equal one of the listed values
    OneOf(Vec<Value>),
}

impl ValidationRule {
    pub fn range(min: f64, max: f64) -> Self {
        ValidationRule::Range {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn pattern(expression: &str) -> Result<Self, regex::Error> {
        Ok(ValidationRule::Pattern(Regex::new(expression)?))
    }

    /// Check a single value. `null` only fails `Required`.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return match self {
                ValidationRule::Required => Err("value is required".to_string()),
                _ => Ok(()),
            };
        }

        match self {
            ValidationRule::Required => Ok(()),
            ValidationRule::Range { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Err("expected a number".to_string());
                };
                if let Some(min) = min
                    && n < *min
                {
                    return Err(format!("must be at least {}", min));
                }
                if let Some(max) = max
                    && n > *max
                {
                    return Err(format!("must be at most {}", max));
                }
                Ok(())
            }
            ValidationRule::MinLength(min) => match length_of(value) {
                Some(len) if len < *min => Err(format!("length must be at least {}", min)),
                Some(_) => Ok(()),
                None => Err("expected a string or array".to_string()),
            },
            ValidationRule::MaxLength(max) => match length_of(value) {
                Some(len) if len > *max => Err(format!("length must be at most {}", max)),
                Some(_) => Ok(()),
                None => Err("expected a string or array".to_string()),
            },
            ValidationRule::Pattern(regex) => match value.as_str() {
                Some(s) if regex.is_match(s) => Ok(()),
                Some(_) => Err(format!("must match pattern '{}'", regex.as_str())),
                None => Err("expected a string".to_string()),
            },
            ValidationRule::OneOf(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    Err(format!("must be one of {}", Value::Array(allowed.clone())))
                }
            }
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        _ => None,
    }
}

/// Run every parameter's rules against the positional arguments
pub fn validate_params(params: &[ParamDescriptor], args: &[Value]) -> Result<(), String> {
    for (param, value) in params.iter().zip(args) {
        for rule in param.rules() {
            rule.check(value)
                .map_err(|reason| format!("{}: {}", param.name(), reason))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ParamType, ValueType};
    use serde_json::json;

    #[test]
    fn test_required() {
        assert!(ValidationRule::Required.check(&Value::Null).is_err());
        assert!(ValidationRule::Required.check(&json!("")).is_ok());
        // Other rules let null through
        assert!(ValidationRule::MinLength(3).check(&Value::Null).is_ok());
    }

    #[test]
    fn test_range() {
        let rule = ValidationRule::range(1.0, 10.0);
        assert!(rule.check(&json!(5)).is_ok());
        assert_eq!(rule.check(&json!(0)).unwrap_err(), "must be at least 1");
        assert_eq!(rule.check(&json!(11.5)).unwrap_err(), "must be at most 10");
        assert!(rule.check(&json!("5")).is_err());
    }

    #[test]
    fn test_lengths_count_chars() {
        let rule = ValidationRule::MaxLength(3);
        assert!(rule.check(&json!("héé")).is_ok());
        assert!(rule.check(&json!("four")).is_err());
        assert!(rule.check(&json!([1, 2, 3, 4])).is_err());
        assert!(ValidationRule::MinLength(1).check(&json!([])).is_err());
    }

    #[test]
    fn test_pattern_and_one_of() {
        let rule = ValidationRule::pattern(r"^[a-z]+:[0-9]+$").unwrap();
        assert!(rule.check(&json!("user:42")).is_ok());
        assert!(rule.check(&json!("User 42")).is_err());

        let rule = ValidationRule::OneOf(vec![json!("asc"), json!("desc")]);
        assert!(rule.check(&json!("asc")).is_ok());
        assert_eq!(
            rule.check(&json!("up")).unwrap_err(),
            r#"must be one of ["asc","desc"]"#
        );
    }

    #[test]
    fn test_validate_params_reports_param_name() {
        let params = vec![
            ParamDescriptor::new("key", ParamType::Value(ValueType::String))
                .rule(ValidationRule::MinLength(1)),
            ParamDescriptor::new("ttl", ParamType::Value(ValueType::Int))
                .rule(ValidationRule::range(1.0, 3600.0)),
        ];

        assert!(validate_params(&params, &[json!("k"), json!(60)]).is_ok());
        assert_eq!(
            validate_params(&params, &[json!(""), json!(60)]).unwrap_err(),
            "key: length must be at least 1"
        );
        assert_eq!(
            validate_params(&params, &[json!("k"), json!(0)]).unwrap_err(),
            "ttl: must be at least 1"
        );
    }
}
