//! Conversion between domain values and their storage representation,
//! selected by column type.

use crate::error::{OrmError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use objectquel_api::{ColumnType, DATETIME_FORMAT, Value};
use std::collections::HashMap;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub trait ValueNormalizer {
    /// Domain value -> value written to the database.
    fn normalize(&self, value: &Value) -> Result<Value>;

    /// Database value -> domain value.
    fn denormalize(&self, value: &Value) -> Result<Value>;
}

fn invalid(column_type: ColumnType, message: impl Into<String>) -> OrmError {
    OrmError::Normalize {
        column_type: format!("{column_type:?}").to_lowercase(),
        message: message.into(),
    }
}

/// Booleans are stored as 0/1.
pub struct BooleanNormalizer;

impl ValueNormalizer for BooleanNormalizer {
    fn normalize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Int(i) => Ok(Value::Int(i64::from(*i != 0))),
            other => Err(invalid(ColumnType::Boolean, format!("'{other}' is not a boolean"))),
        }
    }

    fn denormalize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(i) => Ok(Value::Bool(*i != 0)),
            Value::Float(f) => Ok(Value::Bool(*f != 0.0)),
            Value::String(s) => match s.trim() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" | "" => Ok(Value::Bool(false)),
                other => Err(invalid(ColumnType::Boolean, format!("'{other}' is not a boolean"))),
            },
            other => Err(invalid(ColumnType::Boolean, format!("'{other}' is not a boolean"))),
        }
    }
}

/// Timestamps and dates as formatted strings.
pub struct DateTimeNormalizer {
    column_type: ColumnType,
    format: &'static str,
}

impl DateTimeNormalizer {
    pub fn datetime() -> Self {
        Self {
            column_type: ColumnType::DateTime,
            format: DATETIME_FORMAT,
        }
    }

    pub fn date() -> Self {
        Self {
            column_type: ColumnType::Date,
            format: DATE_FORMAT,
        }
    }

    fn parse(&self, text: &str) -> Result<NaiveDateTime> {
        let text = text.trim();
        if self.column_type == ColumnType::Date {
            return NaiveDate::parse_from_str(text, self.format)
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
                .map_err(|e| invalid(self.column_type, format!("'{text}': {e}")));
        }
        NaiveDateTime::parse_from_str(text, self.format)
            .map_err(|e| invalid(self.column_type, format!("'{text}': {e}")))
    }
}

impl ValueNormalizer for DateTimeNormalizer {
    fn normalize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::DateTime(dt) => Ok(Value::String(dt.format(self.format).to_string())),
            Value::String(s) => {
                let parsed = self.parse(s)?;
                Ok(Value::String(parsed.format(self.format).to_string()))
            }
            other => Err(invalid(self.column_type, format!("'{other}' is not a timestamp"))),
        }
    }

    fn denormalize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
            Value::String(s) => self.parse(s).map(Value::DateTime),
            other => Err(invalid(self.column_type, format!("'{other}' is not a timestamp"))),
        }
    }
}

/// Structured values stored as JSON text.
pub struct JsonNormalizer;

impl ValueNormalizer for JsonNormalizer {
    fn normalize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            other => serde_json::to_string(&other.to_json())
                .map(Value::String)
                .map_err(|e| invalid(ColumnType::Json, e.to_string())),
        }
    }

    fn denormalize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(text) => serde_json::from_str::<serde_json::Value>(text)
                .map(Value::from)
                .map_err(|e| invalid(ColumnType::Json, e.to_string())),
            other => Ok(other.clone()),
        }
    }
}

/// GUIDs are validated and stored in lowercase hyphenated form.
pub struct GuidNormalizer;

impl GuidNormalizer {
    fn canonical(value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => uuid::Uuid::parse_str(s.trim())
                .map(|u| Value::String(u.hyphenated().to_string()))
                .map_err(|e| invalid(ColumnType::Guid, format!("'{s}': {e}"))),
            other => Err(invalid(ColumnType::Guid, format!("'{other}' is not a GUID"))),
        }
    }
}

impl ValueNormalizer for GuidNormalizer {
    fn normalize(&self, value: &Value) -> Result<Value> {
        Self::canonical(value)
    }

    fn denormalize(&self, value: &Value) -> Result<Value> {
        Self::canonical(value)
    }
}

/// Normalizers by column type. Types without one pass values through.
pub struct NormalizerRegistry {
    normalizers: HashMap<ColumnType, Box<dyn ValueNormalizer>>,
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(ColumnType::Boolean, Box::new(BooleanNormalizer));
        registry.register(ColumnType::DateTime, Box::new(DateTimeNormalizer::datetime()));
        registry.register(ColumnType::Date, Box::new(DateTimeNormalizer::date()));
        registry.register(ColumnType::Json, Box::new(JsonNormalizer));
        registry.register(ColumnType::Guid, Box::new(GuidNormalizer));
        registry
    }
}

impl NormalizerRegistry {
    pub fn empty() -> Self {
        Self {
            normalizers: HashMap::new(),
        }
    }

    pub fn register(&mut self, column_type: ColumnType, normalizer: Box<dyn ValueNormalizer>) {
        self.normalizers.insert(column_type, normalizer);
    }

    pub fn normalize(&self, column_type: ColumnType, value: &Value) -> Result<Value> {
        match self.normalizers.get(&column_type) {
            Some(n) => n.normalize(value),
            None => Ok(value.clone()),
        }
    }

    pub fn denormalize(&self, column_type: ColumnType, value: &Value) -> Result<Value> {
        match self.normalizers.get(&column_type) {
            Some(n) => n.denormalize(value),
            None => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_round_through_integers() {
        let registry = NormalizerRegistry::default();
        assert_eq!(
            registry.normalize(ColumnType::Boolean, &Value::Bool(true)).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            registry.denormalize(ColumnType::Boolean, &Value::Int(0)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn datetimes_use_text_format() {
        let registry = NormalizerRegistry::default();
        let stored = Value::from("2024-03-01 12:30:00");
        let domain = registry.denormalize(ColumnType::DateTime, &stored).unwrap();
        assert!(matches!(domain, Value::DateTime(_)));
        assert_eq!(registry.normalize(ColumnType::DateTime, &domain).unwrap(), stored);

        let date = registry
            .denormalize(ColumnType::Date, &Value::from("2024-03-01"))
            .unwrap();
        assert_eq!(
            registry.normalize(ColumnType::Date, &date).unwrap(),
            Value::from("2024-03-01")
        );
        assert!(registry.denormalize(ColumnType::Date, &Value::from("soon")).is_err());
    }

    #[test]
    fn json_is_stored_as_text() {
        let registry = NormalizerRegistry::default();
        let value = Value::List(vec![Value::Int(1), Value::from("a")]);
        let stored = registry.normalize(ColumnType::Json, &value).unwrap();
        assert_eq!(stored, Value::from(r#"[1,"a"]"#));
        assert_eq!(registry.denormalize(ColumnType::Json, &stored).unwrap(), value);
    }

    #[test]
    fn guids_are_validated() {
        let registry = NormalizerRegistry::default();
        let guid = Value::from("67E55044-10B1-426F-9247-BB680E5FE0C8");
        assert_eq!(
            registry.normalize(ColumnType::Guid, &guid).unwrap(),
            Value::from("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
        assert!(matches!(
            registry.normalize(ColumnType::Guid, &Value::from("nope")),
            Err(OrmError::Normalize { .. })
        ));
    }

    #[test]
    fn untyped_columns_pass_through() {
        let registry = NormalizerRegistry::default();
        let value = Value::from("plain");
        assert_eq!(registry.normalize(ColumnType::String, &value).unwrap(), value);
    }
}
