use serde::de::DeserializeOwned;
use serde_json::Value;

/// Distinguishes a field that was left out of a PATCH body from one that
/// was explicitly set to null.
#[derive(Debug, PartialEq)]
pub enum NullableValue<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> NullableValue<T> {
    /// `None` when omitted, `Some(None)` when cleared.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            NullableValue::Omitted => None,
            NullableValue::Null => Some(None),
            NullableValue::Value(value) => Some(Some(value)),
        }
    }
}

pub fn classify_nullable<T: DeserializeOwned>(
    optional_value: Option<&Value>,
) -> Result<NullableValue<T>, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(other) => serde_json::from_value(other.clone())
            .map(NullableValue::Value)
            .map_err(|err| format!("unexpected value {other}: {err}")),
    }
}
