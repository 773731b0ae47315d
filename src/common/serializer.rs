//! Payload serialization.
//!
//! The [`Serializer`] trait is object safe so the engine can hold it as
//! `Arc<dyn Serializer>`; typed access goes through [`SerializerExt`].

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{EvflowError, Result};

/// Converts values to bytes and back. Every persisted payload and message
/// must round-trip through it unchanged.
pub trait Serializer: Send + Sync {
    /// Name of the wire format, used in logs.
    fn format(&self) -> &'static str;

    fn serialize_value(
        &self,
        value: &JsonValue,
    ) -> Result<Vec<u8>>;

    fn deserialize_value(
        &self,
        bytes: &[u8],
    ) -> Result<JsonValue>;
}

/// Typed helpers over any [`Serializer`].
pub trait SerializerExt {
    fn serialize<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>>;

    fn deserialize<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T>;
}

impl<S: Serializer + ?Sized> SerializerExt for S {
    fn serialize<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>> {
        let value = serde_json::to_value(value)?;
        self.serialize_value(&value)
    }

    fn deserialize<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T> {
        let value = self.deserialize_value(bytes)?;
        serde_json::from_value(value).map_err(|e| EvflowError::Convert(format!("{} payload: {}", self.format(), e)))
    }
}

/// JSON serializer, the default wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn format(&self) -> &'static str {
        "json"
    }

    fn serialize_value(
        &self,
        value: &JsonValue,
    ) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize_value(
        &self,
        bytes: &[u8],
    ) -> Result<JsonValue> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use super::{JsonSerializer, Serializer, SerializerExt};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u64,
        lines: Vec<String>,
        tags: HashMap<String, i32>,
        note: Option<String>,
    }

    #[test]
    fn test_round_trip_struct() {
        let order = Order {
            id: 42,
            lines: vec!["a".to_string(), "b".to_string()],
            tags: HashMap::from([("x".to_string(), -1)]),
            note: None,
        };
        let s = JsonSerializer;
        let bytes = s.serialize(&order).unwrap();
        let back: Order = s.deserialize(&bytes).unwrap();
        assert_eq!(order, back);
    }

    #[test]
    fn test_round_trip_through_trait_object() {
        let s: Box<dyn Serializer> = Box::new(JsonSerializer);
        let bytes = s.serialize(&(1u8, "two".to_string(), 3.5f64)).unwrap();
        let back: (u8, String, f64) = s.deserialize(&bytes).unwrap();
        assert_eq!(back, (1, "two".to_string(), 3.5));
    }

    #[test]
    fn test_deserialize_wrong_type_fails() {
        let s = JsonSerializer;
        let bytes = s.serialize(&"text").unwrap();
        assert!(s.deserialize::<u64>(&bytes).is_err());
    }
}
