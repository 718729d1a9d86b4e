//! Common types used across fedsave modules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One model tensor, flattened, in the model's parameter order.
pub type NDArray = Vec<f32>;

/// Federated round number. Round 0 is the initial evaluation slot.
pub type Round = u64;

/// A configuration or metrics value exchanged with clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Scalar {
    /// Integer value, if this scalar holds one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

/// Per-round instructions sent to clients.
pub type Config = HashMap<String, Scalar>;

/// Metrics returned by clients or produced by aggregation.
pub type Metrics = HashMap<String, Scalar>;

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_untagged_json() {
        let mut config = Config::new();
        config.insert("batch_size".to_string(), Scalar::from(32));
        config.insert("lr".to_string(), Scalar::from(0.5));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["batch_size"], 32);
        assert_eq!(json["lr"], 0.5);

        let parsed: Config = serde_json::from_value(json).unwrap();
        assert_eq!(parsed["batch_size"].as_int(), Some(32));
    }

    #[test]
    fn test_scalar_as_float_widens_ints() {
        assert_eq!(Scalar::Int(5).as_float(), Some(5.0));
        assert_eq!(Scalar::Str("x".to_string()).as_float(), None);
    }
}
