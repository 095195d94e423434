//! Weather observation records and their feature vectors.
//!
//! An observation is kept as the JSON object it arrived as, so every field the model does not
//! read is re-emitted verbatim. Only `temperature` and `precipitation` are interpreted.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{error::FeatureError, pipeline::ClusterAssignment};

/// Number of modeled features.
pub const FEATURES: usize = 2;

/// Modeled features, in order: temperature, precipitation probability.
pub type FeatureVector = [f64; FEATURES];

const LOCATION: &str = "city";
const START: &str = "start";
const END: &str = "end";
const TEMPERATURE: &str = "temperature";
const PRECIPITATION: &str = "precipitation";
const VALUE: &str = "value";
const CLUSTER: &str = "cluster";

/// One weather record for one location and one forecast period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation(Map<String, Value>);

impl Observation {
    /// Decodes a JSON object payload.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Encodes the record, annotation included.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// The location identifier, when it is a string.
    pub fn location(&self) -> Option<&str> {
        self.0.get(LOCATION).and_then(Value::as_str)
    }

    /// The forecast period bounds, when present.
    pub fn period(&self) -> (Option<&str>, Option<&str>) {
        (
            self.0.get(START).and_then(Value::as_str),
            self.0.get(END).and_then(Value::as_str),
        )
    }

    /// Required temperature.
    pub fn temperature(&self) -> Result<f64, FeatureError> {
        match self.0.get(TEMPERATURE) {
            None | Some(Value::Null) => Err(FeatureError::Missing(TEMPERATURE)),
            Some(value) => finite(TEMPERATURE, value),
        }
    }

    /// Precipitation probability. An absent object or a null value carry no signal and read as 0.
    pub fn precipitation(&self) -> Result<f64, FeatureError> {
        match self.0.get(PRECIPITATION) {
            None | Some(Value::Null) => Ok(0.),
            Some(Value::Object(precipitation)) => match precipitation.get(VALUE) {
                None | Some(Value::Null) => Ok(0.),
                Some(value) => finite(PRECIPITATION, value),
            },
            Some(value) => finite(PRECIPITATION, value),
        }
    }

    /// Replaces a null precipitation value by 0, in place.
    pub fn normalize_precipitation(&mut self) {
        if let Some(Value::Object(precipitation)) = self.0.get_mut(PRECIPITATION) {
            match precipitation.get_mut(VALUE) {
                Some(value) if value.is_null() => *value = json!(0),
                _ => {}
            }
        }
    }

    /// Extracts the feature vector.
    pub fn features(&self) -> Result<FeatureVector, FeatureError> {
        Ok([self.temperature()?, self.precipitation()?])
    }

    /// Sets the `cluster` field, or removes it when no cluster could be assigned.
    pub fn annotate(&mut self, assignment: Option<ClusterAssignment>) {
        match assignment {
            Some(cluster) => {
                self.0.insert(CLUSTER.into(), json!(cluster.index()));
            }
            None => {
                self.0.remove(CLUSTER);
            }
        }
    }

    /// Gets a field of the record.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

fn finite(name: &'static str, value: &Value) -> Result<f64, FeatureError> {
    match value.as_f64() {
        Some(x) if x.is_finite() => Ok(x),
        _ => Err(FeatureError::NotNumeric {
            name,
            value: value.clone(),
        }),
    }
}
