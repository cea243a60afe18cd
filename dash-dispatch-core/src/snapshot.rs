//! Read-only views over store state

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::key::{StateKey, Topic};

/// Structured view of one action's derived state
///
/// Mirrors the `<action>_result`, `<action>_error` and `<action>_loading`
/// keys of the store as a single record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ActionSlot {
    /// Data of the last successful run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Message of the last failed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether a run is currently in flight
    pub loading: bool,
}

impl ActionSlot {
    /// Deserialize the stored result into a typed output
    pub fn result_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.result
            .clone()
            .map(serde_json::from_value)
            .transpose()
    }

    /// True when neither a result nor an error has been recorded
    pub fn is_empty(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }
}

/// Point-in-time state of a registered component
///
/// Holds one entry per tracked key (its value, or `None` when absent) plus a
/// synthesized loading entry for every tracked result or error key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentSnapshot {
    entries: BTreeMap<Topic, Option<Value>>,
}

impl ComponentSnapshot {
    pub(crate) fn insert(&mut self, topic: Topic, value: Option<Value>) {
        self.entries.insert(topic, value);
    }

    /// Value recorded for a topic, if the topic is present and had a value
    pub fn get(&self, topic: impl Into<Topic>) -> Option<&Value> {
        self.entries.get(&topic.into()).and_then(Option::as_ref)
    }

    /// Whether the snapshot has an entry for a topic (even an absent value)
    pub fn contains(&self, topic: impl Into<Topic>) -> bool {
        self.entries.contains_key(&topic.into())
    }

    /// Synthesized loading flag for an action key
    pub fn loading(&self, key: impl Into<StateKey>) -> Option<bool> {
        self.get(Topic::Loading(key.into())).and_then(Value::as_bool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Topic, Option<&Value>)> {
        self.entries.iter().map(|(topic, value)| (topic, value.as_ref()))
    }

    /// Render as a JSON object keyed by the conventional string form
    ///
    /// Absent values become `null`.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(topic, value)| (topic.to_string(), value.clone().unwrap_or(Value::Null)))
            .collect();
        Value::Object(map)
    }
}
