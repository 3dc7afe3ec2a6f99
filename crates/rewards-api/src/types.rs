//! Response payloads
//!
//! The API is loose about types: task codes arrive as strings or numbers,
//! point totals may be null, and check-in times come as ISO strings or epoch
//! milliseconds. The types here absorb that so callers see one shape.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub reward_point: Value,
    #[serde(default)]
    pub last_checkin_at: Option<CheckinTime>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub social_task: Vec<TaskCode>,
}

/// Treats an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl UserProfile {
    /// Sum of today's points across all nodes.
    pub fn today_points(&self) -> f64 {
        self.nodes.iter().filter_map(|n| n.today_point).sum()
    }

    /// Lifetime reward points as a display string.
    pub fn reward_points(&self) -> String {
        match &self.reward_point {
            Value::Null => "0".to_owned(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub today_point: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub code: TaskCode,
    #[serde(default)]
    pub title: String,
}

/// Last check-in instant as sent by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CheckinTime {
    Text(String),
    EpochMillis(i64),
}

/// Task identifier, normalized to a string.
///
/// Accepts `"abc"`, `42`, or an object carrying `code` / `taskId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskCode(pub String);

impl TaskCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskCode {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<'de> Deserialize<'de> for TaskCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
            Entry {
                #[serde(alias = "taskId")]
                code: Value,
            },
        }

        let code = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
            Raw::Entry { code } => match code {
                Value::String(s) => s,
                other => other.to_string(),
            },
        };
        Ok(TaskCode(code))
    }
}
