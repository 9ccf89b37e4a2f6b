use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::process::LaunchSpec;

/// How the host should launch the bridge client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceEntry {
    /// Program to run.
    pub command: String,
    /// Literal argument vector.
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ServiceEntry {
    /// Mirrors a launch specification.
    #[must_use]
    pub fn from_launch(spec: &LaunchSpec) -> Self {
        Self {
            command: spec.program().to_owned(),
            args: spec.arguments().to_vec(),
            env: spec.environment().clone(),
        }
    }

    /// Overwrites `command`, `args`, and `env` in `slot`, keeping any other
    /// fields the host stored there.
    pub fn apply_to(&self, slot: &mut Value) {
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(fields) = slot {
            fields.insert("command".to_owned(), Value::String(self.command.clone()));
            fields.insert(
                "args".to_owned(),
                Value::Array(self.args.iter().cloned().map(Value::String).collect()),
            );
            fields.insert(
                "env".to_owned(),
                Value::Object(
                    self.env
                        .iter()
                        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                        .collect(),
                ),
            );
        }
    }

    /// The entry as a standalone JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut value = Value::Object(Map::new());
        self.apply_to(&mut value);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> ServiceEntry {
        ServiceEntry::from_launch(
            &LaunchSpec::new("npx")
                .args(["-y", "@agentdeskai/browser-tools-mcp@1.2.0", "--port", "3025"])
                .env("NODE_ENV", "production"),
        )
    }

    #[test]
    fn renders_literal_command_and_args() {
        assert_eq!(
            entry().to_value(),
            json!({
                "command": "npx",
                "args": ["-y", "@agentdeskai/browser-tools-mcp@1.2.0", "--port", "3025"],
                "env": {"NODE_ENV": "production"}
            })
        );
    }

    #[test]
    fn keeps_foreign_fields_when_applied() {
        let mut slot = json!({"command": "old", "disabled": false});
        entry().apply_to(&mut slot);

        assert_eq!(slot["command"], "npx");
        assert_eq!(slot["disabled"], false);
    }

    #[test]
    fn replaces_non_object_slot() {
        let mut slot = json!("garbage");
        entry().apply_to(&mut slot);
        assert_eq!(slot, entry().to_value());
    }
}
