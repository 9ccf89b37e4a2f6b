use std::fmt;

use serde_json::{Map, Value};

use super::entry::ServiceEntry;

/// One of the two mutually exclusive top-level keys a host may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVariant {
    /// `mcpServers`.
    Primary,
    /// `mcp`.
    Legacy,
}

impl SchemaVariant {
    /// Both variants, primary first.
    pub const ALL: [Self; 2] = [Self::Primary, Self::Legacy];

    /// Top-level JSON key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Primary => "mcpServers",
            Self::Legacy => "mcp",
        }
    }

    /// The opposite variant.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Primary => Self::Legacy,
            Self::Legacy => Self::Primary,
        }
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Where a service entry currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPlacement {
    /// Under neither key.
    Absent,
    /// Under exactly one key.
    Only(SchemaVariant),
    /// Under both keys.
    Both,
}

/// Parsed host configuration.
///
/// Keys are kept in file order; anything the reconciler does not own is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigDocument {
    root: Map<String, Value>,
}

impl ConfigDocument {
    /// A document with no keys.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps parsed JSON after checking its shape.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the root is not an object or
    /// a schema key holds something other than an object.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let Value::Object(root) = value else {
            return Err(format!("top-level value is {}, expected an object", kind(&value)));
        };
        for variant in SchemaVariant::ALL {
            if let Some(schema) = root.get(variant.key()) {
                if !schema.is_object() {
                    return Err(format!(
                        "'{}' is {}, expected an object",
                        variant.key(),
                        kind(schema)
                    ));
                }
            }
        }
        Ok(Self { root })
    }

    /// Borrows the top-level map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Converts back into JSON.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Entries under `variant`, when the key exists.
    #[must_use]
    pub fn schema(&self, variant: SchemaVariant) -> Option<&Map<String, Value>> {
        self.root.get(variant.key()).and_then(Value::as_object)
    }

    /// Whether `variant` exists and holds at least one entry.
    #[must_use]
    pub fn has_entries(&self, variant: SchemaVariant) -> bool {
        self.schema(variant).is_some_and(|schema| !schema.is_empty())
    }

    /// The raw entry for `service` under `variant`.
    #[must_use]
    pub fn entry(&self, variant: SchemaVariant, service: &str) -> Option<&Value> {
        self.schema(variant).and_then(|schema| schema.get(service))
    }

    /// Where `service` is configured.
    #[must_use]
    pub fn placement(&self, service: &str) -> EntryPlacement {
        let primary = self.entry(SchemaVariant::Primary, service).is_some();
        let legacy = self.entry(SchemaVariant::Legacy, service).is_some();
        match (primary, legacy) {
            (false, false) => EntryPlacement::Absent,
            (true, false) => EntryPlacement::Only(SchemaVariant::Primary),
            (false, true) => EntryPlacement::Only(SchemaVariant::Legacy),
            (true, true) => EntryPlacement::Both,
        }
    }

    /// Copy with `service` placed under `target` only.
    ///
    /// An entry already under `target` is updated where it stands. An entry
    /// moved across keeps its extra fields. The other key loses the entry but
    /// is never deleted itself.
    #[must_use]
    pub fn with_entry(&self, service: &str, entry: &ServiceEntry, target: SchemaVariant) -> Self {
        let mut next = self.clone();
        let moved = next
            .schema_mut(target.other())
            .and_then(|schema| schema.shift_remove(service));
        next.ensure_schema(target);
        if let Some(schema) = next.schema_mut(target) {
            if let Some(existing) = schema.get_mut(service) {
                entry.apply_to(existing);
            } else {
                let mut value = moved.unwrap_or_else(|| Value::Object(Map::new()));
                entry.apply_to(&mut value);
                schema.insert(service.to_owned(), value);
            }
        }
        next
    }

    /// Copy with `service` removed from both keys.
    ///
    /// A key left empty by the removal is dropped; keys that were already
    /// empty stay.
    #[must_use]
    pub fn without_entry(&self, service: &str) -> Self {
        let mut next = self.clone();
        for variant in SchemaVariant::ALL {
            let emptied = next.schema_mut(variant).is_some_and(|schema| {
                schema.shift_remove(service).is_some() && schema.is_empty()
            });
            if emptied {
                next.root.shift_remove(variant.key());
            }
        }
        next
    }

    fn schema_mut(&mut self, variant: SchemaVariant) -> Option<&mut Map<String, Value>> {
        self.root
            .get_mut(variant.key())
            .and_then(Value::as_object_mut)
    }

    fn ensure_schema(&mut self, variant: SchemaVariant) {
        if self.schema(variant).is_none() {
            self.root
                .insert(variant.key().to_owned(), Value::Object(Map::new()));
        }
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
