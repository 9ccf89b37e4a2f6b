use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which top-level key of the host config receives the managed entry.
///
/// `Auto` writes under the primary key only when it already carries entries
/// and falls back to the legacy key otherwise. Hosts that have fully migrated
/// can pin either key explicitly.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SchemaPreference {
    /// Primary when populated, legacy otherwise.
    #[default]
    Auto,
    /// Always the primary key.
    Primary,
    /// Always the legacy key.
    Legacy,
}
