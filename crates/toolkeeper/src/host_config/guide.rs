use std::path::Path;

use serde_json::{Map, Value};

use super::document::SchemaVariant;
use super::entry::ServiceEntry;

/// Step-by-step instructions for adding the entry by hand.
pub(super) fn render(
    path: &Path,
    variant: SchemaVariant,
    service: &str,
    entry: &ServiceEntry,
) -> String {
    let mut services = Map::new();
    services.insert(service.to_owned(), entry.to_value());
    let mut root = Map::new();
    root.insert(variant.key().to_owned(), Value::Object(services));
    let snippet = serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_default();

    let key = variant.key();
    let other = variant.other().key();
    format!(
        "Manual configuration for {service}\n\
         \n\
         1. Open {path} (create the file if it does not exist).\n\
         2. Merge the following under the top-level \"{key}\" key, keeping any\n\
         \x20  other entries, and remove \"{service}\" from \"{other}\" if present:\n\
         \n\
         {snippet}\n\
         \n\
         3. Restart the host application to pick up the change.\n",
        path = path.display(),
    )
}
