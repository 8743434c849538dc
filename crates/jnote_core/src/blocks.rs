//! Block-type registry.
//!
//! Maps a block type tag to a payload builder. Builders receive the caller's
//! parameters and return the block's `data` object. Unknown tags produce a
//! block with an empty payload and a warning rather than an error, so a UI
//! that knows about newer block types never crashes an older core.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::document::Block;

/// Parameters passed to a payload builder.
pub type BlockParams = IndexMap<String, Value>;

/// Builds the `data` payload of a block from caller parameters.
pub type PayloadBuilder = Arc<dyn Fn(&BlockParams) -> Value + Send + Sync>;

/// Registry of known block types.
pub struct BlockRegistry {
    builders: RwLock<HashMap<String, PayloadBuilder>>,
}

/// Start from `defaults` and take every parameter whose key the defaults know.
fn with_overrides(defaults: Value, params: &BlockParams) -> Value {
    let mut map = match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in params {
        if let Some(slot) = map.get_mut(key) {
            *slot = value.clone();
        }
    }
    Value::Object(map)
}

impl BlockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the built-in block types:
    /// `text`, `todo`, `code`, `image` and `latex`.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_defaults("text", json!({"content": "", "format": "markdown"}));
        registry.register_defaults("todo", json!({"content": "", "checked": false}));
        registry.register_defaults(
            "code",
            json!({"code": "", "language": "python", "output": ""}),
        );
        registry.register_defaults(
            "image",
            json!({"src": "", "caption": "", "alignment": "center"}),
        );
        registry.register_defaults("latex", json!({"formula": "", "display_mode": true}));
        registry
    }

    /// Register (or replace) a builder for a block type.
    pub fn register(&self, block_type: impl Into<String>, builder: PayloadBuilder) {
        let mut builders = self.builders.write().unwrap();
        builders.insert(block_type.into(), builder);
    }

    /// Register a block type whose payload is `defaults` overridden by matching parameters.
    pub fn register_defaults(&self, block_type: impl Into<String>, defaults: Value) {
        self.register(
            block_type,
            Arc::new(move |params: &BlockParams| with_overrides(defaults.clone(), params)),
        );
    }

    /// Whether a block type is known.
    pub fn is_registered(&self, block_type: &str) -> bool {
        self.builders.read().unwrap().contains_key(block_type)
    }

    /// Registered type tags, sorted.
    pub fn block_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.builders.read().unwrap().keys().cloned().collect();
        types.sort();
        types
    }

    /// Build a new block with a fresh id.
    pub fn create(&self, block_type: &str, params: &BlockParams) -> Block {
        let builder = self.builders.read().unwrap().get(block_type).cloned();
        let data = match builder {
            Some(builder) => builder(params),
            None => {
                log::warn!(
                    "Unknown block type '{}', defaulting to empty data",
                    block_type
                );
                Value::Object(Map::new())
            }
        };
        let block = Block::new(block_type, data);
        log::debug!("Created '{}' block {}", block_type, block.block_id);
        block
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("block_types", &self.block_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> BlockParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_text_block_defaults() {
        let registry = BlockRegistry::with_defaults();
        let block = registry.create("text", &BlockParams::new());
        assert_eq!(block.block_type, "text");
        assert_eq!(block.data, json!({"content": "", "format": "markdown"}));
        assert!(block.tags.is_empty());
    }

    #[test]
    fn test_params_override_known_keys_only() {
        let registry = BlockRegistry::with_defaults();
        let block = registry.create(
            "code",
            &params(&[("language", json!("rust")), ("bogus", json!(1))]),
        );
        assert_eq!(
            block.data,
            json!({"code": "", "language": "rust", "output": ""})
        );
    }

    #[test]
    fn test_unknown_type_yields_empty_payload() {
        let registry = BlockRegistry::with_defaults();
        let block = registry.create("kanban", &params(&[("x", json!(1))]));
        assert_eq!(block.block_type, "kanban");
        assert_eq!(block.data, json!({}));
    }

    #[test]
    fn test_fresh_ids() {
        let registry = BlockRegistry::with_defaults();
        let a = registry.create("todo", &BlockParams::new());
        let b = registry.create("todo", &BlockParams::new());
        assert_ne!(a.block_id, b.block_id);
    }

    #[test]
    fn test_custom_builder() {
        let registry = BlockRegistry::new();
        assert!(!registry.is_registered("quote"));
        registry.register(
            "quote",
            Arc::new(|p: &BlockParams| json!({"text": p.get("text").cloned().unwrap_or(Value::Null)})),
        );
        let block = registry.create("quote", &params(&[("text", json!("hi"))]));
        assert_eq!(block.data, json!({"text": "hi"}));
        assert_eq!(registry.block_types(), vec!["quote"]);
    }
}
