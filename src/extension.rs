//! Value extensions
//!
//! An [`Extension`] may claim a column before the built-in decoders see it.
//! The session only ever walks [`Extensions::iter`]; how the set was
//! populated (discovery or explicit registration) is not its concern.

use crate::codec::{Format, Value};
use crate::protocol::constants::column_types;
use crate::row::Column;
use crate::{Error, Result};
use std::sync::Arc;

/// Pluggable value decoder
pub trait Extension: Send + Sync + std::fmt::Debug {
    /// Stable name used in logs
    fn name(&self) -> &str;

    /// Decode `raw` for `column`, or `None` to defer to the next decoder
    fn decode(&self, _column: &Column, _raw: &[u8], _format: Format) -> Option<Result<Value>> {
        None
    }
}

/// Decodes JSON columns into [`serde_json::Value`]
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExtension;

impl Extension for JsonExtension {
    fn name(&self) -> &str {
        "json"
    }

    fn decode(&self, column: &Column, raw: &[u8], _format: Format) -> Option<Result<Value>> {
        if column.column_type() != column_types::JSON {
            return None;
        }
        Some(
            serde_json::from_slice(raw)
                .map(Value::Json)
                .map_err(|e| Error::Decode(format!("column '{}': {}", column.name(), e))),
        )
    }
}

/// Ordered set of registered extensions
#[derive(Debug, Clone, Default)]
pub struct Extensions {
    list: Vec<Arc<dyn Extension>>,
}

impl Extensions {
    /// No extensions
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in auto-discoverable set
    pub fn discover() -> Self {
        let mut extensions = Self::empty();
        extensions.register(Arc::new(JsonExtension));
        extensions
    }

    /// Append an extension; later registrations are consulted last
    pub fn register(&mut self, extension: Arc<dyn Extension>) -> &mut Self {
        tracing::debug!(extension = extension.name(), "extension registered");
        self.list.push(extension);
        self
    }

    /// Merge another set after this one
    pub fn extend(&mut self, other: &Extensions) {
        self.list.extend(other.list.iter().cloned());
    }

    /// Registered extensions in consultation order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        self.list.iter().map(|e| e.as_ref())
    }

    /// Extension names
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|e| e.name()).collect()
    }

    /// Number of extensions
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether no extension is registered
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
