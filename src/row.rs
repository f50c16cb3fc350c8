//! Result rows and column metadata

use crate::codec::Value;
use crate::protocol::constants::{column_flags, BINARY_CHARSET};
use crate::protocol::ColumnDefinition;
use std::sync::Arc;

/// Result column metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    table: String,
    schema: String,
    column_type: u8,
    flags: u16,
    charset: u16,
    decimals: u8,
}

impl Column {
    /// Column label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table alias
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Schema
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Wire column type (see `protocol::constants::column_types`)
    pub fn column_type(&self) -> u8 {
        self.column_type
    }

    /// Column flags
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Collation id
    pub fn charset(&self) -> u16 {
        self.charset
    }

    /// Decimals
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Unsigned numeric column
    pub fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    /// Binary collation
    pub fn is_binary(&self) -> bool {
        self.charset == BINARY_CHARSET
    }

    #[cfg(test)]
    pub(crate) fn synthetic(name: &str, column_type: u8, flags: u16, charset: u16) -> Self {
        Self {
            name: name.to_string(),
            table: String::new(),
            schema: String::new(),
            column_type,
            flags,
            charset,
            decimals: 0,
        }
    }
}

impl From<ColumnDefinition> for Column {
    fn from(def: ColumnDefinition) -> Self {
        Self {
            name: def.name,
            table: def.table,
            schema: def.schema,
            column_type: def.column_type,
            flags: def.flags,
            charset: def.charset,
            decimals: def.decimals,
        }
    }
}

/// One decoded row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the first column labelled `name` (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Column metadata
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All values in column order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume into values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
