//! Core data models shared by every backend adapter.
//!
//! These are the uniform result shapes handed back to request handlers:
//! table listings, catalog trees, paged query results and table schemas.
//! All of them serialize to the JSON layout the frontend consumes.

use serde::{Deserialize, Serialize};

/// Logical connection identifier (primary key of a stored connection record)
pub type ConnectionId = i64;

/// Kind of a listed relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

impl TableKind {
    /// Maps a catalog type string (`BASE TABLE`, `VIEW`, `table`, ...) to a kind.
    pub fn from_catalog(value: &str) -> Self {
        if value.to_ascii_uppercase().contains("VIEW") {
            Self::View
        } else {
            Self::Table
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Table => write!(f, "table"),
            TableKind::View => write!(f, "view"),
        }
    }
}

/// A table or view returned by `list_tables`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl TableInfo {
    /// Creates an unqualified table entry.
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            full_name: None,
        }
    }

    /// Sets the fully qualified path of the relation.
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }
}

/// Level of a catalog tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Database,
    Schema,
    Table,
    View,
}

impl From<TableKind> for NodeKind {
    fn from(kind: TableKind) -> Self {
        match kind {
            TableKind::Table => NodeKind::Table,
            TableKind::View => NodeKind::View,
        }
    }
}

/// One node of a hierarchical catalog (database → schema → table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Creates a leaf node.
    pub fn leaf(name: impl Into<String>, kind: NodeKind, full_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            full_name,
            children: Vec::new(),
        }
    }

    /// Creates a branch node with the given children.
    pub fn branch(
        name: impl Into<String>,
        kind: NodeKind,
        full_name: impl Into<String>,
        children: Vec<TreeNode>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            full_name: Some(full_name.into()),
            children,
        }
    }

    /// Builds the single-level tree used for backends without a catalog hierarchy.
    pub fn from_tables(tables: Vec<TableInfo>) -> Vec<TreeNode> {
        tables
            .into_iter()
            .map(|table| {
                let full_name = table.full_name.or_else(|| Some(table.name.clone()));
                TreeNode::leaf(table.name, table.kind.into(), full_name)
            })
            .collect()
    }
}

/// Canonical cell value placed into `QueryResult::rows`.
///
/// Backend-native values are reduced to this set; anything else is
/// stringified by the adapter that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an integer when it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Converts a JSON scalar into a canonical value; arrays and objects are stringified.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        }
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Value::Null, Value::String)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

/// Uniform result of a table page or an ad-hoc query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Rows actually returned
    pub count: u64,
    /// Full filtered row count
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl QueryResult {
    /// Result of an ad-hoc query: everything returned is a single page.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let count = rows.len() as u64;
        Self {
            columns,
            rows,
            count,
            total: count,
            page: 1,
            limit: count,
        }
    }

    /// Stamps table-page pagination onto a fetched page.
    ///
    /// `page = offset / limit + 1`; a zero limit is reported as page 1.
    pub fn with_pagination(mut self, total: u64, limit: u32, offset: u32) -> Self {
        self.count = self.rows.len() as u64;
        self.total = total;
        self.limit = u64::from(limit);
        self.page = page_for(limit, offset);
        self
    }
}

/// Page number for an offset, 1-based.
pub fn page_for(limit: u32, offset: u32) -> u64 {
    u64::from(offset.checked_div(limit).unwrap_or(0)).saturating_add(1)
}

/// Column of a table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

/// Index of a table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// Constraint of a table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub column: String,
    pub definition: String,
}

/// Best-effort structural description of a table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub constraints: Vec<ConstraintInfo>,
}

impl TableSchema {
    /// Creates an empty schema for the named table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }
}

/// Static descriptor of a registered adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    #[serde(rename = "type")]
    pub adapter_type: String,
    pub name: String,
    pub description: String,
    pub ui_config: UiConfig,
}

/// Shape of the "add connection" form for an adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modes: Vec<UiMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldConfig>,
    pub supports_file: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
}

/// A mutually exclusive group of credential fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiMode {
    pub key: String,
    pub label: String,
    pub fields: Vec<FieldConfig>,
}

impl UiMode {
    /// Creates a mode with its fields.
    pub fn new(key: &str, label: &str, fields: Vec<FieldConfig>) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            fields,
        }
    }
}

/// One credential input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub placeholder: String,
}

impl FieldConfig {
    /// A required field.
    pub fn required(key: &str, label: &str, field_type: &str, placeholder: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            field_type: field_type.to_string(),
            required: true,
            placeholder: placeholder.to_string(),
        }
    }

    /// An optional field.
    pub fn optional(key: &str, label: &str, field_type: &str, placeholder: &str) -> Self {
        Self {
            required: false,
            ..Self::required(key, label, field_type, placeholder)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_for() {
        assert_eq!(page_for(25, 0), 1);
        assert_eq!(page_for(25, 24), 1);
        assert_eq!(page_for(25, 25), 2);
        assert_eq!(page_for(10, 95), 10);
        assert_eq!(page_for(0, 50), 1);
    }

    #[test]
    fn test_query_result_from_rows() {
        let result = QueryResult::from_rows(
            vec!["a".to_string()],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );
        assert_eq!(result.count, 2);
        assert_eq!(result.total, 2);
        assert_eq!(result.limit, 2);
        assert_eq!(result.page, 1);
    }

    #[test]
    fn test_query_result_with_pagination() {
        let result = QueryResult::from_rows(vec!["a".to_string()], vec![vec![Value::Null]])
            .with_pagination(51, 25, 50);
        assert_eq!(result.count, 1);
        assert_eq!(result.total, 51);
        assert_eq!(result.limit, 25);
        assert_eq!(result.page, 3);
    }

    #[test]
    fn test_value_serialization() {
        let row = vec![
            Value::Null,
            Value::Bool(true),
            Value::Integer(7),
            Value::Float(1.5),
            Value::String("x".to_string()),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[null,true,7,1.5,"x"]"#);
    }

    #[test]
    fn test_value_from_json_stringifies_containers() {
        let value = Value::from_json(serde_json::json!({"a": 1}));
        assert_eq!(value, Value::String(r#"{"a":1}"#.to_string()));
        assert_eq!(Value::from_json(serde_json::json!(3)), Value::Integer(3));
    }

    #[test]
    fn test_table_info_serialization() {
        let info = TableInfo::new("users", TableKind::View);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"name": "users", "type": "view"}));
    }

    #[test]
    fn test_tree_from_tables() {
        let tree = TreeNode::from_tables(vec![
            TableInfo::new("a", TableKind::Table),
            TableInfo::new("b", TableKind::View).with_full_name("db.s.b"),
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].kind, NodeKind::Table);
        assert_eq!(tree[0].full_name.as_deref(), Some("a"));
        assert_eq!(tree[1].kind, NodeKind::View);
        assert_eq!(tree[1].full_name.as_deref(), Some("db.s.b"));
        assert!(tree.iter().all(|node| node.children.is_empty()));
    }

    #[test]
    fn test_table_kind_from_catalog() {
        assert_eq!(TableKind::from_catalog("BASE TABLE"), TableKind::Table);
        assert_eq!(TableKind::from_catalog("VIEW"), TableKind::View);
        assert_eq!(TableKind::from_catalog("MATERIALIZED VIEW"), TableKind::View);
        assert_eq!(TableKind::from_catalog("table"), TableKind::Table);
    }
}
