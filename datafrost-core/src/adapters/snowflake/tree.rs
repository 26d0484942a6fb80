//! Database → schema → table discovery.
//!
//! The session's current database and schema narrow the walk: with both
//! set only that branch is listed, with only a database its schemas are
//! listed, and with neither every accessible database is walked.

use super::client::SnowflakeClient;
use crate::Result;
use crate::adapters::helpers::quote_double;
use crate::models::{NodeKind, QueryResult, TableKind, TreeNode, Value};

const TABLE_TYPES: &str = "TABLE_TYPE IN ('BASE TABLE', 'VIEW')";

/// Names in the first column of `result`, skipping NULLs.
fn first_column(result: &QueryResult) -> Vec<String> {
    result
        .rows
        .iter()
        .filter_map(|row| match row.first() {
            Some(Value::String(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// `(name, kind)` pairs from a `TABLE_NAME, TABLE_TYPE` result.
pub(super) fn table_rows(result: &QueryResult) -> Vec<(String, TableKind)> {
    result
        .rows
        .iter()
        .filter_map(|row| match (row.first(), row.get(1)) {
            (Some(Value::String(name)), Some(Value::String(kind))) => {
                Some((name.clone(), TableKind::from_catalog(kind)))
            }
            _ => None,
        })
        .collect()
}

async fn current_context(client: &SnowflakeClient) -> Result<(Option<String>, Option<String>)> {
    let result = client
        .query("SELECT CURRENT_DATABASE(), CURRENT_SCHEMA()", &[])
        .await?;
    let row = result.rows.into_iter().next().unwrap_or_default();
    let name = |value: Option<&Value>| match value {
        Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
        _ => None,
    };
    Ok((name(row.first()), name(row.get(1))))
}

async fn list_tables_for_schema(
    client: &SnowflakeClient,
    database: &str,
    schema: &str,
) -> Result<Vec<TreeNode>> {
    let sql = format!(
        "SELECT TABLE_NAME, TABLE_TYPE FROM {}.INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_SCHEMA = ? AND {} ORDER BY TABLE_NAME",
        quote_double(database),
        TABLE_TYPES
    );
    let result = client.query(&sql, &[schema.to_string()]).await?;

    Ok(table_rows(&result)
        .into_iter()
        .map(|(name, kind)| {
            let full_name = format!("{}.{}.{}", database, schema, name);
            TreeNode::leaf(name, kind.into(), Some(full_name))
        })
        .collect())
}

async fn list_schemas(client: &SnowflakeClient, database: &str) -> Result<Vec<TreeNode>> {
    let sql = format!(
        "SELECT SCHEMA_NAME FROM {}.INFORMATION_SCHEMA.SCHEMATA ORDER BY SCHEMA_NAME",
        quote_double(database)
    );
    let schemas = first_column(&client.query(&sql, &[]).await?);

    let mut nodes = Vec::with_capacity(schemas.len());
    for schema in schemas {
        let tables = list_tables_for_schema(client, database, &schema).await?;
        let full_name = format!("{}.{}", database, schema);
        nodes.push(TreeNode::branch(schema, NodeKind::Schema, full_name, tables));
    }
    Ok(nodes)
}

async fn list_databases(client: &SnowflakeClient) -> Result<Vec<TreeNode>> {
    let result = client
        .query(
            "SELECT DATABASE_NAME FROM SNOWFLAKE.INFORMATION_SCHEMA.DATABASES ORDER BY DATABASE_NAME",
            &[],
        )
        .await?;

    let mut nodes = Vec::new();
    for database in first_column(&result) {
        let schemas = list_schemas(client, &database).await?;
        nodes.push(TreeNode::branch(
            database.clone(),
            NodeKind::Database,
            database,
            schemas,
        ));
    }
    Ok(nodes)
}

/// Builds the catalog tree for the session's current context.
pub async fn list_tree(client: &SnowflakeClient) -> Result<Vec<TreeNode>> {
    match current_context(client).await? {
        (Some(database), Some(schema)) => {
            tracing::debug!("Listing Snowflake tree for {}.{}", database, schema);
            let tables = list_tables_for_schema(client, &database, &schema).await?;
            let schema_node = TreeNode::branch(
                schema.clone(),
                NodeKind::Schema,
                format!("{}.{}", database, schema),
                tables,
            );
            Ok(vec![TreeNode::branch(
                database.clone(),
                NodeKind::Database,
                database,
                vec![schema_node],
            )])
        }
        (Some(database), None) => {
            tracing::debug!("Listing Snowflake schemas of {}", database);
            let schemas = list_schemas(client, &database).await?;
            Ok(vec![TreeNode::branch(
                database.clone(),
                NodeKind::Database,
                database,
                schemas,
            )])
        }
        (None, _) => {
            tracing::debug!("No current Snowflake database, walking all databases");
            list_databases(client).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_rows_map_kinds() {
        let result = QueryResult::from_rows(
            vec!["TABLE_NAME".to_string(), "TABLE_TYPE".to_string()],
            vec![
                vec![
                    Value::String("ORDERS".to_string()),
                    Value::String("BASE TABLE".to_string()),
                ],
                vec![
                    Value::String("RECENT_ORDERS".to_string()),
                    Value::String("VIEW".to_string()),
                ],
                vec![Value::Null, Value::String("VIEW".to_string())],
            ],
        );
        assert_eq!(
            table_rows(&result),
            vec![
                ("ORDERS".to_string(), TableKind::Table),
                ("RECENT_ORDERS".to_string(), TableKind::View),
            ]
        );
    }

    #[test]
    fn test_first_column_skips_nulls() {
        let result = QueryResult::from_rows(
            vec!["SCHEMA_NAME".to_string()],
            vec![
                vec![Value::String("PUBLIC".to_string())],
                vec![Value::Null],
            ],
        );
        assert_eq!(first_column(&result), vec!["PUBLIC".to_string()]);
    }
}
