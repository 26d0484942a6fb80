//! Google BigQuery adapter over the REST v2 API.
//!
//! Tables are addressed as `` `project.dataset.table` ``. Filter values
//! travel as positional STRING query parameters cast to the column's type,
//! so no caller-supplied value is ever spliced into SQL text.

pub mod auth;
pub mod client;

use super::config::{BackendKind, Credentials};
use super::filter::{SqlDialect, binds_arguments, build_where_clause};
use super::helpers::{
    ConnectionSlot, READ_ONLY_KEYWORDS, count_total, ensure_read_only, quote_backtick,
};
use super::registry::AdapterRegistration;
use super::{AdapterFeature, DatabaseAdapter, Filter, FilterOperator};
use crate::Result;
use crate::error::DatafrostError;
use crate::models::{
    AdapterInfo, ColumnInfo, ConstraintInfo, FieldConfig, QueryResult, TableInfo, TableSchema,
    UiConfig,
};
use async_trait::async_trait;
use auth::ServiceAccountKey;
use client::{BigQueryClient, TableResource};
use std::collections::HashMap;
use std::sync::Arc;

/// BigQuery adapter bound to one project and dataset
#[derive(Default)]
pub struct BigQueryAdapter {
    client: ConnectionSlot<Arc<BigQueryClient>>,
}

impl std::fmt::Debug for BigQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryAdapter")
            .field("client", &self.client.get().ok())
            .finish()
    }
}

impl BigQueryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Registry entry for the `bigquery` type tag.
pub fn registration() -> AdapterRegistration {
    AdapterRegistration::new(
        AdapterInfo {
            adapter_type: BackendKind::BigQuery.type_tag().to_string(),
            name: "BigQuery".to_string(),
            description: "Google BigQuery database".to_string(),
            ui_config: UiConfig {
                fields: vec![
                    FieldConfig::required("project_id", "Project ID", "text", "my-project-id"),
                    FieldConfig::required("dataset", "Dataset", "text", "my_dataset"),
                    FieldConfig::required(
                        "credentials",
                        "Service Account Credentials (JSON)",
                        "textarea",
                        "Paste JSON credentials here or upload file...",
                    ),
                ],
                supports_file: true,
                file_types: vec![".json".to_string()],
                ..Default::default()
            },
        },
        BigQueryAdapter::new,
    )
}

/// Standard-SQL spelling of a schema type usable in `CAST`, if any.
pub fn cast_type(field_type: &str) -> Option<&'static str> {
    Some(match field_type {
        "STRING" => "STRING",
        "INTEGER" | "INT64" => "INT64",
        "FLOAT" | "FLOAT64" => "FLOAT64",
        "BOOLEAN" | "BOOL" => "BOOL",
        "NUMERIC" => "NUMERIC",
        "BIGNUMERIC" => "BIGNUMERIC",
        "DATE" => "DATE",
        "DATETIME" => "DATETIME",
        "TIME" => "TIME",
        "TIMESTAMP" => "TIMESTAMP",
        "BYTES" => "BYTES",
        _ => return None,
    })
}

/// Backtick identifiers with `?` parameters cast to the column's type.
#[derive(Debug, Default)]
pub struct BigQueryDialect {
    column_types: HashMap<String, &'static str>,
}

impl BigQueryDialect {
    /// Builds the dialect from a table's top-level schema fields.
    pub fn from_table(table: &TableResource) -> Self {
        let column_types = table
            .schema
            .fields
            .iter()
            .filter(|field| !field.is_repeated())
            .filter_map(|field| Some((field.name.clone(), cast_type(&field.field_type)?)))
            .collect();
        Self { column_types }
    }
}

impl SqlDialect for BigQueryDialect {
    fn quote_identifier(&self, column: &str) -> String {
        quote_backtick(column)
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn column_operand(&self, column: &str, operator: FilterOperator) -> String {
        if operator.is_pattern() {
            format!("CAST({} AS STRING)", self.quote_identifier(column))
        } else {
            self.quote_identifier(column)
        }
    }

    fn argument_operand(&self, column: &str, operator: FilterOperator, position: usize) -> String {
        match self.column_types.get(column) {
            Some(&cast) if !operator.is_pattern() && cast != "STRING" => {
                format!("CAST({} AS {})", self.placeholder(position), cast)
            }
            _ => self.placeholder(position),
        }
    }
}

/// Fully qualified, quoted table reference.
pub fn qualified_table(project_id: &str, dataset: &str, table: &str) -> String {
    quote_backtick(&format!("{}.{}.{}", project_id, dataset, table))
}

/// Converts a table resource into a schema description.
pub fn table_schema(table_name: &str, table: &TableResource) -> TableSchema {
    let constraints = table.table_constraints.clone().unwrap_or_default();
    let primary_key = constraints
        .primary_key
        .as_ref()
        .map(|pk| pk.columns.clone())
        .unwrap_or_default();

    let mut schema = TableSchema::new(table_name);
    schema.columns = table
        .schema
        .fields
        .iter()
        .map(|field| ColumnInfo {
            name: field.name.clone(),
            data_type: field.display_type(),
            nullable: !field.is_required(),
            default_value: field.default_value_expression.clone(),
            is_primary_key: primary_key.contains(&field.name),
        })
        .collect();

    if !primary_key.is_empty() {
        schema.constraints.push(ConstraintInfo {
            name: format!("pk_{}", table_name),
            kind: "PRIMARY KEY".to_string(),
            column: single(&primary_key),
            definition: format!("PRIMARY KEY ({}) NOT ENFORCED", primary_key.join(", ")),
        });
    }
    for (i, fk) in constraints.foreign_keys.iter().enumerate() {
        let local: Vec<String> = fk
            .column_references
            .iter()
            .map(|c| c.referencing_column.clone())
            .collect();
        let remote: Vec<&str> = fk
            .column_references
            .iter()
            .map(|c| c.referenced_column.as_str())
            .collect();
        schema.constraints.push(ConstraintInfo {
            name: fk
                .name
                .clone()
                .unwrap_or_else(|| format!("fk_{}_{}", table_name, i)),
            kind: "FOREIGN KEY".to_string(),
            column: single(&local),
            definition: format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) NOT ENFORCED",
                local.join(", "),
                fk.referenced_table.table_id,
                remote.join(", ")
            ),
        });
    }

    schema
}

fn single(columns: &[String]) -> String {
    match columns {
        [only] => only.clone(),
        _ => String::new(),
    }
}

#[async_trait]
impl DatabaseAdapter for BigQueryAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::BigQuery
    }

    async fn connect(&self, credentials: &Credentials) -> Result<()> {
        let Credentials::BigQuery(bigquery) = credentials else {
            return Err(credentials.mismatch(BackendKind::BigQuery));
        };

        let key = ServiceAccountKey::parse(bigquery.service_account.expose())?;
        let client = BigQueryClient::new(&bigquery.project_id, &bigquery.dataset, key)?;
        tracing::info!(
            "BigQuery client prepared for {}.{}",
            bigquery.project_id,
            bigquery.dataset
        );
        self.client.install(Arc::new(client))?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .get()?
            .dataset_metadata()
            .await
            .map_err(|e| DatafrostError::unreachable("BigQuery dataset is not reachable", e))
    }

    async fn close(&self) -> Result<()> {
        if self.client.take().is_some() {
            tracing::info!("BigQuery client released");
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        self.client.get()?.list_tables().await
    }

    async fn get_table_data(
        &self,
        table: &str,
        limit: u32,
        offset: u32,
        filters: &[Filter],
    ) -> Result<QueryResult> {
        let client = self.client.get()?;

        let dialect = if binds_arguments(filters) {
            BigQueryDialect::from_table(&client.get_table(table).await?)
        } else {
            BigQueryDialect::default()
        };
        let clause = build_where_clause(filters, &dialect);
        let from = format!(
            "FROM {}{}",
            qualified_table(client.project_id(), client.dataset(), table),
            clause.to_sql_suffix()
        );

        let count_sql = format!("SELECT COUNT(*) as count {}", from);
        tracing::debug!("Counting rows: {}", count_sql);
        let counted = client.query(&count_sql, &clause.args).await?;
        let total = count_total(&counted, table)?;

        let mut page_sql = format!("SELECT * {} LIMIT {}", from, limit);
        if offset > 0 {
            page_sql.push_str(&format!(" OFFSET {}", offset));
        }
        tracing::debug!("Fetching page: {}", page_sql);
        let page = client.query(&page_sql, &clause.args).await?;

        Ok(page.with_pagination(total, limit, offset))
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        ensure_read_only(sql, READ_ONLY_KEYWORDS)?;
        self.client.get()?.query(sql, &[]).await
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        let resource = self.client.get()?.get_table(table).await?;
        Ok(table_schema(table, &resource))
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(feature, AdapterFeature::Constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_table() -> TableResource {
        serde_json::from_str(
            r#"{
                "schema": {"fields": [
                    {"name": "id", "type": "INTEGER", "mode": "REQUIRED"},
                    {"name": "customer_id", "type": "INTEGER"},
                    {"name": "status", "type": "STRING", "defaultValueExpression": "'new'"},
                    {"name": "placed_at", "type": "TIMESTAMP"},
                    {"name": "tags", "type": "STRING", "mode": "REPEATED"},
                    {"name": "meta", "type": "RECORD", "fields": [{"name": "k", "type": "STRING"}]}
                ]},
                "tableConstraints": {
                    "primaryKey": {"columns": ["id"]},
                    "foreignKeys": [{
                        "referencedTable": {"projectId": "p", "datasetId": "d", "tableId": "customers"},
                        "columnReferences": [{"referencingColumn": "customer_id", "referencedColumn": "id"}]
                    }]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_filters_use_cast_parameters() {
        let dialect = BigQueryDialect::from_table(&orders_table());
        let clause = build_where_clause(
            &[
                Filter::new("id", FilterOperator::Gt, "10"),
                Filter::new("status", FilterOperator::Eq, "o'brien"),
                Filter::new("placed_at", FilterOperator::Lt, "2024-01-01"),
                Filter::new("id", FilterOperator::Like, "1%"),
                Filter::new("tags", FilterOperator::IsNull, ""),
            ],
            &dialect,
        );

        assert_eq!(
            clause.sql,
            "`id` > CAST(? AS INT64) AND `status` = ? AND `placed_at` < CAST(? AS TIMESTAMP) \
             AND CAST(`id` AS STRING) LIKE ? AND `tags` IS NULL"
        );
        assert_eq!(clause.args, vec!["10", "o'brien", "2024-01-01", "1%"]);
        assert!(!clause.sql.contains("o'brien"));
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(qualified_table("p", "d", "orders"), "`p.d.orders`");
        assert_eq!(qualified_table("p", "d", "we`ird"), "`p.d.we\\`ird`");
    }

    #[test]
    fn test_table_schema_from_resource() {
        let schema = table_schema("orders", &orders_table());
        assert_eq!(schema.columns.len(), 6);
        assert!(schema.columns[0].is_primary_key);
        assert!(!schema.columns[0].nullable);
        assert!(schema.columns[1].nullable);
        assert_eq!(schema.columns[2].default_value.as_deref(), Some("'new'"));
        assert_eq!(schema.columns[4].data_type, "ARRAY<STRING>");
        assert!(schema.indexes.is_empty());

        assert_eq!(schema.constraints.len(), 2);
        assert_eq!(schema.constraints[0].kind, "PRIMARY KEY");
        assert_eq!(schema.constraints[0].column, "id");
        assert_eq!(schema.constraints[1].name, "fk_orders_0");
        assert_eq!(schema.constraints[1].column, "customer_id");
        assert!(schema.constraints[1].definition.contains("REFERENCES customers(id)"));
    }

    #[test]
    fn test_cast_types() {
        assert_eq!(cast_type("INTEGER"), Some("INT64"));
        assert_eq!(cast_type("BOOLEAN"), Some("BOOL"));
        assert_eq!(cast_type("GEOGRAPHY"), None);
        assert_eq!(cast_type("RECORD"), None);
    }

    #[test]
    fn test_bigquery_registration() {
        let registration = registration();
        assert_eq!(registration.info.adapter_type, "bigquery");
        assert!(registration.info.ui_config.supports_file);
        assert_eq!(registration.info.ui_config.file_types, vec![".json"]);
        assert_eq!(registration.info.ui_config.fields[2].field_type, "textarea");
    }

    #[tokio::test]
    async fn test_connect_rejects_non_key_document() {
        let adapter = BigQueryAdapter::new();
        let credentials = Credentials::BigQuery(crate::adapters::config::BigQueryCredentials {
            project_id: "p".to_string(),
            dataset: "d".to_string(),
            service_account: crate::adapters::config::Secret::new("{}"),
        });
        assert!(adapter.connect(&credentials).await.is_err());
        assert!(matches!(adapter.ping().await, Err(DatafrostError::NotConnected)));
    }
}
