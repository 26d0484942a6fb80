//! Rendering of command results on stdout.
//!
//! `json` prints the serialized result as-is; `table` prints a plain
//! aligned text grid for reading in a terminal.

use clap::ValueEnum;
use datafrost_core::{
    AdapterInfo, ConnectionRecord, QueryResult, TableInfo, TableSchema, TreeNode, Value,
};
use serde::Serialize;
use std::fmt::Write;

/// How results are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Left-aligned columns separated by two spaces, with a dashed header rule.
pub fn grid(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| {
        let mut out = String::new();
        for (i, (cell, width)) in cells.iter().zip(&widths).enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            let _ = write!(out, "{:<width$}", cell, width = *width);
        }
        out.trim_end().to_string()
    };

    let mut out = line(headers);
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&line(&rule));
    for row in rows {
        out.push('\n');
        out.push_str(&line(row));
    }
    out
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_string().replace(['\n', '\r', '\t'], " "),
    }
}

pub fn adapters(adapters: &[AdapterInfo]) -> String {
    let rows: Vec<Vec<String>> = adapters
        .iter()
        .map(|a| vec![a.adapter_type.clone(), a.name.clone(), a.description.clone()])
        .collect();
    grid(&headers(&["TYPE", "NAME", "DESCRIPTION"]), &rows)
}

pub fn connections(records: &[ConnectionRecord]) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| vec![r.id.to_string(), r.name.clone(), r.adapter_type.clone()])
        .collect();
    grid(&headers(&["ID", "NAME", "TYPE"]), &rows)
}

pub fn tables(tables: &[TableInfo]) -> String {
    let rows: Vec<Vec<String>> = tables
        .iter()
        .map(|t| {
            vec![
                t.name.clone(),
                t.kind.to_string(),
                t.full_name.clone().unwrap_or_default(),
            ]
        })
        .collect();
    grid(&headers(&["NAME", "TYPE", "FULL NAME"]), &rows)
}

/// Indented outline, two spaces per level.
pub fn tree(nodes: &[TreeNode]) -> String {
    fn walk(nodes: &[TreeNode], depth: usize, out: &mut String) {
        for node in nodes {
            let kind = serde_json::to_value(node.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let _ = writeln!(out, "{}{} ({})", "  ".repeat(depth), node.name, kind);
            walk(&node.children, depth.saturating_add(1), out);
        }
    }

    let mut out = String::new();
    walk(nodes, 0, &mut out);
    out.trim_end().to_string()
}

pub fn query_result(result: &QueryResult) -> String {
    let rows: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(cell).collect())
        .collect();
    format!(
        "{}\n\n{} row(s), page {} of {} total (limit {})",
        grid(&result.columns, &rows),
        result.count,
        result.page,
        result.total,
        result.limit
    )
}

pub fn schema(schema: &TableSchema) -> String {
    let mut out = format!("Table: {}\n\n", schema.table_name);

    let columns: Vec<Vec<String>> = schema
        .columns
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.data_type.clone(),
                if c.nullable { "YES" } else { "NO" }.to_string(),
                c.default_value.clone().unwrap_or_default(),
                if c.is_primary_key { "PK" } else { "" }.to_string(),
            ]
        })
        .collect();
    out.push_str(&grid(
        &headers(&["COLUMN", "TYPE", "NULLABLE", "DEFAULT", "KEY"]),
        &columns,
    ));

    if !schema.indexes.is_empty() {
        let indexes: Vec<Vec<String>> = schema
            .indexes
            .iter()
            .map(|i| {
                vec![
                    i.name.clone(),
                    if i.unique { "UNIQUE" } else { "" }.to_string(),
                    i.columns.join(", "),
                ]
            })
            .collect();
        out.push_str("\n\n");
        out.push_str(&grid(&headers(&["INDEX", "UNIQUE", "COLUMNS"]), &indexes));
    }

    if !schema.constraints.is_empty() {
        let constraints: Vec<Vec<String>> = schema
            .constraints
            .iter()
            .map(|c| vec![c.name.clone(), c.kind.clone(), c.definition.clone()])
            .collect();
        out.push_str("\n\n");
        out.push_str(&grid(
            &headers(&["CONSTRAINT", "TYPE", "DEFINITION"]),
            &constraints,
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafrost_core::{NodeKind, TableKind};

    #[test]
    fn test_grid_alignment() {
        let rendered = grid(
            &headers(&["ID", "NAME"]),
            &[
                vec!["1".to_string(), "ada".to_string()],
                vec!["10".to_string(), "grace".to_string()],
            ],
        );
        assert_eq!(rendered, "ID  NAME\n--  -----\n1   ada\n10  grace");
    }

    #[test]
    fn test_query_result_footer() {
        let result = QueryResult::from_rows(
            vec!["n".to_string()],
            vec![vec![Value::Integer(1)], vec![Value::Null]],
        );
        let rendered = query_result(&result);
        assert!(rendered.contains("NULL"));
        assert!(rendered.ends_with("2 row(s), page 1 of 2 total (limit 2)"));
    }

    #[test]
    fn test_tree_outline() {
        let nodes = vec![TreeNode::branch(
            "DB",
            NodeKind::Database,
            "DB",
            vec![TreeNode::leaf("ORDERS", NodeKind::Table, None)],
        )];
        assert_eq!(tree(&nodes), "DB (database)\n  ORDERS (table)");
    }

    #[test]
    fn test_tables_listing() {
        let rendered = tables(&[TableInfo::new("users", TableKind::View)]);
        assert!(rendered.lines().nth(2).unwrap().starts_with("users  view"));
    }
}
