//! In-memory stand-in for a MySQL server
//!
//! Answers the statements the engines issue (information_schema reads,
//! SHOW CREATE TABLE, batch copy, RENAME/DROP TABLE) from a table map, so
//! multi-step flows can be tested end to end on top of [`ScriptedDatabase`].

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use tidemark_schema::{
    DdlGenerator, DefaultValue, QueryOutput, Row, SchemaError, SchemaResult, ScriptedDatabase,
    TableSchema,
};

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static AFTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"> (-?\d+)").unwrap());
static UPTO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<= (-?\d+)").unwrap());
static LIMIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"LIMIT (\d+)").unwrap());
static FROM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"FROM `([^`]+)` WHERE").unwrap());
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"TABLE_NAME = '([^']+)'").unwrap());

pub struct FakeTable {
    pub schema: TableSchema,
    pub create_sql: String,
    /// Primary key → payload
    pub rows: BTreeMap<i64, String>,
}

#[derive(Default)]
pub struct FakeServer {
    pub tables: BTreeMap<String, FakeTable>,
}

pub type SharedServer = Arc<Mutex<FakeServer>>;

impl FakeServer {
    pub fn shared() -> SharedServer {
        Arc::new(Mutex::new(FakeServer::default()))
    }

    /// Create a table as if its CREATE TABLE had run
    pub fn install(&mut self, schema: &TableSchema, rows: impl IntoIterator<Item = (i64, String)>) {
        self.tables.insert(
            schema.name.clone(),
            FakeTable {
                schema: schema.clone(),
                create_sql: DdlGenerator::new().create_table(schema),
                rows: rows.into_iter().collect(),
            },
        );
    }

    fn table(&self, name: &str) -> SchemaResult<&FakeTable> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::Database(format!("Table '{}' doesn't exist", name)))
    }

    pub fn answer(&mut self, sql: &str) -> SchemaResult<QueryOutput> {
        let lower = sql.to_lowercase();
        let idents: Vec<String> = IDENT_RE
            .captures_iter(sql)
            .map(|c| c[1].to_string())
            .collect();
        let named = || NAME_RE.captures(sql).map(|c| c[1].to_string()).unwrap_or_default();

        if lower.starts_with("select count(*) as n from information_schema.tables") {
            let exists = self.tables.contains_key(&named());
            return Ok(QueryOutput::rows(vec![Row::new().with("n", exists as i64)]));
        }
        if lower.contains("from information_schema.tables t") {
            return Ok(match self.tables.get(&named()) {
                Some(table) => {
                    let options = &table.schema.options;
                    QueryOutput::rows(vec![Row::new()
                        .with("engine", options.engine.clone())
                        .with("charset", options.charset.clone())
                        .with("collation", options.collation.clone())
                        .with("comment", options.comment.clone().unwrap_or_default())])
                }
                None => QueryOutput::default(),
            });
        }
        if lower.contains("information_schema.columns") {
            return Ok(QueryOutput::rows(
                self.table(&named())?.schema.columns.iter().map(column_row).collect(),
            ));
        }
        if lower.contains("information_schema.statistics") {
            return Ok(QueryOutput::rows(statistics_rows(&self.table(&named())?.schema)));
        }
        if lower.contains("information_schema.key_column_usage") {
            return Ok(QueryOutput::default());
        }
        if lower.starts_with("show create table") {
            let table = self.table(&idents[0])?;
            return Ok(QueryOutput::rows(vec![Row::new()
                .with("Table", idents[0].as_str())
                .with("Create Table", table.create_sql.as_str())]));
        }
        if lower.starts_with("select count(*) as n from `") {
            let n = self.table(&idents[0])?.rows.len() as i64;
            return Ok(QueryOutput::rows(vec![Row::new().with("n", n)]));
        }
        if lower.starts_with("select max(") {
            let table = self.table(&idents[2])?;
            let after = capture_i64(&AFTER_RE, sql);
            let limit = capture_i64(&LIMIT_RE, sql).unwrap_or(i64::MAX) as usize;
            let chunk: Vec<i64> = table
                .rows
                .keys()
                .filter(|id| after.map_or(true, |a| **id > a))
                .take(limit)
                .copied()
                .collect();
            return Ok(QueryOutput::rows(vec![Row::new()
                .with("upper", chunk.last().copied())
                .with("n", chunk.len() as i64)]));
        }
        if lower.starts_with("insert into") {
            let source = FROM_RE
                .captures(sql)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            let after = capture_i64(&AFTER_RE, sql);
            let upto = capture_i64(&UPTO_RE, sql).unwrap_or(i64::MAX);
            let copied: Vec<(i64, String)> = self
                .table(&source)?
                .rows
                .range(..=upto)
                .filter(|(id, _)| after.map_or(true, |a| **id > a))
                .map(|(id, payload)| (*id, payload.clone()))
                .collect();
            let target = self
                .tables
                .get_mut(&idents[0])
                .ok_or_else(|| SchemaError::Database(format!("Table '{}' doesn't exist", idents[0])))?;
            let affected = copied.len() as u64;
            target.rows.extend(copied);
            return Ok(QueryOutput::affected(affected));
        }
        if lower.starts_with("create table") {
            let name = idents[0].clone();
            if self.tables.contains_key(&name) {
                return Err(SchemaError::Database(format!("Table '{}' already exists", name)));
            }
            let source = name
                .strip_suffix("__shadow")
                .ok_or_else(|| SchemaError::Database(format!("cannot create '{}' here", name)))?;
            let mut schema = self.table(source)?.schema.clone();
            schema.name = name.clone();
            self.tables.insert(
                name,
                FakeTable {
                    schema,
                    create_sql: sql.to_string(),
                    rows: BTreeMap::new(),
                },
            );
            return Ok(QueryOutput::default());
        }
        if lower.starts_with("rename table") {
            for pair in idents.chunks(2) {
                let mut table = self
                    .tables
                    .remove(&pair[0])
                    .ok_or_else(|| SchemaError::Database(format!("Table '{}' doesn't exist", pair[0])))?;
                table.schema.name = pair[1].clone();
                self.tables.insert(pair[1].clone(), table);
            }
            return Ok(QueryOutput::default());
        }
        if lower.starts_with("drop table") {
            let removed = self.tables.remove(&idents[0]);
            if removed.is_none() && !lower.contains("if exists") {
                return Err(SchemaError::Database(format!("Unknown table '{}'", idents[0])));
            }
            return Ok(QueryOutput::default());
        }
        Ok(QueryOutput::default())
    }
}

/// A scripted handle answering from `server`; `setup` registers rules that
/// take precedence (e.g. injected failures)
pub fn connect(server: &SharedServer, setup: impl FnOnce(&ScriptedDatabase)) -> Arc<ScriptedDatabase> {
    let db = ScriptedDatabase::new();
    setup(&db);
    let state = server.clone();
    db.handle("", move |sql| state.lock().unwrap().answer(sql));
    Arc::new(db)
}

fn capture_i64(re: &Regex, sql: &str) -> Option<i64> {
    re.captures(sql).and_then(|c| c[1].parse().ok())
}

fn column_row(column: &tidemark_schema::Column) -> Row {
    let mut column_type = column.sql_type.to_lowercase();
    if column.unsigned {
        column_type.push_str(" unsigned");
    }
    let mut extra = Vec::new();
    if column.auto_increment {
        extra.push("auto_increment");
    }
    let default = match &column.default {
        None => None,
        Some(DefaultValue::Literal(value)) => Some(value.clone()),
        Some(DefaultValue::Expression(expr)) => {
            extra.push("DEFAULT_GENERATED");
            Some(expr.clone())
        }
    };
    Row::new()
        .with("name", column.name.as_str())
        .with("column_type", column_type)
        .with("nullable", if column.nullable { "YES" } else { "NO" })
        .with("default_value", default)
        .with("extra", extra.join(" "))
        .with("comment", column.comment.clone().unwrap_or_default())
}

fn statistics_rows(schema: &TableSchema) -> Vec<Row> {
    let mut rows: Vec<Row> = schema
        .primary_key
        .iter()
        .map(|column| {
            Row::new()
                .with("index_name", "PRIMARY")
                .with("column_name", column.as_str())
                .with("non_unique", 0i64)
                .with("index_type", "BTREE")
        })
        .collect();
    for index in schema.indexes.values() {
        for column in &index.columns {
            rows.push(
                Row::new()
                    .with("index_name", index.name.as_str())
                    .with("column_name", column.as_str())
                    .with("non_unique", if index.unique { 0i64 } else { 1 })
                    .with("index_type", format!("{:?}", index.index_type).to_uppercase()),
            );
        }
    }
    rows
}
