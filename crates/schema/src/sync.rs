//! Model synchronisation
//!
//! The update-table flow as two engine calls: [`SchemaSync::plan`] parses a
//! model, reads the live table and renders the statements that would bring
//! it in line; [`SchemaSync::apply`] executes a plan. Between the two the
//! caller inspects the [`PendingChangeReport`] and decides.

use std::sync::Arc;

use serde::Serialize;

use crate::annotation::{AnnotationParser, ModelDescriptor};
use crate::backends::Database;
use crate::change::SchemaChange;
use crate::ddl::DdlGenerator;
use crate::differ::{PendingChangeReport, SchemaDiffer};
use crate::error::{SchemaError, SchemaResult};
use crate::reader::SchemaReader;
use crate::table::TableSchema;

/// Everything an update would do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatePlan {
    pub table: String,
    /// The table does not exist yet and will be created
    pub create: bool,
    #[serde(skip)]
    pub changes: Vec<SchemaChange>,
    pub statements: Vec<String>,
    pub report: PendingChangeReport,
    #[serde(skip)]
    pub desired: TableSchema,
}

impl UpdatePlan {
    /// Nothing to execute and nothing to report
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.report.requires_transform.is_none()
    }
}

pub struct SchemaSync {
    db: Arc<dyn Database>,
    parser: AnnotationParser,
}

impl SchemaSync {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self::with_parser(db, AnnotationParser::new())
    }

    pub fn with_parser(db: Arc<dyn Database>, parser: AnnotationParser) -> Self {
        Self { db, parser }
    }

    /// Work out what updating the model's table would do
    pub async fn plan(&self, model: &ModelDescriptor) -> SchemaResult<UpdatePlan> {
        let parsed = self.parser.parse_model(model)?;
        let desired = parsed.desired_schema()?;
        let reader = SchemaReader::new(self.db.clone());
        let ddl = DdlGenerator::new();

        if !reader.table_exists(&parsed.table).await? {
            if parsed.columns.iter().any(|c| c.drop || c.rename_from.is_some()) {
                tracing::warn!(
                    "Table '{}' does not exist; drop and rename markers are ignored",
                    parsed.table
                );
            }
            return Ok(UpdatePlan {
                table: parsed.table.clone(),
                create: true,
                changes: Vec::new(),
                statements: vec![ddl.create_table(&desired)],
                report: PendingChangeReport {
                    table: parsed.table,
                    ..Default::default()
                },
                desired,
            });
        }

        let live = reader.read(&parsed.table).await?;
        let diff = SchemaDiffer::new().diff_desired(&parsed, &live)?;
        let statements = ddl.up_statements(&parsed.table, &diff.changes);

        tracing::info!(
            "Planned {} statement(s) for table '{}'",
            statements.len(),
            parsed.table
        );

        Ok(UpdatePlan {
            table: parsed.table,
            create: false,
            changes: diff.changes,
            statements,
            report: diff.report,
            desired,
        })
    }

    /// Execute a plan's statements in order, stopping at the first failure
    ///
    /// Returns how many statements ran. Statements before a failure stay
    /// applied (DDL is not transactional).
    pub async fn apply(&self, plan: &UpdatePlan) -> SchemaResult<usize> {
        for (done, statement) in plan.statements.iter().enumerate() {
            tracing::debug!("Applying to '{}': {}", plan.table, statement);
            if let Err(e) = self.db.execute(statement).await {
                tracing::error!(
                    "Update of '{}' stopped after {} statement(s): {}",
                    plan.table,
                    done,
                    e
                );
                return Err(SchemaError::StatementFailed {
                    context: format!("update of table '{}'", plan.table),
                    statement: statement.clone(),
                    message: e.to_string(),
                });
            }
        }
        tracing::info!("Updated table '{}'", plan.table);
        Ok(plan.statements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{QueryOutput, Row, ScriptedDatabase};

    fn script_live_table(db: &ScriptedDatabase) {
        db.respond(
            "COUNT(*) AS n FROM information_schema.TABLES",
            QueryOutput::rows(vec![Row::new().with("n", 1i64)]),
        );
        db.respond(
            "information_schema.TABLES t",
            QueryOutput::rows(vec![Row::new().with("engine", "InnoDB")]),
        );
        let column = |name: &str, column_type: &str, extra: &str| {
            Row::new()
                .with("name", name)
                .with("column_type", column_type)
                .with("nullable", "NO")
                .with("default_value", None::<String>)
                .with("extra", extra)
                .with("comment", "")
        };
        db.respond(
            "information_schema.COLUMNS",
            QueryOutput::rows(vec![
                column("id", "int(10) unsigned", "auto_increment"),
                column("name", "varchar(255)", ""),
            ]),
        );
        db.respond(
            "information_schema.STATISTICS",
            QueryOutput::rows(vec![Row::new()
                .with("index_name", "PRIMARY")
                .with("column_name", "id")
                .with("non_unique", 0i64)
                .with("index_type", "BTREE")]),
        );
        db.respond(
            "SHOW CREATE TABLE",
            QueryOutput::rows(vec![Row::new().with("Create Table", "CREATE TABLE `t` (...) ENGINE=InnoDB")]),
        );
    }

    fn model() -> ModelDescriptor {
        ModelDescriptor::new("T")
            .table("t")
            .field("id", "@increments")
            .field("name", "@varchar")
            .field("email", "@varchar @nullable")
    }

    #[tokio::test]
    async fn test_plan_adds_nullable_column() {
        let db = Arc::new(ScriptedDatabase::new());
        script_live_table(&db);
        let sync = SchemaSync::new(db.clone());

        let plan = sync.plan(&model()).await.unwrap();

        assert!(!plan.create);
        assert_eq!(
            plan.statements,
            vec!["ALTER TABLE `t` ADD COLUMN `email` VARCHAR(255) NULL"]
        );
        assert!(!plan.report.needs_confirmation());
        assert!(!db.executed("ALTER TABLE"));

        assert_eq!(sync.apply(&plan).await.unwrap(), 1);
        assert!(db.executed("ADD COLUMN `email`"));
    }

    #[tokio::test]
    async fn test_missing_table_plans_create() {
        let db = Arc::new(ScriptedDatabase::new());
        let plan = SchemaSync::new(db).plan(&model()).await.unwrap();
        assert!(plan.create);
        assert_eq!(plan.statements.len(), 1);
        assert!(plan.statements[0].starts_with("CREATE TABLE `t` ("));
    }

    #[tokio::test]
    async fn test_apply_stops_at_first_failure() {
        let db = Arc::new(ScriptedDatabase::new());
        db.fail("DROP INDEX", "Can't DROP 'x'; check that column/key exists");
        let plan = UpdatePlan {
            table: "t".to_string(),
            create: false,
            changes: Vec::new(),
            statements: vec![
                "ALTER TABLE `t` ADD COLUMN `a` INT(11) NOT NULL".to_string(),
                "ALTER TABLE `t` DROP INDEX `x`".to_string(),
                "ALTER TABLE `t` ADD COLUMN `b` INT(11) NOT NULL".to_string(),
            ],
            report: PendingChangeReport::default(),
            desired: TableSchema::new("t"),
        };

        let err = SchemaSync::new(db.clone()).apply(&plan).await.unwrap_err();
        match err {
            SchemaError::StatementFailed { statement, .. } => {
                assert_eq!(statement, "ALTER TABLE `t` DROP INDEX `x`")
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!db.executed("`b`"));
    }
}
