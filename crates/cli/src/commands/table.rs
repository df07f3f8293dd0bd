use std::path::Path;

use anyhow::{bail, Context as _};
use tidemark_schema::ddl::partition_clause;
use tidemark_schema::{
    ModelDescriptor, PartitionKind, PartitionSpec, PendingChangeReport, SchemaSync,
    TableTransformer, TransformOptions, TransformReport,
};

use super::Context;

pub async fn update(context: &Context, model: &Path, yes: bool, dry_run: bool) -> anyhow::Result<()> {
    let descriptor = ModelDescriptor::load(model)
        .with_context(|| format!("Failed to load model from {}", model.display()))?;
    let sync = SchemaSync::new(context.connect().await?);
    let plan = sync.plan(&descriptor).await?;

    if plan.is_empty() {
        println!("Table '{}' is up to date", plan.table);
        return Ok(());
    }

    if plan.create {
        println!("Table '{}' does not exist and will be created", plan.table);
    }
    print_report(&plan.report);
    for statement in &plan.statements {
        println!("  {};", statement);
    }

    if dry_run || plan.statements.is_empty() {
        return Ok(());
    }
    if plan.report.needs_confirmation() && !yes {
        bail!(
            "Renames or drops on '{}' need confirmation; re-run with --yes to apply",
            plan.table
        );
    }

    let applied = sync.apply(&plan).await?;
    println!("✅ Updated '{}' ({} statement(s))", plan.table, applied);
    Ok(())
}

pub async fn partition(
    context: &Context,
    table: &str,
    column: &str,
    kind: PartitionKind,
    count: u32,
    batch_size: u64,
) -> anyhow::Result<()> {
    let spec = PartitionSpec {
        kind,
        column: column.to_string(),
        count,
    };
    println!("Rewriting '{}' with {}", table, partition_clause(&spec));
    let report = transformer(context, batch_size).await?.partition(table, spec).await?;
    print_transform(&report);
    Ok(())
}

pub async fn unpartition(context: &Context, table: &str, batch_size: u64) -> anyhow::Result<()> {
    println!("Rewriting '{}' without partitioning", table);
    let report = transformer(context, batch_size).await?.unpartition(table).await?;
    print_transform(&report);
    Ok(())
}

pub async fn cleanup(context: &Context, table: &str) -> anyhow::Result<()> {
    let dropped = transformer(context, TransformOptions::default().batch_size)
        .await?
        .cleanup_leftovers(table)
        .await?;
    if dropped.is_empty() {
        println!("Nothing to clean up for '{}'", table);
    }
    for name in dropped {
        println!("🗑️  Dropped '{}'", name);
    }
    Ok(())
}

async fn transformer(context: &Context, batch_size: u64) -> anyhow::Result<TableTransformer> {
    let db = context.connect().await?;
    let options = TransformOptions::default().batch_size(batch_size);
    Ok(TableTransformer::with_options(db, options).on_progress(|progress| {
        println!(
            "  {}/{} rows ({} batches, {:.0} rows/s)",
            progress.rows_copied, progress.source_rows, progress.batches, progress.rows_per_second
        );
    }))
}

fn print_report(report: &PendingChangeReport) {
    for (from, to) in &report.renames {
        println!("⚠️  Rename column '{}' to '{}'", from, to);
    }
    for column in &report.dropped_columns {
        println!("⚠️  Drop column '{}'", column);
    }
    for index in &report.dropped_indexes {
        println!("⚠️  Drop index '{}'", index);
    }
    for fk in &report.dropped_foreign_keys {
        println!("⚠️  Drop foreign key '{}'", fk);
    }
    if let Some(change) = &report.requires_transform {
        let describe = |spec: &Option<PartitionSpec>| match spec {
            Some(spec) => partition_clause(spec),
            None => "no partitioning".to_string(),
        };
        println!(
            "⚠️  Partitioning differs ({} → {}); run `tidemark table partition` or `tidemark table unpartition`",
            describe(&change.from),
            describe(&change.to)
        );
    }
}

fn print_transform(report: &TransformReport) {
    println!(
        "✅ Rewrote '{}': {} of {} row(s) in {} batch(es), {:.1}s",
        report.table,
        report.rows_copied,
        report.source_rows,
        report.batches,
        report.elapsed.as_secs_f64()
    );
}
