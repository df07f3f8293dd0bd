use std::path::Path;

use anyhow::Context as _;
use tidemark_schema::migrations::MigrationStatus;
use tidemark_schema::{AnnotationParser, MigrationManager, MigrationRunner, ModelDescriptor};

use super::Context;

pub async fn make(context: &Context, name: &str) -> anyhow::Result<()> {
    let manager = MigrationManager::with_config(context.migration_config());
    let migration = manager.create_migration(name).await?;
    println!(
        "Created migration: {}",
        context
            .migrations_dir
            .join(format!("{}.sql", migration.id))
            .display()
    );
    Ok(())
}

pub async fn generate(context: &Context, name: &str, model: &Path) -> anyhow::Result<()> {
    let descriptor = ModelDescriptor::load(model)
        .with_context(|| format!("Failed to load model from {}", model.display()))?;
    let parsed = AnnotationParser::new().parse_model(&descriptor)?;
    let desired = parsed.desired_schema()?;

    let manager = MigrationManager::with_config(context.migration_config());
    match manager.generate_migration(name, &desired).await? {
        Some(migration) => {
            println!("Created migration: {}", migration.id);
            for statement in &migration.up_statements {
                println!("  {};", statement);
            }
        }
        None => println!("Table '{}' is unchanged since its last migration", desired.name),
    }
    Ok(())
}

pub async fn run(context: &Context, pretend: bool) -> anyhow::Result<()> {
    let runner = runner(context).await?;

    if pretend {
        let pending = runner.pretend().await?;
        if pending.is_empty() {
            println!("Nothing to migrate");
        }
        for (id, statements) in pending {
            println!("{}:", id);
            for statement in statements {
                println!("  {};", statement);
            }
        }
        return Ok(());
    }

    let result = runner.run().await?;
    if result.applied.is_empty() {
        println!("Nothing to migrate");
        return Ok(());
    }
    for id in &result.applied {
        println!("✅ Migrated: {}", id);
    }
    println!(
        "Applied {} migration(s) in batch {} ({} ms)",
        result.applied.len(),
        result.batch.unwrap_or_default(),
        result.execution_time_ms
    );
    Ok(())
}

pub async fn rollback(context: &Context, steps: usize) -> anyhow::Result<()> {
    let result = runner(context).await?.rollback(steps).await?;
    report_rollback(&result.rolled_back);
    Ok(())
}

pub async fn reset(context: &Context) -> anyhow::Result<()> {
    let result = runner(context).await?.reset().await?;
    report_rollback(&result.rolled_back);
    Ok(())
}

pub async fn status(context: &Context) -> anyhow::Result<()> {
    let entries = runner(context).await?.status().await?;

    println!("Migration Status:");
    println!("================");

    if entries.is_empty() {
        println!("No migrations found");
        return Ok(());
    }

    for entry in entries {
        match entry.status {
            MigrationStatus::Pending => println!("  ⏳ {}", entry.id),
            MigrationStatus::Applied { ran_at, batch } => println!(
                "  ✅ {} (batch {}, {})",
                entry.id,
                batch,
                ran_at.format("%Y-%m-%d %H:%M:%S")
            ),
            MigrationStatus::Missing { ran_at, batch } => println!(
                "  ❌ {} (batch {}, {}; file missing)",
                entry.id,
                batch,
                ran_at.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
    Ok(())
}

async fn runner(context: &Context) -> anyhow::Result<MigrationRunner> {
    let db = context.connect().await?;
    Ok(MigrationRunner::new(
        MigrationManager::with_config(context.migration_config()),
        db,
    ))
}

fn report_rollback(rolled_back: &[String]) {
    if rolled_back.is_empty() {
        println!("Nothing to roll back");
    }
    for id in rolled_back {
        println!("↩️  Rolled back: {}", id);
    }
}
