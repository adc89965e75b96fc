use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use lumina::models::DEFAULT_RETENTION_DAYS;
use lumina::sweep::sweep_expired;

/// Permanently delete content that has been in the trash past the
/// retention window. Intended to run from cron or a systemd timer.
#[derive(Parser, Debug)]
#[command(name = "cleanup-trash", version)]
struct Args {
    /// Number of days after which trashed items are permanently deleted
    #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
    days: i64,

    /// Show what would be deleted without actually deleting
    #[arg(long)]
    dry_run: bool,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .init();

    let args = Args::parse();

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = lumina::repo::inmem::InMemRepo::new();

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
        let pool = PgPoolOptions::new().max_connections(1).connect(&db_url).await?;
        lumina::repo::pg::PgRepo::new(pool)
    };

    let report = sweep_expired(&repo, args.days, args.dry_run).await?;

    if report.items.is_empty() {
        println!("No content found to delete.");
        return Ok(());
    }

    if report.dry_run {
        println!("DRY RUN: Would permanently delete {} items:", report.items.len());
    } else {
        println!("Permanently deleting {} items:", report.items.len());
    }
    for item in &report.items {
        println!("  - \"{}\" ({} days in trash)", item.title, item.days_in_trash);
    }
    if !report.dry_run {
        println!("Successfully deleted {} items.", report.deleted);
    }
    Ok(())
}
