use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::SweptItem;
use crate::repo::{Repo, RepoResult};

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepReport {
    pub items: Vec<SweptItem>,
    pub deleted: u64,
    pub dry_run: bool,
}

/// Permanently delete content trashed more than `retention_days` ago.
/// A dry run reports the candidates without touching storage. Running the
/// sweep twice in a row deletes nothing the second time.
pub async fn sweep_expired(
    repo: &dyn Repo,
    retention_days: i64,
    dry_run: bool,
) -> RepoResult<SweepReport> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let items = if dry_run {
        repo.list_expired(cutoff).await?
    } else {
        repo.purge_expired(cutoff).await?
    };
    let deleted = if dry_run { 0 } else { items.len() as u64 };
    Ok(SweepReport { items, deleted, dry_run })
}
