use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{ContentQuery, Id};
use crate::repo::{Repo, RepoError};

/// Action tokens accepted by the bulk endpoints. Content rows take the
/// first five; comments take approve/unapprove/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Trash,
    Restore,
    Delete,
    Publish,
    Draft,
    Approve,
    Unapprove,
}

impl std::fmt::Display for BulkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            BulkAction::Trash => "trash",
            BulkAction::Restore => "restore",
            BulkAction::Delete => "delete",
            BulkAction::Publish => "publish",
            BulkAction::Draft => "draft",
            BulkAction::Approve => "approve",
            BulkAction::Unapprove => "unapprove",
        };
        f.write_str(token)
    }
}

impl std::str::FromStr for BulkAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trash" => Ok(BulkAction::Trash),
            "restore" => Ok(BulkAction::Restore),
            "delete" => Ok(BulkAction::Delete),
            "publish" => Ok(BulkAction::Publish),
            "draft" => Ok(BulkAction::Draft),
            "approve" => Ok(BulkAction::Approve),
            "unapprove" => Ok(BulkAction::Unapprove),
            _ => Err(()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BulkError {
    #[error("no items selected")]
    NoSelection,
    #[error("action '{0}' does not apply to this target")]
    Unsupported(BulkAction),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkOutcome {
    pub applied: u64,
    pub message: String,
    /// Listing URL carrying the caller's preserved filter context.
    pub redirect: String,
}

/// Apply one action across a set of content ids. Per-action storage
/// mutations are atomic; items already in the target state are skipped.
pub async fn apply_content(
    repo: &dyn Repo,
    action: BulkAction,
    ids: &[Id],
    actor: &str,
    ctx: &ContentQuery,
) -> Result<BulkOutcome, BulkError> {
    if ids.is_empty() {
        return Err(BulkError::NoSelection);
    }
    let (applied, message) = match action {
        BulkAction::Trash => {
            let n = repo.trash_content_many(ids, actor).await?;
            (n, format!("{n} items moved to trash."))
        }
        BulkAction::Restore => {
            let n = repo.restore_content_many(ids).await?;
            (n, format!("{n} items restored as drafts."))
        }
        BulkAction::Delete => {
            let n = repo.delete_content_many(ids).await?;
            (n, format!("{n} items permanently deleted."))
        }
        BulkAction::Publish => {
            let n = repo.publish_content_many(ids).await?;
            (n, format!("{n} items published."))
        }
        BulkAction::Draft => {
            let n = repo.draft_content_many(ids).await?;
            (n, format!("{n} items moved to draft."))
        }
        other => return Err(BulkError::Unsupported(other)),
    };
    Ok(BulkOutcome {
        applied,
        message,
        redirect: format!("/api/v1/admin/content?{}", ctx.to_query_string()),
    })
}

/// Comment moderation counterpart; deletes cascade to replies.
pub async fn apply_comments(
    repo: &dyn Repo,
    action: BulkAction,
    ids: &[Id],
) -> Result<BulkOutcome, BulkError> {
    if ids.is_empty() {
        return Err(BulkError::NoSelection);
    }
    let (applied, message) = match action {
        BulkAction::Approve => {
            let n = repo.set_comment_approved_many(ids, true).await?;
            (n, format!("{n} comments approved."))
        }
        BulkAction::Unapprove => {
            let n = repo.set_comment_approved_many(ids, false).await?;
            (n, format!("{n} comments unapproved."))
        }
        BulkAction::Delete => {
            let n = repo.delete_comment_many(ids).await?;
            (n, format!("{n} comments deleted."))
        }
        other => return Err(BulkError::Unsupported(other)),
    };
    Ok(BulkOutcome {
        applied,
        message,
        redirect: "/api/v1/admin/comments".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tokens_round_trip() {
        for token in ["trash", "restore", "delete", "publish", "draft", "approve", "unapprove"] {
            let action: BulkAction = token.parse().unwrap();
            assert_eq!(action.to_string(), token);
        }
        assert!("purge".parse::<BulkAction>().is_err());
    }
}
