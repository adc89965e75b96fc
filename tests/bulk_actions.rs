#![cfg(feature = "inmem-store")]

use lumina::bulk::{apply_comments, apply_content, BulkAction, BulkError};
use lumina::models::*;
use lumina::repo::inmem::InMemRepo;
use lumina::repo::{CommentRepo, ContentRepo};

fn new_post(title: &str, publish: bool) -> NewContent {
    NewContent {
        kind: ContentKind::Post,
        title: title.to_string(),
        slug: None,
        body: "body".to_string(),
        excerpt: None,
        author_name: "alice".to_string(),
        categories: vec![],
        is_featured: false,
        publish,
    }
}

#[actix_rt::test]
async fn empty_selection_is_rejected_without_mutating() {
    let repo = InMemRepo::ephemeral();
    let item = repo.create_content(new_post("A", true)).await.unwrap();

    let err = apply_content(&repo, BulkAction::Trash, &[], "admin-1", &ContentQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BulkError::NoSelection));

    let after = repo.get_content(item.id).await.unwrap();
    assert!(!after.is_trashed);
}

#[actix_rt::test]
async fn bulk_trash_skips_already_trashed() {
    let repo = InMemRepo::ephemeral();
    let a = repo.create_content(new_post("A", true)).await.unwrap();
    let b = repo.create_content(new_post("B", true)).await.unwrap();
    repo.trash_content(a.id, "admin-1").await.unwrap();

    let outcome = apply_content(
        &repo,
        BulkAction::Trash,
        &[a.id, b.id],
        "admin-2",
        &ContentQuery::default(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.message, "1 items moved to trash.");

    // the earlier trashing is untouched
    let a = repo.get_content(a.id).await.unwrap();
    assert_eq!(a.trashed_by.as_deref(), Some("admin-1"));
    let b = repo.get_content(b.id).await.unwrap();
    assert_eq!(b.trashed_by.as_deref(), Some("admin-2"));
}

#[actix_rt::test]
async fn bulk_restore_skips_active_items() {
    let repo = InMemRepo::ephemeral();
    let a = repo.create_content(new_post("A", true)).await.unwrap();
    let b = repo.create_content(new_post("B", true)).await.unwrap();
    repo.trash_content(a.id, "admin-1").await.unwrap();

    let outcome = apply_content(
        &repo,
        BulkAction::Restore,
        &[a.id, b.id],
        "admin-1",
        &ContentQuery::default(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.applied, 1);

    let a = repo.get_content(a.id).await.unwrap();
    assert!(!a.is_trashed);
    assert_eq!(a.status, ContentStatus::Draft);
    // untouched active item keeps its published status
    let b = repo.get_content(b.id).await.unwrap();
    assert_eq!(b.status, ContentStatus::Published);
}

#[actix_rt::test]
async fn bulk_delete_only_touches_trashed_items() {
    let repo = InMemRepo::ephemeral();
    let a = repo.create_content(new_post("A", true)).await.unwrap();
    let b = repo.create_content(new_post("B", true)).await.unwrap();
    repo.trash_content(a.id, "admin-1").await.unwrap();

    let outcome = apply_content(
        &repo,
        BulkAction::Delete,
        &[a.id, b.id],
        "admin-1",
        &ContentQuery::default(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.applied, 1);
    assert!(repo.get_content(a.id).await.is_err());
    assert!(repo.get_content(b.id).await.is_ok());
}

#[actix_rt::test]
async fn bulk_publish_stamps_date_once_and_skips_trashed() {
    let repo = InMemRepo::ephemeral();
    let draft = repo.create_content(new_post("Draft", false)).await.unwrap();
    let published = repo.create_content(new_post("Published", true)).await.unwrap();
    let first_date = published.published_date.unwrap();
    let doomed = repo.create_content(new_post("Doomed", false)).await.unwrap();
    repo.trash_content(doomed.id, "admin-1").await.unwrap();

    let outcome = apply_content(
        &repo,
        BulkAction::Publish,
        &[draft.id, published.id, doomed.id],
        "admin-1",
        &ContentQuery::default(),
    )
    .await
    .unwrap();
    // only the active draft transitions
    assert_eq!(outcome.applied, 1);

    let draft = repo.get_content(draft.id).await.unwrap();
    assert_eq!(draft.status, ContentStatus::Published);
    assert!(draft.published_date.is_some());
    let published = repo.get_content(published.id).await.unwrap();
    assert_eq!(published.published_date.unwrap(), first_date);
    let doomed = repo.get_content(doomed.id).await.unwrap();
    assert_eq!(doomed.status, ContentStatus::Draft);
}

#[actix_rt::test]
async fn bulk_draft_skips_trashed_and_counts_transitions() {
    let repo = InMemRepo::ephemeral();
    let a = repo.create_content(new_post("A", true)).await.unwrap();
    let b = repo.create_content(new_post("B", false)).await.unwrap();
    let doomed = repo.create_content(new_post("Doomed", true)).await.unwrap();
    repo.trash_content(doomed.id, "admin-1").await.unwrap();

    let outcome = apply_content(
        &repo,
        BulkAction::Draft,
        &[a.id, b.id, doomed.id],
        "admin-1",
        &ContentQuery::default(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.applied, 1);
    assert_eq!(repo.get_content(a.id).await.unwrap().status, ContentStatus::Draft);
}

#[actix_rt::test]
async fn unknown_ids_are_skipped() {
    let repo = InMemRepo::ephemeral();
    let a = repo.create_content(new_post("A", true)).await.unwrap();
    let outcome = apply_content(
        &repo,
        BulkAction::Trash,
        &[a.id, 9999],
        "admin-1",
        &ContentQuery::default(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.applied, 1);
}

#[actix_rt::test]
async fn comment_actions_are_rejected_on_content_target() {
    let repo = InMemRepo::ephemeral();
    let err = apply_content(&repo, BulkAction::Approve, &[1], "admin-1", &ContentQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BulkError::Unsupported(BulkAction::Approve)));

    let err = apply_comments(&repo, BulkAction::Publish, &[1]).await.unwrap_err();
    assert!(matches!(err, BulkError::Unsupported(BulkAction::Publish)));
}

#[actix_rt::test]
async fn redirect_preserves_filter_context() {
    let repo = InMemRepo::ephemeral();
    let a = repo.create_content(new_post("A", true)).await.unwrap();

    let ctx = ContentQuery {
        kind: Some(ContentKind::Post),
        status: StatusTab::Trash,
        category: Some("news".to_string()),
        month: None,
        search: Some("hello world".to_string()),
        page: 2,
        per_page: 20,
    };
    let outcome = apply_content(&repo, BulkAction::Trash, &[a.id], "admin-1", &ctx)
        .await
        .unwrap();
    assert_eq!(
        outcome.redirect,
        "/api/v1/admin/content?status=trash&kind=post&category=news&search=hello%20world&page=2"
    );
}

#[actix_rt::test]
async fn bulk_comment_moderation_and_cascade_delete() {
    let repo = InMemRepo::ephemeral();
    let post = repo.create_content(new_post("A", true)).await.unwrap();
    let c1 = repo
        .submit_comment(NewComment {
            post_id: post.id,
            parent_id: None,
            author_name: "bob".to_string(),
            author_email: "bob@example.com".to_string(),
            website: None,
            body: "first".to_string(),
        })
        .await
        .unwrap();
    let c2 = repo
        .submit_comment(NewComment {
            post_id: post.id,
            parent_id: None,
            author_name: "carol".to_string(),
            author_email: "carol@example.com".to_string(),
            website: None,
            body: "second".to_string(),
        })
        .await
        .unwrap();

    let outcome = apply_comments(&repo, BulkAction::Approve, &[c1.id, c2.id]).await.unwrap();
    assert_eq!(outcome.applied, 2);
    assert_eq!(outcome.redirect, "/api/v1/admin/comments");
    assert!(repo.get_comment(c1.id).await.unwrap().approved);

    // a reply under c1; deleting c1 takes the reply with it
    let reply = repo
        .reply_comment(c1.id, "mod", "mod@example.com", "thanks")
        .await
        .unwrap();
    let outcome = apply_comments(&repo, BulkAction::Delete, &[c1.id]).await.unwrap();
    assert_eq!(outcome.applied, 1);
    assert!(repo.get_comment(c1.id).await.is_err());
    assert!(repo.get_comment(reply.id).await.is_err());
    assert!(repo.get_comment(c2.id).await.is_ok());
}
