#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use serde_json::json;

use lumina::auth::{create_jwt, Role};
use lumina::models::*;
use lumina::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use lumina::repo::inmem::InMemRepo;
use lumina::repo::ContentRepo;
use lumina::{config, AppState};
use std::sync::Arc;

fn test_state(repo: InMemRepo) -> web::Data<AppState> {
    // same value across tests so the shared env var never fights itself
    std::env::set_var("JWT_SECRET", "integration-test-secret-0123456789abcdef");
    web::Data::new(AppState {
        repo: Arc::new(repo),
        limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(false),
            RateLimitConfig { comment_limit: 5, comment_window: std::time::Duration::from_secs(300) },
        ),
    })
}

fn bearer(roles: Vec<Role>) -> (&'static str, String) {
    let token = create_jwt("user-1", "Test User", "user@example.com", roles).unwrap();
    ("Authorization", format!("Bearer {token}"))
}

async fn seed_post(repo: &InMemRepo, title: &str, publish: bool) -> ContentItem {
    repo.create_content(NewContent {
        kind: ContentKind::Post,
        title: title.to_string(),
        slug: None,
        body: "body".to_string(),
        excerpt: None,
        author_name: "alice".to_string(),
        categories: vec![],
        is_featured: false,
        publish,
    })
    .await
    .unwrap()
}

#[actix_web::test]
async fn public_read_hides_drafts_and_trash() {
    let repo = InMemRepo::ephemeral();
    let published = seed_post(&repo, "Published", true).await;
    let draft = seed_post(&repo, "Draft", false).await;
    let trashed = seed_post(&repo, "Trashed", true).await;
    repo.trash_content(trashed.id, "admin-1").await.unwrap();

    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&format!("/api/v1/posts/{}", published.slug)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);

    for slug in [&draft.slug, &trashed.slug] {
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/api/v1/posts/{slug}")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), 404);
    }
}

#[actix_web::test]
async fn staff_preview_reaches_drafts() {
    let repo = InMemRepo::ephemeral();
    let draft = seed_post(&repo, "Draft", false).await;
    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;

    let (k, v) = bearer(vec![Role::Author]);
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/posts/{}?preview=1", draft.slug))
            .insert_header((k, v))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn trash_endpoint_requires_admin() {
    let repo = InMemRepo::ephemeral();
    let item = seed_post(&repo, "Post", true).await;
    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;

    let uri = format!("/api/v1/admin/content/{}/trash", item.id);

    let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), 401);

    let (k, v) = bearer(vec![Role::Author]);
    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri(&uri).insert_header((k, v)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 403);

    let (k, v) = bearer(vec![Role::Admin]);
    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri(&uri).insert_header((k, v)).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: ContentItem = test::read_body_json(resp).await;
    assert!(body.is_trashed);
    assert_eq!(body.trashed_by.as_deref(), Some("user-1"));
}

#[actix_web::test]
async fn delete_of_active_item_conflicts() {
    let repo = InMemRepo::ephemeral();
    let item = seed_post(&repo, "Post", true).await;
    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;

    let (k, v) = bearer(vec![Role::Admin]);
    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/v1/admin/content/{}", item.id))
            .insert_header((k.clone(), v.clone()))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 409);

    test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/admin/content/{}/trash", item.id))
            .insert_header((k.clone(), v.clone()))
            .to_request(),
    )
    .await;
    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/v1/admin/content/{}", item.id))
            .insert_header((k, v))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 204);
}

#[actix_web::test]
async fn bulk_endpoint_rejects_empty_selection_and_unknown_actions() {
    let repo = InMemRepo::ephemeral();
    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;
    let (k, v) = bearer(vec![Role::Admin]);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/admin/content/bulk")
            .insert_header((k.clone(), v.clone()))
            .set_json(json!({ "action": "trash", "ids": [] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/admin/content/bulk")
            .insert_header((k, v))
            .set_json(json!({ "action": "obliterate", "ids": [1] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn bulk_redirect_carries_the_listing_filters() {
    let repo = InMemRepo::ephemeral();
    let item = seed_post(&repo, "Post", true).await;
    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;
    let (k, v) = bearer(vec![Role::Admin]);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/admin/content/bulk?status=published&kind=post&page=2")
            .insert_header((k, v))
            .set_json(json!({ "action": "trash", "ids": [item.id] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["applied"], 1);
    assert_eq!(
        body["redirect"],
        "/api/v1/admin/content?status=published&kind=post&page=2"
    );
}

#[actix_web::test]
async fn comment_submission_lands_in_the_moderation_queue() {
    let repo = InMemRepo::ephemeral();
    let post = seed_post(&repo, "Post", true).await;
    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/posts/{}/comments", post.slug))
            .set_json(json!({
                "author_name": "bob",
                "author_email": "bob@example.com",
                "body": "nice post"
            }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let comment: Comment = test::read_body_json(resp).await;
    assert!(!comment.approved);

    // invisible until approved
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/posts/{}/comments", post.slug))
            .to_request(),
    )
    .await;
    let listing: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(listing["total"], 0);

    let (k, v) = bearer(vec![Role::Moderator]);
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/admin/comments/{}/approve", comment.id))
            .insert_header((k, v))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/posts/{}/comments", post.slug))
            .to_request(),
    )
    .await;
    let listing: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(listing["total"], 1);
}

#[actix_web::test]
async fn moderator_reply_returns_created_and_approved() {
    let repo = InMemRepo::ephemeral();
    let post = seed_post(&repo, "Post", true).await;
    let app = test::init_service(App::new().app_data(test_state(repo.clone())).configure(config)).await;

    use lumina::repo::CommentRepo;
    let parent = repo
        .submit_comment(NewComment {
            post_id: post.id,
            parent_id: None,
            author_name: "bob".to_string(),
            author_email: "bob@example.com".to_string(),
            website: None,
            body: "question".to_string(),
        })
        .await
        .unwrap();

    let (k, v) = bearer(vec![Role::Moderator]);
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/admin/comments/{}/reply", parent.id))
            .insert_header((k, v))
            .set_json(json!({ "body": "answer" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let reply: Comment = test::read_body_json(resp).await;
    assert!(reply.approved);
    assert_eq!(reply.author_name, "Test User");
    assert_eq!(reply.parent_id, Some(parent.id));
}

#[actix_web::test]
async fn comment_moderation_requires_moderator() {
    let repo = InMemRepo::ephemeral();
    let app = test::init_service(App::new().app_data(test_state(repo)).configure(config)).await;

    let (k, v) = bearer(vec![Role::Author]);
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/admin/comments")
            .insert_header((k, v))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 403);
}
