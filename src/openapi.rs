use crate::bulk::{BulkAction, BulkOutcome};
use crate::models::{
    Comment, CommentListing, CommentThread, ContentItem, ContentKind, ContentPage, ContentQuery,
    ContentStatus, NewContent, StatusTab, UpdateContent,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_posts,
        crate::routes::get_post,
        crate::routes::list_post_comments,
        crate::routes::submit_comment,
        crate::routes::list_content,
        crate::routes::create_content,
        crate::routes::bulk_content,
    ),
    components(schemas(
        ContentItem, ContentKind, ContentStatus, NewContent, UpdateContent,
        ContentPage, ContentQuery, StatusTab,
        Comment, CommentThread, CommentListing,
        BulkAction, BulkOutcome,
        crate::routes::SubmitCommentRequest, crate::routes::BulkRequest,
        crate::routes::ReplyRequest,
    )),
    tags(
        (name = "posts", description = "Public post and comment reads"),
        (name = "content", description = "Dashboard content management"),
        (name = "comments", description = "Comment moderation"),
    )
)]
pub struct ApiDoc;
