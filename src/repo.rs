use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(&'static str),
    #[error("parent comment belongs to a different post")]
    InvalidParent,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn create_content(&self, new: NewContent) -> RepoResult<ContentItem>;
    async fn update_content(&self, id: Id, upd: UpdateContent) -> RepoResult<ContentItem>;
    async fn get_content(&self, id: Id) -> RepoResult<ContentItem>;
    async fn get_content_by_slug(&self, slug: &str) -> RepoResult<ContentItem>;
    async fn list_content(&self, q: &ContentQuery) -> RepoResult<ContentPage>;

    /// Soft-delete. Errors if the item is already trashed.
    async fn trash_content(&self, id: Id, actor: &str) -> RepoResult<ContentItem>;
    /// Clears the trash fields and lands the item on draft. Errors if the
    /// item is not trashed.
    async fn restore_content(&self, id: Id) -> RepoResult<ContentItem>;
    /// Hard delete; only reachable from the trashed state.
    async fn delete_content(&self, id: Id) -> RepoResult<()>;

    // Bulk primitives. Each call is a single storage-level mutation; items
    // already in the target state (and unknown ids) are skipped, not errors.
    async fn trash_content_many(&self, ids: &[Id], actor: &str) -> RepoResult<u64>;
    async fn restore_content_many(&self, ids: &[Id]) -> RepoResult<u64>;
    async fn delete_content_many(&self, ids: &[Id]) -> RepoResult<u64>;
    async fn publish_content_many(&self, ids: &[Id]) -> RepoResult<u64>;
    async fn draft_content_many(&self, ids: &[Id]) -> RepoResult<u64>;

    /// Items the sweep would delete: trashed before `cutoff`.
    async fn list_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<SweptItem>>;
    /// Delete expired items. The trashed/age predicate is re-evaluated
    /// atomically with the delete, so an item restored in between survives.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<SweptItem>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Visitor submission; always starts unapproved. The parent, when given,
    /// must belong to the same post.
    async fn submit_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// Idempotent approve/unapprove toggle.
    async fn set_comment_approved(&self, id: Id, approved: bool) -> RepoResult<Comment>;
    /// Moderator-authored reply; bypasses moderation.
    async fn reply_comment(
        &self,
        parent_id: Id,
        author_name: &str,
        author_email: &str,
        body: &str,
    ) -> RepoResult<Comment>;
    /// Deletes the comment and cascades to its replies.
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
    async fn list_visible_comments(&self, post_id: Id, show_all: bool) -> RepoResult<CommentListing>;
    async fn list_comments(&self, filter: CommentFilter) -> RepoResult<Vec<Comment>>;
    async fn set_comment_approved_many(&self, ids: &[Id], approved: bool) -> RepoResult<u64>;
    async fn delete_comment_many(&self, ids: &[Id]) -> RepoResult<u64>;
    async fn comment_counts(&self) -> RepoResult<CommentCounts>;
}

pub trait Repo: ContentRepo + CommentRepo {}

impl<T> Repo for T where T: ContentRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use log::{info, warn};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        content: HashMap<Id, ContentItem>,
        comments: HashMap<Id, Comment>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn slug_taken(&self, slug: &str, exclude: Option<Id>) -> bool {
            self.content
                .values()
                .any(|c| c.slug == slug && Some(c.id) != exclude)
        }

        /// Append a numeric suffix until the generated slug is free.
        fn unique_slug(&self, base: &str) -> String {
            let base = if base.is_empty() { "untitled".to_string() } else { base.to_string() };
            if !self.slug_taken(&base, None) {
                return base;
            }
            let mut n = 2;
            loop {
                let candidate = format!("{base}-{n}");
                if !self.slug_taken(&candidate, None) {
                    return candidate;
                }
                n += 1;
            }
        }

        /// Comment ids reachable from `roots` through parent links,
        /// roots included.
        fn comment_subtree(&self, roots: &[Id]) -> Vec<Id> {
            let mut out: Vec<Id> = roots.to_vec();
            let mut frontier: Vec<Id> = roots.to_vec();
            while !frontier.is_empty() {
                let next: Vec<Id> = self
                    .comments
                    .values()
                    .filter(|c| c.parent_id.map(|p| frontier.contains(&p)).unwrap_or(false))
                    .map(|c| c.id)
                    .collect();
                out.extend(&next);
                frontier = next;
            }
            out
        }

        fn remove_content(&mut self, id: Id) {
            self.content.remove(&id);
            self.comments.retain(|_, c| c.post_id != id);
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<Option<PathBuf>>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("LUMINA_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(path, s) {
                    warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let path = Self::snapshot_path();
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(Some(path)),
            }
        }

        /// Repo with no snapshot persistence; used by tests.
        pub fn ephemeral() -> Self {
            Self {
                state: Arc::new(RwLock::new(State::default())),
                snapshot_path: Arc::new(None),
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ContentRepo for InMemRepo {
        async fn create_content(&self, new: NewContent) -> RepoResult<ContentItem> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let slug = match new.slug.as_deref().filter(|v| !v.is_empty()) {
                Some(explicit) => {
                    if s.slug_taken(explicit, None) {
                        return Err(RepoError::Conflict);
                    }
                    explicit.to_string()
                }
                None => s.unique_slug(&slugify(&new.title)),
            };
            let id = s.next_id();
            let item = ContentItem {
                id,
                kind: new.kind,
                title: new.title,
                slug,
                body: new.body,
                excerpt: new.excerpt,
                author_name: new.author_name,
                categories: new.categories,
                is_featured: new.is_featured,
                status: if new.publish { ContentStatus::Published } else { ContentStatus::Draft },
                published_date: new.publish.then_some(now),
                is_trashed: false,
                trashed_at: None,
                trashed_by: None,
                created_at: now,
                updated_at: now,
            };
            s.content.insert(id, item.clone());
            drop(s);
            self.persist();
            Ok(item)
        }

        async fn update_content(&self, id: Id, upd: UpdateContent) -> RepoResult<ContentItem> {
            let mut s = self.state.write().unwrap();
            if let Some(ref slug) = upd.slug {
                if s.slug_taken(slug, Some(id)) {
                    return Err(RepoError::Conflict);
                }
            }
            let now = Utc::now();
            let item = s.content.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title {
                item.title = title;
            }
            if let Some(slug) = upd.slug {
                item.slug = slug;
            }
            if let Some(body) = upd.body {
                item.body = body;
            }
            if let Some(excerpt) = upd.excerpt {
                item.excerpt = Some(excerpt);
            }
            if let Some(categories) = upd.categories {
                item.categories = categories;
            }
            if let Some(featured) = upd.is_featured {
                item.is_featured = featured;
            }
            if let Some(status) = upd.status {
                item.status = status;
                // first publish stamps the date; re-publishing keeps it
                if status == ContentStatus::Published && item.published_date.is_none() {
                    item.published_date = Some(now);
                }
            }
            item.updated_at = now;
            let updated = item.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn get_content(&self, id: Id) -> RepoResult<ContentItem> {
            let s = self.state.read().unwrap();
            s.content.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_content_by_slug(&self, slug: &str) -> RepoResult<ContentItem> {
            let s = self.state.read().unwrap();
            s.content
                .values()
                .find(|c| c.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn list_content(&self, q: &ContentQuery) -> RepoResult<ContentPage> {
            let s = self.state.read().unwrap();
            let search = q.search.as_deref().map(str::to_lowercase);
            let mut items: Vec<ContentItem> = s
                .content
                .values()
                .filter(|c| match q.status {
                    StatusTab::All => !c.is_trashed,
                    StatusTab::Draft => !c.is_trashed && c.status == ContentStatus::Draft,
                    StatusTab::Published => !c.is_trashed && c.status == ContentStatus::Published,
                    StatusTab::Trash => c.is_trashed,
                })
                .filter(|c| q.kind.map(|k| c.kind == k).unwrap_or(true))
                .filter(|c| match q.category.as_deref().filter(|v| !v.is_empty()) {
                    Some(cat) => c.categories.iter().any(|x| x.eq_ignore_ascii_case(cat)),
                    None => true,
                })
                .filter(|c| match q.month.as_deref().filter(|v| !v.is_empty()) {
                    Some(month) => c.ordering_date().format("%Y-%m").to_string() == month,
                    None => true,
                })
                .filter(|c| match search.as_deref() {
                    Some(kw) => {
                        c.title.to_lowercase().contains(kw)
                            || c.body.to_lowercase().contains(kw)
                            || c.excerpt
                                .as_deref()
                                .map(|e| e.to_lowercase().contains(kw))
                                .unwrap_or(false)
                    }
                    None => true,
                })
                .cloned()
                .collect();
            items.sort_by(|a, b| b.ordering_date().cmp(&a.ordering_date()));

            let total = items.len() as u64;
            let per_page = q.per_page.clamp(1, 100);
            let total_pages = ((total + per_page as u64 - 1) / per_page as u64).max(1) as u32;
            let page = q.page.clamp(1, total_pages);
            let start = ((page - 1) * per_page) as usize;
            let items = items.into_iter().skip(start).take(per_page as usize).collect();
            Ok(ContentPage { items, total, page, total_pages })
        }

        async fn trash_content(&self, id: Id, actor: &str) -> RepoResult<ContentItem> {
            let mut s = self.state.write().unwrap();
            let item = s.content.get_mut(&id).ok_or(RepoError::NotFound)?;
            if item.is_trashed {
                return Err(RepoError::InvalidStateTransition("item is already trashed"));
            }
            let now = Utc::now();
            item.is_trashed = true;
            item.trashed_at = Some(now);
            item.trashed_by = Some(actor.to_string());
            item.updated_at = now;
            let updated = item.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn restore_content(&self, id: Id) -> RepoResult<ContentItem> {
            let mut s = self.state.write().unwrap();
            let item = s.content.get_mut(&id).ok_or(RepoError::NotFound)?;
            if !item.is_trashed {
                return Err(RepoError::InvalidStateTransition("item is not in the trash"));
            }
            item.is_trashed = false;
            item.trashed_at = None;
            item.trashed_by = None;
            // restored content always requires a fresh publish
            item.status = ContentStatus::Draft;
            item.updated_at = Utc::now();
            let updated = item.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_content(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let item = s.content.get(&id).ok_or(RepoError::NotFound)?;
            if !item.is_trashed {
                return Err(RepoError::InvalidStateTransition(
                    "permanent delete requires the item to be trashed",
                ));
            }
            s.remove_content(id);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn trash_content_many(&self, ids: &[Id], actor: &str) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let mut applied = 0;
            for id in ids {
                if let Some(item) = s.content.get_mut(id) {
                    if !item.is_trashed {
                        item.is_trashed = true;
                        item.trashed_at = Some(now);
                        item.trashed_by = Some(actor.to_string());
                        item.updated_at = now;
                        applied += 1;
                    }
                }
            }
            drop(s);
            self.persist();
            Ok(applied)
        }

        async fn restore_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let mut applied = 0;
            for id in ids {
                if let Some(item) = s.content.get_mut(id) {
                    if item.is_trashed {
                        item.is_trashed = false;
                        item.trashed_at = None;
                        item.trashed_by = None;
                        item.status = ContentStatus::Draft;
                        item.updated_at = now;
                        applied += 1;
                    }
                }
            }
            drop(s);
            self.persist();
            Ok(applied)
        }

        async fn delete_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            // hard delete only touches trashed items
            let doomed: Vec<Id> = ids
                .iter()
                .filter(|id| s.content.get(id).map(|c| c.is_trashed).unwrap_or(false))
                .copied()
                .collect();
            for id in &doomed {
                s.remove_content(*id);
            }
            drop(s);
            self.persist();
            Ok(doomed.len() as u64)
        }

        async fn publish_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let mut applied = 0;
            for id in ids {
                if let Some(item) = s.content.get_mut(id) {
                    if !item.is_trashed && item.status != ContentStatus::Published {
                        item.status = ContentStatus::Published;
                        if item.published_date.is_none() {
                            item.published_date = Some(now);
                        }
                        item.updated_at = now;
                        applied += 1;
                    }
                }
            }
            drop(s);
            self.persist();
            Ok(applied)
        }

        async fn draft_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let mut applied = 0;
            for id in ids {
                if let Some(item) = s.content.get_mut(id) {
                    if !item.is_trashed && item.status != ContentStatus::Draft {
                        item.status = ContentStatus::Draft;
                        item.updated_at = now;
                        applied += 1;
                    }
                }
            }
            drop(s);
            self.persist();
            Ok(applied)
        }

        async fn list_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<SweptItem>> {
            let s = self.state.read().unwrap();
            let now = Utc::now();
            let mut expired: Vec<SweptItem> = s
                .content
                .values()
                .filter(|c| c.is_trashed && c.trashed_at.map(|at| at < cutoff).unwrap_or(false))
                .map(|c| SweptItem {
                    id: c.id,
                    title: c.title.clone(),
                    days_in_trash: c.days_in_trash(now),
                })
                .collect();
            expired.sort_by_key(|e| e.id);
            Ok(expired)
        }

        async fn purge_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<SweptItem>> {
            // predicate and delete run under one write lock
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let mut expired: Vec<SweptItem> = s
                .content
                .values()
                .filter(|c| c.is_trashed && c.trashed_at.map(|at| at < cutoff).unwrap_or(false))
                .map(|c| SweptItem {
                    id: c.id,
                    title: c.title.clone(),
                    days_in_trash: c.days_in_trash(now),
                })
                .collect();
            expired.sort_by_key(|e| e.id);
            for item in &expired {
                s.remove_content(item.id);
            }
            drop(s);
            self.persist();
            Ok(expired)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn submit_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let post = s.content.get(&new.post_id).ok_or(RepoError::NotFound)?;
            if post.is_trashed {
                return Err(RepoError::NotFound);
            }
            if let Some(parent_id) = new.parent_id {
                let parent = s.comments.get(&parent_id).ok_or(RepoError::NotFound)?;
                if parent.post_id != new.post_id {
                    return Err(RepoError::InvalidParent);
                }
            }
            let id = s.next_id();
            let comment = Comment {
                id,
                post_id: new.post_id,
                parent_id: new.parent_id,
                author_name: new.author_name,
                author_email: new.author_email,
                website: new.website,
                body: new.body,
                created_on: Utc::now(),
                approved: false,
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let s = self.state.read().unwrap();
            s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn set_comment_approved(&self, id: Id, approved: bool) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            comment.approved = approved;
            let updated = comment.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn reply_comment(
            &self,
            parent_id: Id,
            author_name: &str,
            author_email: &str,
            body: &str,
        ) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let parent = s.comments.get(&parent_id).ok_or(RepoError::NotFound)?;
            let post_id = parent.post_id;
            let id = s.next_id();
            let comment = Comment {
                id,
                post_id,
                parent_id: Some(parent_id),
                author_name: author_name.to_string(),
                author_email: author_email.to_string(),
                website: None,
                body: body.to_string(),
                created_on: Utc::now(),
                // moderator-authored replies skip the moderation queue
                approved: true,
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if !s.comments.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            for victim in s.comment_subtree(&[id]) {
                s.comments.remove(&victim);
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn list_visible_comments(&self, post_id: Id, show_all: bool) -> RepoResult<CommentListing> {
            let s = self.state.read().unwrap();
            let mut top: Vec<&Comment> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id && c.approved && c.parent_id.is_none())
                .collect();
            top.sort_by(|a, b| b.created_on.cmp(&a.created_on));
            let total = top.len() as u64;
            if !show_all {
                top.truncate(TOP_LEVEL_DISPLAY_CAP);
            }
            let threads = top
                .into_iter()
                .map(|c| {
                    let mut replies: Vec<Comment> = s
                        .comments
                        .values()
                        .filter(|r| r.parent_id == Some(c.id) && r.approved)
                        .cloned()
                        .collect();
                    replies.sort_by(|a, b| a.created_on.cmp(&b.created_on));
                    CommentThread { comment: c.clone(), replies }
                })
                .collect();
            Ok(CommentListing { threads, total })
        }

        async fn list_comments(&self, filter: CommentFilter) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut comments: Vec<Comment> = s
                .comments
                .values()
                .filter(|c| match filter {
                    CommentFilter::All => true,
                    CommentFilter::Pending => !c.approved,
                    CommentFilter::Approved => c.approved,
                })
                .cloned()
                .collect();
            comments.sort_by(|a, b| b.created_on.cmp(&a.created_on));
            Ok(comments)
        }

        async fn set_comment_approved_many(&self, ids: &[Id], approved: bool) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            let mut applied = 0;
            for id in ids {
                if let Some(comment) = s.comments.get_mut(id) {
                    comment.approved = approved;
                    applied += 1;
                }
            }
            drop(s);
            self.persist();
            Ok(applied)
        }

        async fn delete_comment_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            let roots: Vec<Id> = ids
                .iter()
                .filter(|id| s.comments.contains_key(id))
                .copied()
                .collect();
            let applied = roots.len() as u64;
            for victim in s.comment_subtree(&roots) {
                s.comments.remove(&victim);
            }
            drop(s);
            self.persist();
            Ok(applied)
        }

        async fn comment_counts(&self) -> RepoResult<CommentCounts> {
            let s = self.state.read().unwrap();
            let pending = s.comments.values().filter(|c| !c.approved).count() as u64;
            let approved = s.comments.values().filter(|c| c.approved).count() as u64;
            Ok(CommentCounts { pending, approved })
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{Pool, Postgres, QueryBuilder, Row};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    fn parse_kind(raw: &str) -> RepoResult<ContentKind> {
        match raw {
            "post" => Ok(ContentKind::Post),
            "page" => Ok(ContentKind::Page),
            other => Err(RepoError::Internal(format!("unknown content kind '{other}'"))),
        }
    }

    fn parse_status(raw: &str) -> RepoResult<ContentStatus> {
        match raw {
            "draft" => Ok(ContentStatus::Draft),
            "published" => Ok(ContentStatus::Published),
            other => Err(RepoError::Internal(format!("unknown content status '{other}'"))),
        }
    }

    const CONTENT_COLS: &str = "id, kind, title, slug, body, excerpt, author_name, categories, \
         is_featured, status, published_date, is_trashed, trashed_at, trashed_by, created_at, updated_at";

    fn content_from_row(row: &PgRow) -> RepoResult<ContentItem> {
        Ok(ContentItem {
            id: row.try_get("id").map_err(internal)?,
            kind: parse_kind(&row.try_get::<String, _>("kind").map_err(internal)?)?,
            title: row.try_get("title").map_err(internal)?,
            slug: row.try_get("slug").map_err(internal)?,
            body: row.try_get("body").map_err(internal)?,
            excerpt: row.try_get("excerpt").map_err(internal)?,
            author_name: row.try_get("author_name").map_err(internal)?,
            categories: row.try_get("categories").map_err(internal)?,
            is_featured: row.try_get("is_featured").map_err(internal)?,
            status: parse_status(&row.try_get::<String, _>("status").map_err(internal)?)?,
            published_date: row.try_get("published_date").map_err(internal)?,
            is_trashed: row.try_get("is_trashed").map_err(internal)?,
            trashed_at: row.try_get("trashed_at").map_err(internal)?,
            trashed_by: row.try_get("trashed_by").map_err(internal)?,
            created_at: row.try_get("created_at").map_err(internal)?,
            updated_at: row.try_get("updated_at").map_err(internal)?,
        })
    }

    const COMMENT_COLS: &str =
        "id, post_id, parent_id, author_name, author_email, website, body, created_on, approved";

    fn comment_from_row(row: &PgRow) -> RepoResult<Comment> {
        Ok(Comment {
            id: row.try_get("id").map_err(internal)?,
            post_id: row.try_get("post_id").map_err(internal)?,
            parent_id: row.try_get("parent_id").map_err(internal)?,
            author_name: row.try_get("author_name").map_err(internal)?,
            author_email: row.try_get("author_email").map_err(internal)?,
            website: row.try_get("website").map_err(internal)?,
            body: row.try_get("body").map_err(internal)?,
            created_on: row.try_get("created_on").map_err(internal)?,
            approved: row.try_get("approved").map_err(internal)?,
        })
    }

    impl PgRepo {
        async fn slug_taken(&self, slug: &str, exclude: Option<Id>) -> RepoResult<bool> {
            let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM content WHERE slug = $1 AND id IS DISTINCT FROM $2) AS taken")
                .bind(slug)
                .bind(exclude)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;
            row.try_get("taken").map_err(internal)
        }

        async fn unique_slug(&self, base: &str) -> RepoResult<String> {
            let base = if base.is_empty() { "untitled".to_string() } else { base.to_string() };
            if !self.slug_taken(&base, None).await? {
                return Ok(base);
            }
            let mut n = 2;
            loop {
                let candidate = format!("{base}-{n}");
                if !self.slug_taken(&candidate, None).await? {
                    return Ok(candidate);
                }
                n += 1;
            }
        }
    }

    #[async_trait]
    impl ContentRepo for PgRepo {
        async fn create_content(&self, new: NewContent) -> RepoResult<ContentItem> {
            let slug = match new.slug.as_deref().filter(|v| !v.is_empty()) {
                Some(explicit) => {
                    if self.slug_taken(explicit, None).await? {
                        return Err(RepoError::Conflict);
                    }
                    explicit.to_string()
                }
                None => self.unique_slug(&slugify(&new.title)).await?,
            };
            let status = if new.publish { ContentStatus::Published } else { ContentStatus::Draft };
            let published_date = new.publish.then(Utc::now);
            let row = sqlx::query(&format!(
                "INSERT INTO content (kind, title, slug, body, excerpt, author_name, categories, is_featured, status, published_date) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) RETURNING {CONTENT_COLS}"
            ))
            .bind(new.kind.to_string())
            .bind(&new.title)
            .bind(&slug)
            .bind(&new.body)
            .bind(&new.excerpt)
            .bind(&new.author_name)
            .bind(&new.categories)
            .bind(new.is_featured)
            .bind(status.to_string())
            .bind(published_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                // slug uniqueness can still race past the pre-check
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    RepoError::Conflict
                }
                _ => internal(e),
            })?;
            content_from_row(&row)
        }

        async fn update_content(&self, id: Id, upd: UpdateContent) -> RepoResult<ContentItem> {
            if let Some(ref slug) = upd.slug {
                if self.slug_taken(slug, Some(id)).await? {
                    return Err(RepoError::Conflict);
                }
            }
            let status = upd.status.map(|s| s.to_string());
            let row = sqlx::query(&format!(
                "UPDATE content SET \
                   title = COALESCE($2, title), \
                   slug = COALESCE($3, slug), \
                   body = COALESCE($4, body), \
                   excerpt = COALESCE($5, excerpt), \
                   categories = COALESCE($6, categories), \
                   is_featured = COALESCE($7, is_featured), \
                   status = COALESCE($8, status), \
                   published_date = CASE WHEN $8 = 'published' AND published_date IS NULL THEN now() ELSE published_date END, \
                   updated_at = now() \
                 WHERE id = $1 RETURNING {CONTENT_COLS}"
            ))
            .bind(id)
            .bind(upd.title)
            .bind(upd.slug)
            .bind(upd.body)
            .bind(upd.excerpt)
            .bind(upd.categories)
            .bind(upd.is_featured)
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            content_from_row(&row)
        }

        async fn get_content(&self, id: Id) -> RepoResult<ContentItem> {
            let row = sqlx::query(&format!("SELECT {CONTENT_COLS} FROM content WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;
            content_from_row(&row)
        }

        async fn get_content_by_slug(&self, slug: &str) -> RepoResult<ContentItem> {
            let row = sqlx::query(&format!("SELECT {CONTENT_COLS} FROM content WHERE slug = $1"))
                .bind(slug)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;
            content_from_row(&row)
        }

        async fn list_content(&self, q: &ContentQuery) -> RepoResult<ContentPage> {
            fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, q: &'a ContentQuery) {
                match q.status {
                    StatusTab::All => {
                        qb.push(" WHERE NOT is_trashed");
                    }
                    StatusTab::Draft | StatusTab::Published => {
                        qb.push(" WHERE NOT is_trashed AND status = ");
                        qb.push_bind(q.status.to_string());
                    }
                    StatusTab::Trash => {
                        qb.push(" WHERE is_trashed");
                    }
                }
                if let Some(kind) = q.kind {
                    qb.push(" AND kind = ");
                    qb.push_bind(kind.to_string());
                }
                if let Some(category) = q.category.as_deref().filter(|v| !v.is_empty()) {
                    qb.push(" AND EXISTS (SELECT 1 FROM unnest(categories) c WHERE lower(c) = lower(");
                    qb.push_bind(category);
                    qb.push("))");
                }
                if let Some(month) = q.month.as_deref().filter(|v| !v.is_empty()) {
                    qb.push(" AND to_char(COALESCE(published_date, created_at), 'YYYY-MM') = ");
                    qb.push_bind(month);
                }
                if let Some(search) = q.search.as_deref().filter(|v| !v.is_empty()) {
                    let pattern = format!("%{search}%");
                    qb.push(" AND (title ILIKE ");
                    qb.push_bind(pattern.clone());
                    qb.push(" OR body ILIKE ");
                    qb.push_bind(pattern.clone());
                    qb.push(" OR excerpt ILIKE ");
                    qb.push_bind(pattern);
                    qb.push(")");
                }
            }

            let mut count_qb = QueryBuilder::new("SELECT COUNT(*) AS total FROM content");
            push_filters(&mut count_qb, q);
            let total: i64 = count_qb
                .build()
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?
                .try_get("total")
                .map_err(internal)?;

            let total = total as u64;
            let per_page = q.per_page.clamp(1, 100);
            let total_pages = ((total + per_page as u64 - 1) / per_page as u64).max(1) as u32;
            let page = q.page.clamp(1, total_pages);

            let mut qb = QueryBuilder::new(format!("SELECT {CONTENT_COLS} FROM content"));
            push_filters(&mut qb, q);
            qb.push(" ORDER BY COALESCE(published_date, created_at) DESC LIMIT ");
            qb.push_bind(per_page as i64);
            qb.push(" OFFSET ");
            qb.push_bind(((page - 1) * per_page) as i64);
            let rows = qb.build().fetch_all(&self.pool).await.map_err(internal)?;
            let items = rows
                .iter()
                .map(content_from_row)
                .collect::<RepoResult<Vec<_>>>()?;
            Ok(ContentPage { items, total, page, total_pages })
        }

        async fn trash_content(&self, id: Id, actor: &str) -> RepoResult<ContentItem> {
            let row = sqlx::query(&format!(
                "UPDATE content SET is_trashed = TRUE, trashed_at = now(), trashed_by = $2, updated_at = now() \
                 WHERE id = $1 AND NOT is_trashed RETURNING {CONTENT_COLS}"
            ))
            .bind(id)
            .bind(actor)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            match row {
                Some(row) => content_from_row(&row),
                None => {
                    self.get_content(id).await?;
                    Err(RepoError::InvalidStateTransition("item is already trashed"))
                }
            }
        }

        async fn restore_content(&self, id: Id) -> RepoResult<ContentItem> {
            let row = sqlx::query(&format!(
                "UPDATE content SET is_trashed = FALSE, trashed_at = NULL, trashed_by = NULL, \
                 status = 'draft', updated_at = now() \
                 WHERE id = $1 AND is_trashed RETURNING {CONTENT_COLS}"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            match row {
                Some(row) => content_from_row(&row),
                None => {
                    self.get_content(id).await?;
                    Err(RepoError::InvalidStateTransition("item is not in the trash"))
                }
            }
        }

        async fn delete_content(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM content WHERE id = $1 AND is_trashed")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if res.rows_affected() == 0 {
                self.get_content(id).await?;
                return Err(RepoError::InvalidStateTransition(
                    "permanent delete requires the item to be trashed",
                ));
            }
            Ok(())
        }

        async fn trash_content_many(&self, ids: &[Id], actor: &str) -> RepoResult<u64> {
            let res = sqlx::query(
                "UPDATE content SET is_trashed = TRUE, trashed_at = now(), trashed_by = $2, updated_at = now() \
                 WHERE id = ANY($1) AND NOT is_trashed",
            )
            .bind(ids)
            .bind(actor)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn restore_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let res = sqlx::query(
                "UPDATE content SET is_trashed = FALSE, trashed_at = NULL, trashed_by = NULL, \
                 status = 'draft', updated_at = now() WHERE id = ANY($1) AND is_trashed",
            )
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn delete_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let res = sqlx::query("DELETE FROM content WHERE id = ANY($1) AND is_trashed")
                .bind(ids)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn publish_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let res = sqlx::query(
                "UPDATE content SET status = 'published', \
                 published_date = COALESCE(published_date, now()), updated_at = now() \
                 WHERE id = ANY($1) AND NOT is_trashed AND status <> 'published'",
            )
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn draft_content_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let res = sqlx::query(
                "UPDATE content SET status = 'draft', updated_at = now() \
                 WHERE id = ANY($1) AND NOT is_trashed AND status <> 'draft'",
            )
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn list_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<SweptItem>> {
            let rows = sqlx::query(
                "SELECT id, title, trashed_at FROM content \
                 WHERE is_trashed AND trashed_at < $1 ORDER BY id",
            )
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            let now = Utc::now();
            rows.iter()
                .map(|row| {
                    let trashed_at: DateTime<Utc> = row.try_get("trashed_at").map_err(internal)?;
                    Ok(SweptItem {
                        id: row.try_get("id").map_err(internal)?,
                        title: row.try_get("title").map_err(internal)?,
                        days_in_trash: (now - trashed_at).num_days(),
                    })
                })
                .collect()
        }

        async fn purge_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<SweptItem>> {
            // single conditional delete: an item restored after selection
            // cannot be deleted by a stale predicate
            let rows = sqlx::query(
                "DELETE FROM content WHERE is_trashed AND trashed_at < $1 \
                 RETURNING id, title, trashed_at",
            )
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            let now = Utc::now();
            let mut swept = rows
                .iter()
                .map(|row| {
                    let trashed_at: DateTime<Utc> = row.try_get("trashed_at").map_err(internal)?;
                    Ok(SweptItem {
                        id: row.try_get("id").map_err(internal)?,
                        title: row.try_get("title").map_err(internal)?,
                        days_in_trash: (now - trashed_at).num_days(),
                    })
                })
                .collect::<RepoResult<Vec<_>>>()?;
            swept.sort_by_key(|e| e.id);
            Ok(swept)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn submit_comment(&self, new: NewComment) -> RepoResult<Comment> {
            let post = self.get_content(new.post_id).await?;
            if post.is_trashed {
                return Err(RepoError::NotFound);
            }
            if let Some(parent_id) = new.parent_id {
                let parent = self.get_comment(parent_id).await?;
                if parent.post_id != new.post_id {
                    return Err(RepoError::InvalidParent);
                }
            }
            let row = sqlx::query(&format!(
                "INSERT INTO comments (post_id, parent_id, author_name, author_email, website, body, approved) \
                 VALUES ($1,$2,$3,$4,$5,$6,FALSE) RETURNING {COMMENT_COLS}"
            ))
            .bind(new.post_id)
            .bind(new.parent_id)
            .bind(&new.author_name)
            .bind(&new.author_email)
            .bind(&new.website)
            .bind(&new.body)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            comment_from_row(&row)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let row = sqlx::query(&format!("SELECT {COMMENT_COLS} FROM comments WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;
            comment_from_row(&row)
        }

        async fn set_comment_approved(&self, id: Id, approved: bool) -> RepoResult<Comment> {
            let row = sqlx::query(&format!(
                "UPDATE comments SET approved = $2 WHERE id = $1 RETURNING {COMMENT_COLS}"
            ))
            .bind(id)
            .bind(approved)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            comment_from_row(&row)
        }

        async fn reply_comment(
            &self,
            parent_id: Id,
            author_name: &str,
            author_email: &str,
            body: &str,
        ) -> RepoResult<Comment> {
            let parent = self.get_comment(parent_id).await?;
            let row = sqlx::query(&format!(
                "INSERT INTO comments (post_id, parent_id, author_name, author_email, body, approved) \
                 VALUES ($1,$2,$3,$4,$5,TRUE) RETURNING {COMMENT_COLS}"
            ))
            .bind(parent.post_id)
            .bind(parent_id)
            .bind(author_name)
            .bind(author_email)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            comment_from_row(&row)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            // replies cascade via the parent_id foreign key
            let res = sqlx::query("DELETE FROM comments WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn list_visible_comments(&self, post_id: Id, show_all: bool) -> RepoResult<CommentListing> {
            let total: i64 = sqlx::query(
                "SELECT COUNT(*) AS total FROM comments \
                 WHERE post_id = $1 AND approved AND parent_id IS NULL",
            )
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?
            .try_get("total")
            .map_err(internal)?;

            let cap = if show_all { i64::MAX } else { TOP_LEVEL_DISPLAY_CAP as i64 };
            let top_rows = sqlx::query(&format!(
                "SELECT {COMMENT_COLS} FROM comments \
                 WHERE post_id = $1 AND approved AND parent_id IS NULL \
                 ORDER BY created_on DESC LIMIT $2"
            ))
            .bind(post_id)
            .bind(cap)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

            let mut threads = Vec::with_capacity(top_rows.len());
            for row in &top_rows {
                let comment = comment_from_row(row)?;
                let reply_rows = sqlx::query(&format!(
                    "SELECT {COMMENT_COLS} FROM comments \
                     WHERE parent_id = $1 AND approved ORDER BY created_on ASC"
                ))
                .bind(comment.id)
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?;
                let replies = reply_rows
                    .iter()
                    .map(comment_from_row)
                    .collect::<RepoResult<Vec<_>>>()?;
                threads.push(CommentThread { comment, replies });
            }
            Ok(CommentListing { threads, total: total as u64 })
        }

        async fn list_comments(&self, filter: CommentFilter) -> RepoResult<Vec<Comment>> {
            let clause = match filter {
                CommentFilter::All => "",
                CommentFilter::Pending => " WHERE NOT approved",
                CommentFilter::Approved => " WHERE approved",
            };
            let rows = sqlx::query(&format!(
                "SELECT {COMMENT_COLS} FROM comments{clause} ORDER BY created_on DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
            rows.iter().map(comment_from_row).collect()
        }

        async fn set_comment_approved_many(&self, ids: &[Id], approved: bool) -> RepoResult<u64> {
            let res = sqlx::query("UPDATE comments SET approved = $2 WHERE id = ANY($1)")
                .bind(ids)
                .bind(approved)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn delete_comment_many(&self, ids: &[Id]) -> RepoResult<u64> {
            let res = sqlx::query("DELETE FROM comments WHERE id = ANY($1)")
                .bind(ids)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn comment_counts(&self) -> RepoResult<CommentCounts> {
            let row = sqlx::query(
                "SELECT COUNT(*) FILTER (WHERE NOT approved) AS pending, \
                        COUNT(*) FILTER (WHERE approved) AS approved FROM comments",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            let pending: i64 = row.try_get("pending").map_err(internal)?;
            let approved: i64 = row.try_get("approved").map_err(internal)?;
            Ok(CommentCounts { pending: pending as u64, approved: approved as u64 })
        }
    }
}
