use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Days a trashed item survives before the sweep may permanently delete it.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Display cap for top-level comment threads on a post page.
pub const TOP_LEVEL_DISPLAY_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Page,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Post => f.write_str("post"),
            ContentKind::Page => f.write_str("page"),
        }
    }
}

/// Workflow state. The trash marker is `is_trashed`, never a status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Published,
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentStatus::Draft => f.write_str("draft"),
            ContentStatus::Published => f.write_str("published"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentItem {
    pub id: Id,
    pub kind: ContentKind,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub author_name: String,
    pub categories: Vec<String>,
    pub is_featured: bool,
    pub status: ContentStatus,
    pub published_date: Option<DateTime<Utc>>,
    pub is_trashed: bool,
    pub trashed_at: Option<DateTime<Utc>>,
    pub trashed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Whole days spent in the trash; zero for items that are not trashed.
    pub fn days_in_trash(&self, now: DateTime<Utc>) -> i64 {
        match (self.is_trashed, self.trashed_at) {
            (true, Some(at)) => (now - at).num_days(),
            _ => 0,
        }
    }

    /// Retention expiry check used by the sweep.
    pub fn can_auto_delete(&self, now: DateTime<Utc>, retention_days: i64) -> bool {
        self.is_trashed && self.days_in_trash(now) >= retention_days
    }

    /// Date used for ordering and month filtering; drafts fall back to
    /// their creation time.
    pub fn ordering_date(&self) -> DateTime<Utc> {
        self.published_date.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewContent {
    pub kind: ContentKind,
    pub title: String,
    /// Explicit slug; generated from the title when absent.
    #[serde(default)]
    pub slug: Option<String>,
    pub body: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    /// Create directly in the published state.
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateContent {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub body: Option<String>,
    pub excerpt: Option<String>,
    pub categories: Option<Vec<String>>,
    pub is_featured: Option<bool>,
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub parent_id: Option<Id>,
    pub author_name: String,
    pub author_email: String,
    pub website: Option<String>,
    pub body: String,
    pub created_on: DateTime<Utc>,
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub post_id: Id,
    #[serde(default)]
    pub parent_id: Option<Id>,
    pub author_name: String,
    pub author_email: String,
    #[serde(default)]
    pub website: Option<String>,
    pub body: String,
}

/// One top-level comment with its approved replies.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentThread {
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentListing {
    pub threads: Vec<CommentThread>,
    /// Count of all top-level approved comments, independent of the
    /// display cap. Replies are never counted here.
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct CommentCounts {
    pub pending: u64,
    pub approved: u64,
}

/// Moderation queue filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommentFilter {
    #[default]
    All,
    Pending,
    Approved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusTab {
    #[default]
    All,
    Draft,
    Published,
    Trash,
}

impl std::fmt::Display for StatusTab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusTab::All => f.write_str("all"),
            StatusTab::Draft => f.write_str("draft"),
            StatusTab::Published => f.write_str("published"),
            StatusTab::Trash => f.write_str("trash"),
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

/// Explicit listing filter passed into the repository. Carried through
/// bulk actions so the caller lands back on the same filtered view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentQuery {
    #[serde(default)]
    pub kind: Option<ContentKind>,
    #[serde(default)]
    pub status: StatusTab,
    #[serde(default)]
    pub category: Option<String>,
    /// `YYYY-MM` filter on the publication month.
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for ContentQuery {
    fn default() -> Self {
        Self {
            kind: None,
            status: StatusTab::All,
            category: None,
            month: None,
            search: None,
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl ContentQuery {
    /// Render the filter context as a query string for post-action redirects.
    pub fn to_query_string(&self) -> String {
        let mut parts = vec![format!("status={}", self.status)];
        if let Some(kind) = self.kind {
            parts.push(format!("kind={kind}"));
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            parts.push(format!("category={}", urlencoding::encode(category)));
        }
        if let Some(month) = self.month.as_deref().filter(|m| !m.is_empty()) {
            parts.push(format!("month={}", urlencoding::encode(month)));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("search={}", urlencoding::encode(search)));
        }
        parts.push(format!("page={}", self.page));
        parts.join("&")
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
}

/// Summary line for an item affected (or about to be affected) by the sweep.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SweptItem {
    pub id: Id,
    pub title: String,
    pub days_in_trash: i64,
}

/// Lowercase ASCII slug from a title; runs of non-alphanumerics collapse
/// to a single dash.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(now: DateTime<Utc>, trashed_days_ago: Option<i64>) -> ContentItem {
        ContentItem {
            id: 1,
            kind: ContentKind::Post,
            title: "T".into(),
            slug: "t".into(),
            body: String::new(),
            excerpt: None,
            author_name: "a".into(),
            categories: vec![],
            is_featured: false,
            status: ContentStatus::Draft,
            published_date: None,
            is_trashed: trashed_days_ago.is_some(),
            trashed_at: trashed_days_ago.map(|d| now - Duration::days(d)),
            trashed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn days_in_trash_is_zero_when_active() {
        let now = Utc::now();
        assert_eq!(item(now, None).days_in_trash(now), 0);
    }

    #[test]
    fn auto_delete_threshold_boundaries() {
        let now = Utc::now();
        assert!(!item(now, Some(0)).can_auto_delete(now, DEFAULT_RETENTION_DAYS));
        assert!(!item(now, Some(29)).can_auto_delete(now, DEFAULT_RETENTION_DAYS));
        assert!(item(now, Some(30)).can_auto_delete(now, DEFAULT_RETENTION_DAYS));
        assert!(item(now, Some(31)).can_auto_delete(now, DEFAULT_RETENTION_DAYS));
    }

    #[test]
    fn auto_delete_respects_caller_threshold() {
        let now = Utc::now();
        assert!(item(now, Some(7)).can_auto_delete(now, 7));
        assert!(!item(now, Some(6)).can_auto_delete(now, 7));
    }

    #[test]
    fn slugify_basics() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Leading & trailing  "), "leading-trailing");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn query_string_preserves_filters() {
        let q = ContentQuery {
            kind: Some(ContentKind::Post),
            status: StatusTab::Trash,
            category: Some("house jobs".into()),
            month: None,
            search: Some("exam".into()),
            page: 3,
            per_page: 20,
        };
        assert_eq!(
            q.to_query_string(),
            "status=trash&kind=post&category=house%20jobs&search=exam&page=3"
        );
    }
}
