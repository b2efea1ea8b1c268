//! Builders that turn plain wiki records into Event Records.
//!
//! These are field mappings only. Each builder returns a complete record
//! whose `meta.stream` is the stream name handed in by the caller.

pub mod job;
pub mod page;
pub mod purge;
pub mod revision;
pub mod user;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::event::format_dt;
use crate::sanitize::binary_safe_string;

/// Where the wiki lives; used to build `meta.uri` and page URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// e.g. `https://en.wikipedia.org`
    pub server: String,
    /// Path prefix for articles, e.g. `/wiki/`
    #[serde(default = "default_article_path")]
    pub article_path: String,
    /// Database name, e.g. `enwiki`
    pub database: String,
}

impl Site {
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            article_path: default_article_path(),
            database: database.into(),
        }
    }

    /// Canonical URL of a page title.
    pub fn page_url(&self, title: &str) -> String {
        let db_key = title.trim().replace(' ', "_");
        let path = format!("{}{}", self.article_path, db_key);
        match Url::parse(&self.server) {
            Ok(mut url) => {
                url.set_path(&path);
                url.to_string()
            }
            Err(_) => format!("{}{}", self.server.trim_end_matches('/'), path),
        }
    }
}

fn default_article_path() -> String {
    "/wiki/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// `None` for anonymous (IP) editors.
    pub user_id: Option<u64>,
    pub user_text: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub is_bot: bool,
    pub edit_count: Option<u64>,
    pub registration_dt: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn named(user_id: u64, user_text: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            user_text: user_text.into(),
            groups: Vec::new(),
            is_bot: false,
            edit_count: None,
            registration_dt: None,
        }
    }

    pub fn anonymous(ip: impl Into<String>) -> Self {
        Self {
            user_id: None,
            user_text: ip.into(),
            groups: Vec::new(),
            is_bot: false,
            edit_count: None,
            registration_dt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_id: u64,
    pub namespace: i32,
    /// Prefixed title, spaces or underscores.
    pub title: String,
    #[serde(default)]
    pub is_redirect: bool,
}

impl PageRecord {
    pub fn new(page_id: u64, namespace: i32, title: impl Into<String>) -> Self {
        Self {
            page_id,
            namespace,
            title: title.into(),
            is_redirect: false,
        }
    }

    /// Title in database-key form.
    pub fn db_key(&self) -> String {
        self.title.trim().replace(' ', "_")
    }
}

/// Which parts of a revision are suppressed from public view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility {
    pub text: bool,
    pub user: bool,
    pub comment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub rev_id: u64,
    pub parent_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub page: PageRecord,
    pub performer: Option<UserRecord>,
    /// Raw edit summary bytes; not guaranteed to be UTF-8.
    #[serde(default)]
    pub comment: Vec<u8>,
    pub sha1: Option<String>,
    pub len: Option<u64>,
    #[serde(default)]
    pub is_minor: bool,
    pub content_model: Option<String>,
    pub content_format: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

/// The `performer` object shared by most schemas.
pub(crate) fn user_entity(user: &UserRecord) -> Value {
    let mut entity = Map::new();
    entity.insert("user_text".into(), json!(user.user_text));
    entity.insert("user_groups".into(), json!(user.groups));
    entity.insert("user_is_bot".into(), json!(user.is_bot));
    if let Some(id) = user.user_id {
        entity.insert("user_id".into(), json!(id));
    }
    if let Some(count) = user.edit_count {
        entity.insert("user_edit_count".into(), json!(count));
    }
    if let Some(dt) = &user.registration_dt {
        entity.insert("user_registration_dt".into(), json!(format_dt(dt)));
    }
    Value::Object(entity)
}

/// Page identity fields shared by page and revision schemas.
pub(crate) fn page_fields(site: &Site, page: &PageRecord) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("database".into(), json!(site.database));
    fields.insert("page_id".into(), json!(page.page_id));
    fields.insert("page_title".into(), json!(page.db_key()));
    fields.insert("page_namespace".into(), json!(page.namespace));
    fields.insert("page_is_redirect".into(), json!(page.is_redirect));
    fields
}

/// Revision fields, honouring suppression and the binary-safe comment rule.
pub(crate) fn revision_fields(site: &Site, rev: &RevisionRecord) -> Map<String, Value> {
    let mut fields = page_fields(site, &rev.page);
    fields.insert("rev_id".into(), json!(rev.rev_id));
    fields.insert("rev_timestamp".into(), json!(format_dt(&rev.timestamp)));
    fields.insert("rev_minor_edit".into(), json!(rev.is_minor));
    if let Some(parent) = rev.parent_id {
        fields.insert("rev_parent_id".into(), json!(parent));
    }
    if let Some(sha1) = &rev.sha1 {
        fields.insert("rev_sha1".into(), json!(sha1));
    }
    if let Some(len) = rev.len {
        fields.insert("rev_len".into(), json!(len));
    }
    if let Some(model) = &rev.content_model {
        fields.insert("rev_content_model".into(), json!(model));
    }
    if let Some(format) = &rev.content_format {
        fields.insert("rev_content_format".into(), json!(format));
    }
    if !rev.visibility.comment && !rev.comment.is_empty() {
        fields.insert("comment".into(), json!(binary_safe_string(&rev.comment)));
    }
    if !rev.visibility.user {
        if let Some(performer) = &rev.performer {
            fields.insert("performer".into(), user_entity(performer));
        }
    }
    fields
}
