use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::{user_entity, Site, UserRecord};
use crate::event::{format_dt, EventBuilder, EventRecord, RequestContext};
use crate::sanitize::binary_safe_string;

pub const USER_BLOCKS_CHANGE_SCHEMA: &str = "/mediawiki/user/blocks-change/1.1.0";

/// Restrictions of one block. `expiry = None` means infinite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockParams {
    pub expiry: Option<DateTime<Utc>>,
    pub email: bool,
    pub user_talk: bool,
    pub account_create: bool,
    pub sitewide: bool,
}

pub struct BlockChange<'a> {
    pub target: &'a UserRecord,
    pub performer: Option<&'a UserRecord>,
    pub reason: &'a [u8],
    pub blocks: &'a BlockParams,
    /// The block this one replaces, if any.
    pub prior: Option<&'a BlockParams>,
}

pub fn user_blocks_change_event(site: &Site, ctx: &RequestContext, stream: &str, change: &BlockChange<'_>) -> EventRecord {
    let mut fields = Map::new();
    fields.insert("database".into(), json!(site.database));
    fields.insert("user_text".into(), json!(change.target.user_text));
    fields.insert("user_groups".into(), json!(change.target.groups));
    fields.insert("blocks".into(), block_entity(change.blocks));
    if let Some(id) = change.target.user_id {
        fields.insert("user_id".into(), json!(id));
    }
    if let Some(performer) = change.performer {
        fields.insert("performer".into(), user_entity(performer));
    }
    if !change.reason.is_empty() {
        fields.insert("comment".into(), json!(binary_safe_string(change.reason)));
    }
    if let Some(prior) = change.prior {
        fields.insert("prior_state".into(), json!({ "blocks": block_entity(prior) }));
    }

    let uri = site.page_url(&format!("User:{}", change.target.user_text));
    EventBuilder::new(USER_BLOCKS_CHANGE_SCHEMA, stream, uri)
        .dt(ctx.timestamp)
        .fields(Value::Object(fields))
        .build(ctx)
}

fn block_entity(block: &BlockParams) -> Value {
    let expiry = block
        .expiry
        .as_ref()
        .map(format_dt)
        .unwrap_or_else(|| "infinite".to_string());
    json!({
        "email": block.email,
        "user_talk": block.user_talk,
        "account_create": block.account_create,
        "sitewide": block.sitewide,
        "expiry_dt": expiry,
    })
}
