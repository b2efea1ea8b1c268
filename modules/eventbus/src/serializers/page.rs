use serde_json::{json, Map, Value};

use super::{page_fields, user_entity, PageRecord, Site, UserRecord};
use crate::event::{EventBuilder, EventRecord, RequestContext};
use crate::sanitize::binary_safe_string;

pub const PAGE_DELETE_SCHEMA: &str = "/mediawiki/page/delete/1.0.0";
pub const PAGE_UNDELETE_SCHEMA: &str = "/mediawiki/page/undelete/1.0.0";
pub const PAGE_MOVE_SCHEMA: &str = "/mediawiki/page/move/1.0.0";
pub const PAGE_PROPERTIES_CHANGE_SCHEMA: &str = "/mediawiki/page/properties-change/1.0.0";

pub struct PageDeletion<'a> {
    pub page: &'a PageRecord,
    pub performer: Option<&'a UserRecord>,
    pub reason: &'a [u8],
    pub latest_rev_id: Option<u64>,
    pub rev_count: Option<u64>,
    /// Set when the deletion also suppressed the page.
    pub suppressed: bool,
}

pub fn page_delete_event(site: &Site, ctx: &RequestContext, stream: &str, deletion: &PageDeletion<'_>) -> EventRecord {
    let mut fields = page_fields(site, deletion.page);
    if let Some(performer) = deletion.performer {
        fields.insert("performer".into(), user_entity(performer));
    }
    if !deletion.reason.is_empty() {
        fields.insert("comment".into(), json!(binary_safe_string(deletion.reason)));
    }
    if let Some(rev_id) = deletion.latest_rev_id {
        fields.insert("rev_id".into(), json!(rev_id));
    }
    if let Some(count) = deletion.rev_count {
        fields.insert("rev_count".into(), json!(count));
    }
    if deletion.suppressed {
        fields.insert("page_suppressed".into(), json!(true));
    }

    EventBuilder::new(PAGE_DELETE_SCHEMA, stream, site.page_url(&deletion.page.title))
        .dt(ctx.timestamp)
        .fields(Value::Object(fields))
        .build(ctx)
}

pub fn page_undelete_event(
    site: &Site,
    ctx: &RequestContext,
    stream: &str,
    page: &PageRecord,
    performer: Option<&UserRecord>,
    reason: &[u8],
    prior_page_id: Option<u64>,
) -> EventRecord {
    let mut fields = page_fields(site, page);
    if let Some(performer) = performer {
        fields.insert("performer".into(), user_entity(performer));
    }
    if !reason.is_empty() {
        fields.insert("comment".into(), json!(binary_safe_string(reason)));
    }
    if let Some(prior) = prior_page_id {
        fields.insert("prior_state".into(), json!({ "page_id": prior }));
    }

    EventBuilder::new(PAGE_UNDELETE_SCHEMA, stream, site.page_url(&page.title))
        .dt(ctx.timestamp)
        .fields(Value::Object(fields))
        .build(ctx)
}

pub struct PageMove<'a> {
    pub old_title: &'a str,
    pub old_namespace: i32,
    /// The page after the move (new title, same page id).
    pub page: &'a PageRecord,
    pub performer: Option<&'a UserRecord>,
    pub reason: &'a [u8],
    pub rev_id: u64,
    /// Page left behind as a redirect, if one was created.
    pub redirect_page_id: Option<u64>,
}

pub fn page_move_event(site: &Site, ctx: &RequestContext, stream: &str, mv: &PageMove<'_>) -> EventRecord {
    let mut fields = page_fields(site, mv.page);
    fields.insert("rev_id".into(), json!(mv.rev_id));
    if let Some(performer) = mv.performer {
        fields.insert("performer".into(), user_entity(performer));
    }
    if !mv.reason.is_empty() {
        fields.insert("comment".into(), json!(binary_safe_string(mv.reason)));
    }
    fields.insert(
        "prior_state".into(),
        json!({
            "page_title": mv.old_title.trim().replace(' ', "_"),
            "page_namespace": mv.old_namespace,
        }),
    );
    if let Some(redirect_id) = mv.redirect_page_id {
        fields.insert(
            "new_redirect_page".into(),
            json!({
                "page_id": redirect_id,
                "page_title": mv.old_title.trim().replace(' ', "_"),
                "page_namespace": mv.old_namespace,
            }),
        );
    }

    EventBuilder::new(PAGE_MOVE_SCHEMA, stream, site.page_url(&mv.page.title))
        .dt(ctx.timestamp)
        .fields(Value::Object(fields))
        .build(ctx)
}

/// Page properties that were added or changed, and those that were removed.
pub fn page_properties_change_event(
    site: &Site,
    ctx: &RequestContext,
    stream: &str,
    page: &PageRecord,
    performer: Option<&UserRecord>,
    added: Map<String, Value>,
    removed: Map<String, Value>,
) -> EventRecord {
    let mut fields = page_fields(site, page);
    if let Some(performer) = performer {
        fields.insert("performer".into(), user_entity(performer));
    }
    if !added.is_empty() {
        fields.insert("added_properties".into(), Value::Object(added));
    }
    if !removed.is_empty() {
        fields.insert("removed_properties".into(), Value::Object(removed));
    }

    EventBuilder::new(PAGE_PROPERTIES_CHANGE_SCHEMA, stream, site.page_url(&page.title))
        .dt(ctx.timestamp)
        .fields(Value::Object(fields))
        .build(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializers::tests::site;

    fn ctx() -> RequestContext {
        RequestContext::new("en.wikipedia.org").with_request_id("req-9")
    }

    #[test]
    fn delete_event_shape() {
        let page = PageRecord::new(42, 0, "Old Article");
        let alice = UserRecord::named(7, "Alice");
        let event = page_delete_event(
            &site(),
            &ctx(),
            "mediawiki.page-delete",
            &PageDeletion {
                page: &page,
                performer: Some(&alice),
                reason: b"spam",
                latest_rev_id: Some(99),
                rev_count: Some(3),
                suppressed: false,
            },
        );

        assert_eq!(event["$schema"], PAGE_DELETE_SCHEMA);
        assert_eq!(event["meta"]["stream"], "mediawiki.page-delete");
        assert_eq!(event["meta"]["uri"], "https://en.wikipedia.org/wiki/Old_Article");
        assert_eq!(event["database"], "enwiki");
        assert_eq!(event["page_title"], "Old_Article");
        assert_eq!(event["performer"]["user_text"], "Alice");
        assert_eq!(event["comment"], "spam");
        assert_eq!(event["rev_count"], 3);
        assert!(event.get("page_suppressed").is_none());
    }

    #[test]
    fn move_event_records_prior_title() {
        let page = PageRecord::new(42, 0, "New Name");
        let event = page_move_event(
            &site(),
            &ctx(),
            "mediawiki.page-move",
            &PageMove {
                old_title: "Old Name",
                old_namespace: 0,
                page: &page,
                performer: None,
                reason: b"",
                rev_id: 12,
                redirect_page_id: Some(43),
            },
        );

        assert_eq!(event["prior_state"]["page_title"], "Old_Name");
        assert_eq!(event["new_redirect_page"]["page_id"], 43);
        assert_eq!(event["page_title"], "New_Name");
        assert!(event.get("comment").is_none());
    }

    #[test]
    fn undelete_event_carries_prior_page_id() {
        let page = PageRecord::new(50, 0, "Restored");
        let event = page_undelete_event(&site(), &ctx(), "mediawiki.page-undelete", &page, None, b"oops", Some(42));
        assert_eq!(event["$schema"], PAGE_UNDELETE_SCHEMA);
        assert_eq!(event["prior_state"]["page_id"], 42);
    }

    #[test]
    fn properties_change_omits_empty_maps() {
        let page = PageRecord::new(1, 0, "P");
        let mut added = Map::new();
        added.insert("displaytitle".into(), json!("Fancy"));
        let event = page_properties_change_event(
            &site(),
            &ctx(),
            "mediawiki.page-properties-change",
            &page,
            None,
            added,
            Map::new(),
        );
        assert_eq!(event["added_properties"]["displaytitle"], "Fancy");
        assert!(event.get("removed_properties").is_none());
    }
}
