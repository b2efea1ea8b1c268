use serde_json::{json, Value};

use super::{revision_fields, user_entity, RevisionRecord, Site, UserRecord, Visibility};
use crate::event::{EventBuilder, EventRecord, RequestContext};

pub const REVISION_CREATE_SCHEMA: &str = "/mediawiki/revision/create/2.0.0";
pub const REVISION_VISIBILITY_CHANGE_SCHEMA: &str = "/mediawiki/revision/visibility-change/1.0.0";

/// `meta.dt` is the revision timestamp so consumers see edit time, not send time.
pub fn revision_create_event(site: &Site, ctx: &RequestContext, stream: &str, rev: &RevisionRecord) -> EventRecord {
    let fields = revision_fields(site, rev);

    EventBuilder::new(REVISION_CREATE_SCHEMA, stream, site.page_url(&rev.page.title))
        .dt(rev.timestamp)
        .fields(Value::Object(fields))
        .build(ctx)
}

pub fn revision_visibility_change_event(
    site: &Site,
    ctx: &RequestContext,
    stream: &str,
    rev: &RevisionRecord,
    performer: Option<&UserRecord>,
    prior: Visibility,
) -> EventRecord {
    // The revision as it now looks publicly, plus both visibility states.
    let mut fields = revision_fields(site, rev);
    fields.insert("visibility".into(), visibility_entity(rev.visibility));
    fields.insert(
        "prior_state".into(),
        json!({ "visibility": visibility_entity(prior) }),
    );
    match performer {
        Some(performer) => {
            fields.insert("performer".into(), user_entity(performer));
        }
        None => {
            fields.remove("performer");
        }
    }

    EventBuilder::new(REVISION_VISIBILITY_CHANGE_SCHEMA, stream, site.page_url(&rev.page.title))
        .dt(ctx.timestamp)
        .fields(Value::Object(fields))
        .build(ctx)
}

/// Schema form: `true` means visible.
fn visibility_entity(v: Visibility) -> Value {
    json!({
        "text": !v.text,
        "user": !v.user,
        "comment": !v.comment,
    })
}
