use serde_json::json;

use crate::event::{EventBuilder, EventRecord, RequestContext};

pub const RESOURCE_CHANGE_SCHEMA: &str = "/resource_change/1.0.0";
pub const RESOURCE_PURGE_STREAM: &str = "resource-purge";

/// A CDN purge signal for one URL. Sent with `EventTypes::CDN`.
pub fn resource_purge_event(ctx: &RequestContext, stream: &str, url: &str) -> EventRecord {
    EventBuilder::new(RESOURCE_CHANGE_SCHEMA, stream, url)
        .dt(ctx.timestamp)
        .field("tags", json!(["mediawiki"]))
        .build(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_event_targets_url() {
        let ctx = RequestContext::new("en.wikipedia.org");
        let event = resource_purge_event(&ctx, RESOURCE_PURGE_STREAM, "https://en.wikipedia.org/wiki/Foo");
        assert_eq!(event["meta"]["uri"], "https://en.wikipedia.org/wiki/Foo");
        assert_eq!(event["meta"]["stream"], RESOURCE_PURGE_STREAM);
        assert_eq!(event["tags"][0], "mediawiki");
    }
}
