//! Listener interfaces the host invokes when wiki state changes.
//!
//! One trait per change category. `EventBusHooks` implements all of them by
//! building the event and queueing it on the request's `DeferredQueue`; the
//! host flushes that queue once its transaction has committed.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::deferred::{DeferredQueue, Destination};
use crate::error::{EventBusError, Result};
use crate::event::RequestContext;
use crate::factory::EventBusFactory;
use crate::serializers::job::{job_event, job_stream, JobSpec};
use crate::serializers::page::{
    page_delete_event, page_move_event, page_properties_change_event, page_undelete_event,
    PageDeletion, PageMove,
};
use crate::serializers::purge::{resource_purge_event, RESOURCE_PURGE_STREAM};
use crate::serializers::revision::{revision_create_event, revision_visibility_change_event};
use crate::serializers::user::{user_blocks_change_event, BlockChange};
use crate::serializers::{PageRecord, RevisionRecord, Site, UserRecord, Visibility};
use crate::types::EventTypes;

pub const PAGE_DELETE_STREAM: &str = "mediawiki.page-delete";
pub const PAGE_UNDELETE_STREAM: &str = "mediawiki.page-undelete";
pub const PAGE_MOVE_STREAM: &str = "mediawiki.page-move";
pub const PAGE_PROPERTIES_CHANGE_STREAM: &str = "mediawiki.page-properties-change";
pub const REVISION_CREATE_STREAM: &str = "mediawiki.revision-create";
pub const REVISION_VISIBILITY_CHANGE_STREAM: &str = "mediawiki.revision-visibility-change";
pub const USER_BLOCKS_CHANGE_STREAM: &str = "mediawiki.user-blocks-change";

pub trait PageDeletedListener {
    fn on_page_deleted(&self, queue: &mut DeferredQueue, ctx: &RequestContext, deletion: &PageDeletion<'_>) -> Result<()>;
}

pub trait PageUndeletedListener {
    fn on_page_undeleted(
        &self,
        queue: &mut DeferredQueue,
        ctx: &RequestContext,
        page: &PageRecord,
        performer: Option<&UserRecord>,
        reason: &[u8],
        prior_page_id: Option<u64>,
    ) -> Result<()>;
}

pub trait PageMovedListener {
    fn on_page_moved(&self, queue: &mut DeferredQueue, ctx: &RequestContext, mv: &PageMove<'_>) -> Result<()>;
}

pub trait PagePropertiesListener {
    fn on_page_properties_changed(
        &self,
        queue: &mut DeferredQueue,
        ctx: &RequestContext,
        page: &PageRecord,
        performer: Option<&UserRecord>,
        added: Map<String, Value>,
        removed: Map<String, Value>,
    ) -> Result<()>;
}

pub trait RevisionCreatedListener {
    fn on_revision_created(&self, queue: &mut DeferredQueue, ctx: &RequestContext, rev: &RevisionRecord) -> Result<()>;
}

pub trait RevisionVisibilityListener {
    fn on_revision_visibility_changed(
        &self,
        queue: &mut DeferredQueue,
        ctx: &RequestContext,
        rev: &RevisionRecord,
        performer: Option<&UserRecord>,
        prior: Visibility,
    ) -> Result<()>;
}

pub trait UserBlockedListener {
    fn on_user_blocks_changed(&self, queue: &mut DeferredQueue, ctx: &RequestContext, change: &BlockChange<'_>) -> Result<()>;
}

/// Producer-side glue: serializers + stream naming + queueing.
pub struct EventBusHooks {
    factory: Arc<EventBusFactory>,
    site: Site,
    job_secret: Option<String>,
}

impl EventBusHooks {
    pub fn new(factory: Arc<EventBusFactory>, site: Site) -> Self {
        Self {
            factory,
            site,
            job_secret: None,
        }
    }

    /// Enable job production; jobs are signed with this secret.
    pub fn with_job_secret(mut self, secret: impl Into<String>) -> Self {
        self.job_secret = Some(secret.into());
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    fn stream(&self, logical: &str) -> String {
        self.factory.stream_name(logical).to_string()
    }

    fn enqueue_event(&self, queue: &mut DeferredQueue, stream: String, event: Value) -> Result<()> {
        queue.enqueue(stream, vec![event])
    }

    /// Queue jobs for delivery with the regular submissions.
    pub fn push_jobs(&self, queue: &mut DeferredQueue, ctx: &RequestContext, jobs: &[JobSpec]) -> Result<()> {
        for (stream, events) in self.job_events(ctx, jobs)? {
            queue.enqueue_to(Destination::Stream(stream), EventTypes::JOB, events)?;
        }
        Ok(())
    }

    /// Queue jobs that must be sent after every other deferred submission.
    pub fn requeue_jobs(&self, queue: &mut DeferredQueue, ctx: &RequestContext, jobs: &[JobSpec]) -> Result<()> {
        for (stream, events) in self.job_events(ctx, jobs)? {
            queue.enqueue_late(Destination::Stream(stream), EventTypes::JOB, events)?;
        }
        Ok(())
    }

    /// Queue CDN purge signals for the given URLs.
    pub fn purge_urls(&self, queue: &mut DeferredQueue, ctx: &RequestContext, urls: &[String]) -> Result<()> {
        let stream = self.stream(RESOURCE_PURGE_STREAM);
        let events = urls
            .iter()
            .map(|url| resource_purge_event(ctx, &stream, url))
            .collect();
        queue.enqueue_to(Destination::Stream(stream), EventTypes::CDN, events)
    }

    /// Build signed job events, grouped per stream in first-seen order.
    fn job_events(&self, ctx: &RequestContext, jobs: &[JobSpec]) -> Result<Vec<(String, Vec<Value>)>> {
        let secret = self
            .job_secret
            .as_deref()
            .ok_or_else(|| EventBusError::Signature("job production requires a signing secret".into()))?;

        let mut by_stream: Vec<(String, Vec<Value>)> = Vec::new();
        for job in jobs {
            let stream = self.stream(&job_stream(&job.job_type));
            let event = job_event(&self.site, ctx, &stream, job, secret)?;
            match by_stream.iter_mut().find(|(s, _)| *s == stream) {
                Some((_, events)) => events.push(event),
                None => by_stream.push((stream, vec![event])),
            }
        }
        Ok(by_stream)
    }
}

impl PageDeletedListener for EventBusHooks {
    fn on_page_deleted(&self, queue: &mut DeferredQueue, ctx: &RequestContext, deletion: &PageDeletion<'_>) -> Result<()> {
        let stream = self.stream(PAGE_DELETE_STREAM);
        let event = page_delete_event(&self.site, ctx, &stream, deletion);
        self.enqueue_event(queue, stream, event)
    }
}

impl PageUndeletedListener for EventBusHooks {
    fn on_page_undeleted(
        &self,
        queue: &mut DeferredQueue,
        ctx: &RequestContext,
        page: &PageRecord,
        performer: Option<&UserRecord>,
        reason: &[u8],
        prior_page_id: Option<u64>,
    ) -> Result<()> {
        let stream = self.stream(PAGE_UNDELETE_STREAM);
        let event = page_undelete_event(&self.site, ctx, &stream, page, performer, reason, prior_page_id);
        self.enqueue_event(queue, stream, event)
    }
}

impl PageMovedListener for EventBusHooks {
    fn on_page_moved(&self, queue: &mut DeferredQueue, ctx: &RequestContext, mv: &PageMove<'_>) -> Result<()> {
        let stream = self.stream(PAGE_MOVE_STREAM);
        let event = page_move_event(&self.site, ctx, &stream, mv);
        self.enqueue_event(queue, stream, event)
    }
}

impl PagePropertiesListener for EventBusHooks {
    fn on_page_properties_changed(
        &self,
        queue: &mut DeferredQueue,
        ctx: &RequestContext,
        page: &PageRecord,
        performer: Option<&UserRecord>,
        added: Map<String, Value>,
        removed: Map<String, Value>,
    ) -> Result<()> {
        // Nothing changed, nothing to say.
        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }
        let stream = self.stream(PAGE_PROPERTIES_CHANGE_STREAM);
        let event = page_properties_change_event(&self.site, ctx, &stream, page, performer, added, removed);
        self.enqueue_event(queue, stream, event)
    }
}

impl RevisionCreatedListener for EventBusHooks {
    fn on_revision_created(&self, queue: &mut DeferredQueue, ctx: &RequestContext, rev: &RevisionRecord) -> Result<()> {
        let stream = self.stream(REVISION_CREATE_STREAM);
        let event = revision_create_event(&self.site, ctx, &stream, rev);
        self.enqueue_event(queue, stream, event)
    }
}

impl RevisionVisibilityListener for EventBusHooks {
    fn on_revision_visibility_changed(
        &self,
        queue: &mut DeferredQueue,
        ctx: &RequestContext,
        rev: &RevisionRecord,
        performer: Option<&UserRecord>,
        prior: Visibility,
    ) -> Result<()> {
        if rev.visibility == prior {
            return Ok(());
        }
        let stream = self.stream(REVISION_VISIBILITY_CHANGE_STREAM);
        let event = revision_visibility_change_event(&self.site, ctx, &stream, rev, performer, prior);
        self.enqueue_event(queue, stream, event)
    }
}

impl UserBlockedListener for EventBusHooks {
    fn on_user_blocks_changed(&self, queue: &mut DeferredQueue, ctx: &RequestContext, change: &BlockChange<'_>) -> Result<()> {
        let stream = self.stream(USER_BLOCKS_CHANGE_STREAM);
        let event = user_blocks_change_event(&self.site, ctx, &stream, change);
        self.enqueue_event(queue, stream, event)
    }
}
