//! Request-scoped queue of pending submissions, flushed after the triggering
//! unit of work commits.
//!
//! Flush resolves every submission to a backing service and makes one `send`
//! per service (and event type), concatenating events in enqueue order.
//! Late submissions go out strictly after all regular ones. A service that
//! cannot be resolved fails its own group only.

use tracing::{debug, error};

use crate::bus::{SendOptions, SendOutcome};
use crate::event::{ensure_event_list, EventRecord, RequestContext};
use crate::error::Result;
use crate::factory::{EventBusFactory, Route};
use crate::types::EventTypes;

/// Where a submission is headed before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Resolved through the stream configuration at flush time.
    Stream(String),
    /// A service name, used as-is.
    Service(String),
}

#[derive(Debug)]
struct Submission {
    destination: Destination,
    event_type: EventTypes,
    events: Vec<EventRecord>,
}

/// One `send` made during flush.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub service: String,
    pub event_type: EventTypes,
    pub events: usize,
    pub outcome: SendOutcome,
}

/// Outcome of a flush, in send order.
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    pub deliveries: Vec<Delivery>,
    /// Events dropped because their stream is disabled for this producer.
    pub dropped: usize,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.deliveries
            .iter()
            .all(|d| !matches!(d.outcome, SendOutcome::Failed(_)))
    }
}

/// Lives for exactly one request. Not shared, not persisted.
#[derive(Debug)]
pub struct DeferredQueue {
    context: Option<RequestContext>,
    pending: Vec<Submission>,
    late: Vec<Submission>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self {
            context: None,
            pending: Vec::new(),
            late: Vec::new(),
        }
    }

    /// A queue whose flush forwards the request's client IP.
    pub fn for_request(context: RequestContext) -> Self {
        Self {
            context: Some(context),
            ..Self::new()
        }
    }

    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    /// Queue ordinary events for a stream.
    pub fn enqueue(&mut self, stream: impl Into<String>, events: Vec<EventRecord>) -> Result<()> {
        self.push(Destination::Stream(stream.into()), EventTypes::EVENT, events, false)
    }

    /// Queue events of any category for any destination.
    pub fn enqueue_to(
        &mut self,
        destination: Destination,
        event_type: EventTypes,
        events: Vec<EventRecord>,
    ) -> Result<()> {
        self.push(destination, event_type, events, false)
    }

    /// Queue a submission that must go out after every regular one, e.g. job requeues.
    pub fn enqueue_late(
        &mut self,
        destination: Destination,
        event_type: EventTypes,
        events: Vec<EventRecord>,
    ) -> Result<()> {
        self.push(destination, event_type, events, true)
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.late.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.late.is_empty()
    }

    fn push(
        &mut self,
        destination: Destination,
        event_type: EventTypes,
        events: Vec<EventRecord>,
        late: bool,
    ) -> Result<()> {
        // Fail at the call site, not inside flush.
        ensure_event_list(&events)?;
        if events.is_empty() {
            return Ok(());
        }
        let submission = Submission {
            destination,
            event_type,
            events,
        };
        if late {
            self.late.push(submission);
        } else {
            self.pending.push(submission);
        }
        Ok(())
    }

    /// Deliver everything queued. Consumes the queue whether or not delivery
    /// succeeds.
    ///
    /// Each group is resolved on its own: a misconfigured service (unknown
    /// name, missing URL) fails only its own group, which is logged and
    /// reported as a failed `Delivery`. Nothing here is raised to the caller.
    pub async fn flush(self, factory: &EventBusFactory) -> FlushReport {
        let options = SendOptions {
            client_ip: self.context.as_ref().and_then(|c| c.client_ip),
            max_batch_bytes: None,
        };

        let (regular, dropped_regular) = group_submissions(factory, self.pending);
        let (late, dropped_late) = group_submissions(factory, self.late);

        let mut report = FlushReport {
            deliveries: Vec::with_capacity(regular.len() + late.len()),
            dropped: dropped_regular + dropped_late,
        };

        for group in regular.into_iter().chain(late) {
            let count = group.events.len();
            let outcome = match factory.get_instance(&group.service) {
                Ok(bus) => bus.send_with(group.events, group.event_type, &options).await,
                Err(err) => {
                    error!(
                        service = %group.service,
                        events = count,
                        error = %err,
                        "Cannot resolve event service, dropping its events"
                    );
                    SendOutcome::Failed(vec![err.to_string()])
                }
            };
            report.deliveries.push(Delivery {
                service: group.service,
                event_type: group.event_type,
                events: count,
                outcome,
            });
        }

        report
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct Group {
    service: String,
    event_type: EventTypes,
    events: Vec<EventRecord>,
}

/// Resolve submissions and concatenate by (service, event type), keeping
/// first-appearance order of groups and enqueue order of events.
fn group_submissions(factory: &EventBusFactory, submissions: Vec<Submission>) -> (Vec<Group>, usize) {
    let mut groups: Vec<Group> = Vec::new();
    let mut dropped = 0;

    for submission in submissions {
        let service = match &submission.destination {
            Destination::Service(name) => name.clone(),
            Destination::Stream(stream) => match factory.resolve_service_name(stream) {
                Route::Service(name) => name,
                Route::Disabled => {
                    debug!(stream = %stream, events = submission.events.len(), "Dropping events for disabled stream");
                    dropped += submission.events.len();
                    continue;
                }
            },
        };

        match groups
            .iter_mut()
            .find(|g| g.service == service && g.event_type == submission.event_type)
        {
            Some(existing) => existing.events.extend(submission.events),
            None => groups.push(Group {
                service,
                event_type: submission.event_type,
                events: submission.events,
            }),
        }
    }

    (groups, dropped)
}
