//! Wiki change event producer.
//!
//! Builds Event Records for wiki state changes, routes each stream to its
//! backing intake service, splits batches to fit the intake size limit and
//! POSTs them over HTTP. Producers queue submissions on a request-scoped
//! `DeferredQueue` that is flushed once the triggering work has committed.

pub mod bus;
pub mod config;
pub mod deferred;
pub mod error;
pub mod event;
pub mod factory;
pub mod hooks;
pub mod partition;
pub mod sanitize;
pub mod serializers;
pub mod signature;
pub mod transport;
pub mod types;

pub use bus::{EventBus, Payload, SendOptions, SendOutcome};
pub use config::{load_config, parse_config, EventBusConfig, ServiceConfig};
pub use deferred::{DeferredQueue, Delivery, Destination, FlushReport};
pub use error::{EventBusError, Result};
pub use event::{EventBuilder, EventRecord, RequestContext};
pub use factory::{EventBusFactory, Route};
pub use hooks::EventBusHooks;
pub use transport::{HttpOutcome, HttpRequest, MemoryTransport, ReqwestTransport, Transport};
pub use types::EventTypes;
