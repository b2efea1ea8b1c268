//! Splits a batch into wire-sized sub-batches.

use serde_json::Value;

/// One physical request worth of events, with its serialized JSON array body.
#[derive(Debug, Clone)]
pub struct SubBatch<'a> {
    pub events: &'a [Value],
    pub body: String,
}

/// Greedy, order-preserving partition of `events` into contiguous slices whose
/// JSON array encoding stays within `max_bytes`.
///
/// An event that alone exceeds the budget gets a sub-batch of its own; it is
/// never dropped or truncated. Bodies are built incrementally, so each
/// `body.len()` is the exact wire size.
pub fn partition(events: &[Value], max_bytes: usize) -> Result<Vec<SubBatch<'_>>, serde_json::Error> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut body = String::from("[");

    for (idx, event) in events.iter().enumerate() {
        let encoded = serde_json::to_string(event)?;
        let in_batch = idx - start;
        // Size of the body if this event were appended, including `,` and `]`.
        let projected = body.len() + encoded.len() + usize::from(in_batch > 0) + 1;

        if in_batch > 0 && projected > max_bytes {
            body.push(']');
            batches.push(SubBatch {
                events: &events[start..idx],
                body: std::mem::replace(&mut body, String::from("[")),
            });
            start = idx;
        }

        if idx > start {
            body.push(',');
        }
        body.push_str(&encoded);
    }

    if start < events.len() {
        body.push(']');
        batches.push(SubBatch {
            events: &events[start..],
            body,
        });
    }

    Ok(batches)
}
