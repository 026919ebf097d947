//! Test modules for the queue simulator
//!
//! Suites are organised by functional area. Shared fixtures live here.

mod integration;
mod prefetch;
mod typed;

use crate::queue::api::{Delivery, HandlerResult, Tagged};
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};

pub(crate) type Job = Tagged<String>;

/// Bodies seen by a handler, in invocation order
pub(crate) type Seen = Arc<Mutex<Vec<String>>>;

pub(crate) fn job(message_type: &str, body: &str) -> Job {
    Tagged::new(message_type, body.to_string())
}

pub(crate) fn seen() -> Seen {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn bodies(seen: &Seen) -> Vec<String> {
    seen.lock().unwrap().clone()
}

/// Handler that records each body and succeeds
pub(crate) fn recorder(
    seen: &Seen,
) -> impl Fn(Delivery<Job>) -> Ready<HandlerResult> + Send + Sync + 'static {
    let seen = Arc::clone(seen);
    move |delivery| {
        seen.lock().unwrap().push(delivery.payload.body.clone());
        ready(Ok(()))
    }
}

pub(crate) fn failure(reason: &str) -> HandlerResult {
    Err(reason.to_string().into())
}
