//! Message dispatcher (C5).
//!
//! Maintains a `MessageType -> handler` table. `dispatch` parses a
//! payload as JSON, reads `messageType`, and invokes the registered
//! handler. Parse/lookup failures are logged at debug and dropped —
//! they never propagate (spec §4.5/§7).
//!
//! Handlers return a boxed future that `dispatch` awaits inline rather
//! than detaching onto the runtime, so the caller (the reader task that
//! decoded the payload, per spec §5) is the one actually running the
//! handler body — two payloads dispatched in order complete their
//! handlers in that same order (P9).

use crate::event_sink::{Category, EventSink, Level};
use crate::message::MessageType;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a handler receives for one dispatched payload.
pub struct Dispatched {
    pub message_type: MessageType,
    pub document: serde_json::Value,
    pub source_label: String,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Handler = Box<dyn Fn(Dispatched) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageType, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `tag`. Replacing an existing registration
    /// is permitted (last writer wins).
    pub fn register(&mut self, tag: MessageType, handler: Handler, sink: &dyn EventSink) {
        if self.handlers.insert(tag, handler).is_some() {
            sink.emit(Level::Debug, Category::Service, &format!("handler replaced for {tag}"), &[]);
        }
    }

    /// Parse `payload` as a JSON document, read its `messageType`, and
    /// await the registered handler to completion before returning.
    /// Never panics, never returns an error — every failure mode is a
    /// logged drop.
    pub async fn dispatch(&self, payload: &[u8], source_label: &str, sink: &dyn EventSink) {
        let document: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                sink.emit(Level::Debug, Category::Service, &format!("payload parse failed: {e}"), &[]);
                return;
            }
        };

        let type_str = match document.get("messageType").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => s,
            _ => {
                sink.emit(Level::Debug, Category::Service, "payload missing messageType", &[]);
                return;
            }
        };

        let message_type: MessageType = match serde_json::from_value(serde_json::Value::String(type_str.to_string())) {
            Ok(t) => t,
            Err(_) => {
                sink.emit(Level::Debug, Category::Service, &format!("unknown messageType: {type_str}"), &[]);
                return;
            }
        };

        match self.handlers.get(&message_type) {
            Some(handler) => handler(Dispatched { message_type, document, source_label: source_label.to_string() }).await,
            None => {
                sink.emit(Level::Debug, Category::Service, &format!("no handler registered for {message_type}"), &[]);
            }
        }
    }
}

/// Convenience wrapper so a `Dispatcher` can be shared behind an `Arc`
/// while still built up with `register` before the transport starts.
pub type SharedDispatcher = Arc<Dispatcher>;
