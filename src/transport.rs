//! The line-delimited JSON transport: `send`/`reply`/`rpc`/`on`, with `in_reply_to` correlation.
//!
//! Outbound frames are written to a locked `stdout` directly from whichever thread calls `send`,
//! following the teacher's pattern of a lock guarding the one shared external resource rather than
//! funnelling writes through a dedicated thread. Inbound frames are read line-by-line from stdin
//! by the dispatch loop in `main`, which calls [`Transport::dispatch`] for each one.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, warn};

use crate::error::TransportError;
use crate::wire::{Envelope, Payload};

type PendingHandler = Box<dyn FnOnce(&Transport, Payload) + Send>;
type TypeHandler = Arc<dyn Fn(&Transport, Envelope) + Send + Sync>;

/// The node's one handle onto stdin/stdout framing.
pub struct Transport {
    node_id: Mutex<String>,
    next_msg_id: AtomicU64,
    stdout: Mutex<io::Stdout>,
    pending: Mutex<HashMap<u64, PendingHandler>>,
    handlers: Mutex<HashMap<&'static str, TypeHandler>>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            node_id: Mutex::new(String::new()),
            next_msg_id: AtomicU64::new(1),
            stdout: Mutex::new(io::stdout()),
            pending: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Sets this node's id, used as `src` on every outbound frame from here on.
    pub fn set_node_id(&self, node_id: String) {
        *self.node_id.lock().unwrap() = node_id;
    }

    fn node_id(&self) -> String {
        self.node_id.lock().unwrap().clone()
    }

    fn write_line(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let line = serde_json::to_string(envelope)?;
        let mut stdout = self.stdout.lock().unwrap();
        writeln!(stdout, "{}", line)?;
        stdout.flush()?;
        Ok(())
    }

    /// Enqueues one outbound frame addressed to `dest`.
    pub fn send(&self, dest: &str, body: Payload) -> Result<(), TransportError> {
        let envelope = Envelope { src: self.node_id(), dest: dest.to_string(), body };
        self.write_line(&envelope)
    }

    /// Sends `body` to `req.src` with `in_reply_to` implicit in `body`'s own `in_reply_to` field
    /// (the caller is expected to have built a response variant already carrying it).
    pub fn reply(&self, req: &Envelope, body: Payload) -> Result<(), TransportError> {
        self.send(&req.src, body)
    }

    /// Allocates a fresh `msg_id`, registers `handler` under it, and sends `body` (which must
    /// carry that same `msg_id`) to `dest`. `handler` fires exactly once, the first time a frame
    /// arrives whose `in_reply_to` matches, and is deregistered immediately after.
    pub fn rpc(
        &self,
        dest: &str,
        body_with_msg_id: impl FnOnce(u64) -> Payload,
        handler: impl FnOnce(&Transport, Payload) + Send + 'static,
    ) -> Result<(), TransportError> {
        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().unwrap().insert(msg_id, Box::new(handler));
        let body = body_with_msg_id(msg_id);
        if let Err(e) = self.send(dest, body) {
            self.pending.lock().unwrap().remove(&msg_id);
            return Err(e);
        }
        Ok(())
    }

    /// Registers a handler for every inbound frame of type `type_name` that isn't claimed by a
    /// pending RPC callback. Registering the same type twice is a programmer error.
    pub fn on(
        &self,
        type_name: &'static str,
        handler: impl Fn(&Transport, Envelope) + Send + Sync + 'static,
    ) -> Result<(), TransportError> {
        let mut handlers = self.handlers.lock().unwrap();
        if handlers.contains_key(type_name) {
            return Err(TransportError::DuplicateHandler(type_name.to_string()));
        }
        handlers.insert(type_name, Arc::new(handler));
        Ok(())
    }

    /// Dispatches one inbound frame: an `in_reply_to` match takes priority over type dispatch.
    pub fn dispatch(&self, envelope: Envelope) -> Result<(), TransportError> {
        if let Some(id) = envelope.body.in_reply_to() {
            let handler = self.pending.lock().unwrap().remove(&id);
            if let Some(handler) = handler {
                handler(self, envelope.body);
                return Ok(());
            }
        }
        let type_name = envelope.body.type_name();
        let handler = self.handlers.lock().unwrap().get(type_name).cloned();
        if let Some(handler) = handler {
            // The lock is dropped before invoking the handler, so a handler that registers
            // another type (unusual, but not forbidden) cannot deadlock against this mutex.
            handler(self, envelope);
            Ok(())
        } else {
            warn!("no handler for inbound frame of type {}", type_name);
            Err(TransportError::Unhandled(type_name.to_string()))
        }
    }

    /// Reads newline-delimited JSON frames from `stdin` until EOF, dispatching each. A malformed
    /// line or an unhandled frame is logged and does not stop the loop.
    pub fn run_dispatch_loop(&self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("stdin read error: {}", e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let envelope: Envelope = match serde_json::from_str(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!("malformed frame {:?}: {}", line, e);
                    continue;
                }
            };
            if let Err(e) = self.dispatch(envelope) {
                error!("dispatch error: {}", e);
            }
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn dispatch_prefers_pending_rpc_over_type_handler() {
        let t = Transport::new();
        t.set_node_id("n1".to_string());
        t.on("write_ok", |_, _| panic!("type handler should not fire for a claimed reply"))
            .unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_handler = Arc::clone(&fired);
        t.pending.lock().unwrap().insert(
            7,
            Box::new(move |_, _| fired_in_handler.store(true, Ordering::SeqCst)),
        );

        let envelope = Envelope {
            src: "n2".into(),
            dest: "n1".into(),
            body: Payload::WriteOk { in_reply_to: 7 },
        };
        t.dispatch(envelope).unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn rpc_callback_is_deregistered_after_firing_once() {
        let t = Transport::new();
        t.set_node_id("n1".to_string());
        // `rpc` writes to stdout; redirecting that in-process isn't worth it here, so this test
        // only exercises the pending-handler bookkeeping directly, the same surface `rpc` drives.
        t.pending.lock().unwrap().insert(1, Box::new(|_, _| {}));
        assert!(t.pending.lock().unwrap().contains_key(&1));

        let envelope = Envelope {
            src: "n2".into(),
            dest: "n1".into(),
            body: Payload::RaftInitOk { in_reply_to: 1 },
        };
        t.dispatch(envelope).unwrap();
        assert!(!t.pending.lock().unwrap().contains_key(&1));
    }

    #[test]
    fn registering_the_same_type_twice_is_an_error() {
        let t = Transport::new();
        t.on("write", |_, _| {}).unwrap();
        assert!(matches!(t.on("write", |_, _| {}), Err(TransportError::DuplicateHandler(_))));
    }

    #[test]
    fn dispatch_of_an_unhandled_type_is_an_error_not_a_panic() {
        let t = Transport::new();
        t.set_node_id("n1".to_string());
        let envelope = Envelope { src: "n2".into(), dest: "n1".into(), body: Payload::RaftInitOk { in_reply_to: 99 } };
        assert!(matches!(t.dispatch(envelope), Err(TransportError::Unhandled(_))));
    }
}
