//! The replicated key-value state machine.
//!
//! Deterministic and total: every [`ClientOpKind`] produces a [`Response`] for any input,
//! including a missing key. This is the only piece of the node that ever inspects the *value*
//! carried in a committed log entry.

use std::collections::HashMap;

use raft::message::ClientOpKind;

/// Error code used when a key that must exist is missing.
pub const NOT_FOUND: u32 = 20;
/// Error code used when a `cas`'s expected value doesn't match the current one.
pub const CAS_MISMATCH: u32 = 22;

/// The outcome of applying one [`ClientOpKind`] to the store.
pub enum Response {
    ReadOk { value: String },
    WriteOk,
    CasOk,
    Error { code: u32, text: String },
}

/// An in-memory `String -> String` map, applied to in commit order.
#[derive(Default)]
pub struct Kv {
    data: HashMap<String, String>,
}

impl Kv {
    pub fn new() -> Self {
        Self { data: HashMap::new() }
    }

    pub fn apply(&mut self, op: ClientOpKind) -> Response {
        match op {
            ClientOpKind::Read { key } => match self.data.get(&key) {
                Some(value) => Response::ReadOk { value: value.clone() },
                None => Response::Error { code: NOT_FOUND, text: "not found".to_string() },
            },
            ClientOpKind::Write { key, value } => {
                self.data.insert(key, value);
                Response::WriteOk
            }
            ClientOpKind::Cas { key, from, to } => match self.data.get(&key) {
                None => Response::Error { code: NOT_FOUND, text: "not found".to_string() },
                Some(current) if *current != from => Response::Error {
                    code: CAS_MISMATCH,
                    text: format!("expected {}, had {}", from, current),
                },
                Some(_) => {
                    self.data.insert(key, to);
                    Response::CasOk
                }
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn matches_read_ok(r: Response, expected: &str) -> bool {
        matches!(r, Response::ReadOk { value } if value == expected)
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut kv = Kv::new();
        kv.apply(ClientOpKind::Write { key: "x".into(), value: "1".into() });
        let r = kv.apply(ClientOpKind::Read { key: "x".into() });
        assert!(matches_read_ok(r, "1"));
    }

    #[test]
    fn read_missing_key_is_not_found() {
        let mut kv = Kv::new();
        match kv.apply(ClientOpKind::Read { key: "missing".into() }) {
            Response::Error { code, .. } => assert_eq!(code, NOT_FOUND),
            _ => panic!("expected an error response"),
        }
    }

    #[test]
    fn cas_succeeds_when_value_matches() {
        let mut kv = Kv::new();
        kv.apply(ClientOpKind::Write { key: "c".into(), value: "old".into() });
        let r = kv.apply(ClientOpKind::Cas { key: "c".into(), from: "old".into(), to: "new".into() });
        assert!(matches!(r, Response::CasOk));
        assert!(matches_read_ok(kv.apply(ClientOpKind::Read { key: "c".into() }), "new"));
    }

    #[test]
    fn cas_fails_on_missing_key() {
        let mut kv = Kv::new();
        match kv.apply(ClientOpKind::Cas { key: "nope".into(), from: "a".into(), to: "b".into() }) {
            Response::Error { code, .. } => assert_eq!(code, NOT_FOUND),
            _ => panic!("expected not-found"),
        }
    }

    #[test]
    fn cas_fails_when_expected_value_does_not_match() {
        let mut kv = Kv::new();
        kv.apply(ClientOpKind::Write { key: "c".into(), value: "new".into() });
        match kv.apply(ClientOpKind::Cas { key: "c".into(), from: "old".into(), to: "x".into() }) {
            Response::Error { code, text } => {
                assert_eq!(code, CAS_MISMATCH);
                assert_eq!(text, "expected old, had new");
            }
            _ => panic!("expected a cas mismatch"),
        }
    }
}
