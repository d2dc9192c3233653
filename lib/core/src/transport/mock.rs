use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{HttpMethod, ProcessorRequest, ProcessorResponse, ProcessorTransport, TransportError};

/// Amount that the mock processor always declines
pub(crate) const DECLINED_AMOUNT: &str = "66.66";

pub(crate) enum Scripted {
    /// Reply with this status and body instead of simulating the processor
    Respond(u16, Value),
    /// Fail before the request reaches the processor
    Fail(TransportError),
    /// Let the processor handle the request, then lose the reply
    TimeoutAfterCommit,
}

#[derive(Default)]
struct MockState {
    vault: HashMap<String, Value>,
    replies: HashMap<String, ProcessorResponse>,
    script: VecDeque<Scripted>,
    requests: Vec<ProcessorRequest>,
    next_id: u32,
}

/// In-memory processor that vaults cards, deduplicates on the idempotency
/// key and can be scripted to fail
#[derive(Default)]
pub(crate) struct MockProcessor {
    state: Mutex<MockState>,
}

impl MockProcessor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn scripted(script: Vec<Scripted>) -> Self {
        let processor = Self::new();
        processor.state.lock().unwrap().script = script.into();
        processor
    }

    pub(crate) fn push(&self, step: Scripted) {
        self.state.lock().unwrap().script.push_back(step);
    }

    pub(crate) fn requests(&self) -> Vec<ProcessorRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub(crate) fn vaulted_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().vault.keys().cloned().collect()
    }

    fn handle(state: &mut MockState, request: &ProcessorRequest) -> ProcessorResponse {
        if let Some(reply) = state.replies.get(&request.idempotency_key) {
            return reply.clone();
        }
        let reply = Self::process(state, request);
        state
            .replies
            .insert(request.idempotency_key.clone(), reply.clone());
        reply
    }

    fn process(state: &mut MockState, request: &ProcessorRequest) -> ProcessorResponse {
        let body = request.body.clone().unwrap_or(Value::Null);
        let path: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        state.next_id += 1;
        let id = state.next_id;

        match (request.method, path.as_slice()) {
            (HttpMethod::Post, ["tokens"]) => {
                let token = format!("tok_{id}");
                state.vault.insert(token.clone(), body);
                respond(200, json!({"success": true, "token": token}))
            }
            (HttpMethod::Put, ["tokens", token]) => {
                if state.vault.remove(*token).is_none() {
                    return respond(404, json!({"success": false, "error": "unknown token"}));
                }
                let token = format!("tok_{id}");
                state.vault.insert(token.clone(), body);
                respond(200, json!({"success": true, "token": token}))
            }
            (HttpMethod::Delete, ["tokens", token]) => match state.vault.remove(*token) {
                Some(_) => respond(200, json!({"success": true})),
                None => respond(404, json!({"success": false, "error": "unknown token"})),
            },
            (HttpMethod::Post, ["charges"]) => {
                let token = body["token"].as_str().unwrap_or_default().to_string();
                if !state.vault.contains_key(&token) {
                    return respond(404, json!({"success": false, "error": "unknown token"}));
                }
                if body["amount"] == DECLINED_AMOUNT {
                    return respond(
                        402,
                        json!({"success": false, "decline_reason": "Insufficient funds"}),
                    );
                }
                respond(
                    200,
                    json!({
                        "success": true,
                        "transaction_id": format!("txn_{id}"),
                        "fee": "1.23",
                        "token": token,
                    }),
                )
            }
            (HttpMethod::Post, ["refunds"]) => respond(
                200,
                json!({"success": true, "transaction_id": format!("rfd_{id}"), "fee": "0.00"}),
            ),
            _ => respond(404, json!({"success": false, "error": "not found"})),
        }
    }
}

fn respond(status: u16, body: Value) -> ProcessorResponse {
    ProcessorResponse { status, body }
}

#[async_trait]
impl ProcessorTransport for MockProcessor {
    async fn send(&self, request: &ProcessorRequest) -> Result<ProcessorResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        match state.script.pop_front() {
            Some(Scripted::Respond(status, body)) => Ok(respond(status, body)),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::TimeoutAfterCommit) => {
                Self::handle(&mut state, request);
                Err(TransportError::Timeout)
            }
            None => Ok(Self::handle(&mut state, request)),
        }
    }
}
