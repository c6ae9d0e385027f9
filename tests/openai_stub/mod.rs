use std::io::Read as _;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct OpenAiStubConfig {
    /// Returned as `choices[0].message.content` by chat completions.
    pub chat_reply: String,
    /// Non-200 makes chat completions fail with an OpenAI-style error body.
    pub chat_status: u16,
    /// Run status polls answered with `in_progress` before `completed`.
    pub polls_before_complete: u32,
    /// Terminal run status reported instead of `completed`, if set.
    pub run_terminal_status: Option<String>,
    pub assistant_reply: String,
}

impl Default for OpenAiStubConfig {
    fn default() -> Self {
        Self {
            chat_reply: "{}".to_owned(),
            chat_status: 200,
            polls_before_complete: 0,
            run_terminal_status: None,
            assistant_reply: "{}".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub openai_beta: Option<String>,
    pub body: Value,
}

pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

const THREAD_ID: &str = "thread_stub";
const RUN_ID: &str = "run_stub";

fn header(request: &tiny_http::Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_owned())
}

fn json_response(status: u16, body: Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header)
}

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let mut polls = 0u32;
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let method = request.method().to_string();
                let path = request.url().to_string();
                let mut raw = String::new();
                let _ = request.as_reader().read_to_string(&mut raw);
                let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
                recorded.lock().expect("lock").push(RecordedRequest {
                    method: method.clone(),
                    path: path.clone(),
                    authorization: header(&request, "Authorization"),
                    openai_beta: header(&request, "OpenAI-Beta"),
                    body: body.clone(),
                });

                let thread_prefix = format!("/v1/threads/{THREAD_ID}");
                let response = match (method.as_str(), path.as_str()) {
                    ("POST", "/v1/chat/completions") => {
                        if config.chat_status != 200 {
                            json_response(
                                config.chat_status,
                                serde_json::json!({
                                    "error": { "message": "stub failure", "type": "server_error" }
                                }),
                            )
                        } else {
                            json_response(
                                200,
                                serde_json::json!({
                                    "id": "chatcmpl_stub",
                                    "model": body.get("model").cloned().unwrap_or(Value::Null),
                                    "choices": [{
                                        "index": 0,
                                        "message": { "role": "assistant", "content": config.chat_reply },
                                    }],
                                    "usage": { "total_tokens": 321 },
                                }),
                            )
                        }
                    }
                    ("POST", "/v1/threads") => {
                        json_response(200, serde_json::json!({ "id": THREAD_ID }))
                    }
                    ("POST", p) if p == format!("{thread_prefix}/messages") => {
                        json_response(200, serde_json::json!({ "id": "msg_user" }))
                    }
                    ("POST", p) if p == format!("{thread_prefix}/runs") => json_response(
                        200,
                        serde_json::json!({ "id": RUN_ID, "status": "queued" }),
                    ),
                    ("GET", p) if p == format!("{thread_prefix}/runs/{RUN_ID}") => {
                        polls += 1;
                        let status = if polls <= config.polls_before_complete {
                            "in_progress".to_owned()
                        } else {
                            config
                                .run_terminal_status
                                .clone()
                                .unwrap_or_else(|| "completed".to_owned())
                        };
                        json_response(
                            200,
                            serde_json::json!({
                                "id": RUN_ID,
                                "status": status,
                                "model": "gpt-4",
                                "usage": { "total_tokens": 55 },
                                "last_error": if status == "failed" {
                                    serde_json::json!({ "code": "server_error", "message": "run exploded" })
                                } else {
                                    Value::Null
                                },
                            }),
                        )
                    }
                    ("GET", p) if p.starts_with(&format!("{thread_prefix}/messages")) => {
                        json_response(
                            200,
                            serde_json::json!({
                                "data": [
                                    {
                                        "role": "assistant",
                                        "content": [{ "type": "text", "text": { "value": config.assistant_reply } }],
                                    },
                                    {
                                        "role": "user",
                                        "content": [{ "type": "text", "text": { "value": "prompt" } }],
                                    },
                                ]
                            }),
                        )
                    }
                    _ => json_response(404, serde_json::json!({ "error": { "message": "not found" } })),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
