use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmResponse, RequestOptions};

#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub id: String,
    pub status: String,
    pub tokens_used: Option<u64>,
    pub model: Option<String>,
    pub error_message: Option<String>,
}

impl RunState {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "cancelled" | "expired")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub role: String,
    pub text: String,
}

/// Providers whose generation runs asynchronously inside a conversation
/// thread.
#[async_trait]
pub trait ThreadClient: Send + Sync {
    async fn create_thread(&self) -> Result<String, LlmError>;
    async fn add_message_to_thread(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<(), LlmError>;
    async fn create_run(
        &self,
        thread_id: &str,
        options: &RequestOptions,
    ) -> Result<RunState, LlmError>;
    async fn get_run_status(&self, thread_id: &str, run_id: &str) -> Result<RunState, LlmError>;
    /// Newest message first.
    async fn get_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, LlmError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollSchedule {
    /// Delay before each poll; the last entry repeats.
    pub delays: Vec<Duration>,
    pub max_attempts: u32,
    pub max_elapsed: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            delays: [2, 3, 5, 5, 10]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            max_attempts: 60,
            max_elapsed: Duration::from_secs(300),
        }
    }
}

impl PollSchedule {
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) - 1) as usize;
        self.delays
            .get(idx)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::from_secs(1))
    }
}

/// Blocks the calling task until the run reaches `completed`. Terminal
/// failure states return immediately; exhausting the schedule is a timeout.
pub async fn poll_run_until_complete<T: ThreadClient + ?Sized>(
    client: &T,
    thread_id: &str,
    run_id: &str,
    schedule: &PollSchedule,
) -> Result<RunState, LlmError> {
    let started_at = tokio::time::Instant::now();
    let mut attempts = 0u32;

    while attempts < schedule.max_attempts && started_at.elapsed() < schedule.max_elapsed {
        attempts += 1;
        tokio::time::sleep(schedule.delay_before(attempts)).await;

        let state = client.get_run_status(thread_id, run_id).await?;
        tracing::debug!(thread_id, run_id, attempt = attempts, status = %state.status, "run status");

        if state.is_completed() {
            return Ok(state);
        }
        if state.is_terminal_failure() {
            return Err(LlmError::RunFailed {
                run_id: run_id.to_owned(),
                status: state.status,
                message: state.error_message,
            });
        }
    }

    Err(LlmError::RunTimeout {
        run_id: run_id.to_owned(),
        attempts,
        elapsed_secs: started_at.elapsed().as_secs(),
    })
}

/// Adapts a thread/run provider to the single-call `LlmClient` contract.
pub struct ThreadRunBackend<T> {
    client: T,
    schedule: PollSchedule,
}

impl<T: ThreadClient> ThreadRunBackend<T> {
    pub fn new(client: T, schedule: PollSchedule) -> Self {
        Self { client, schedule }
    }
}

#[async_trait]
impl<T: ThreadClient> LlmClient for ThreadRunBackend<T> {
    async fn send_request(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<LlmResponse, LlmError> {
        let thread_id = match options.thread_id.as_deref() {
            Some(thread_id) => thread_id.to_owned(),
            None => self.client.create_thread().await?,
        };

        self.client.add_message_to_thread(&thread_id, prompt).await?;
        let run = self.client.create_run(&thread_id, options).await?;
        tracing::info!(thread_id = %thread_id, run_id = %run.id, model = %options.model, "run created");

        let finished =
            poll_run_until_complete(&self.client, &thread_id, &run.id, &self.schedule).await?;

        let messages = self.client.get_thread_messages(&thread_id).await?;
        let content = messages
            .into_iter()
            .find(|message| message.role == "assistant")
            .map(|message| message.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Malformed(format!("thread {thread_id} has no assistant reply"))
            })?;

        Ok(LlmResponse {
            content,
            tokens_used: finished.tokens_used.unwrap_or(0),
            model: finished.model.unwrap_or_else(|| options.model.clone()),
            thread_id: Some(thread_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct ScriptedThread {
        statuses: Mutex<Vec<&'static str>>,
        polls: Mutex<u32>,
        created_threads: Mutex<u32>,
    }

    impl ScriptedThread {
        fn new(mut statuses: Vec<&'static str>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                polls: Mutex::new(0),
                created_threads: Mutex::new(0),
            }
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().expect("lock")
        }
    }

    #[async_trait]
    impl ThreadClient for ScriptedThread {
        async fn create_thread(&self) -> Result<String, LlmError> {
            *self.created_threads.lock().expect("lock") += 1;
            Ok("thread_new".to_owned())
        }

        async fn add_message_to_thread(&self, _: &str, _: &str) -> Result<(), LlmError> {
            Ok(())
        }

        async fn create_run(&self, _: &str, _: &RequestOptions) -> Result<RunState, LlmError> {
            Ok(RunState {
                id: "run_1".to_owned(),
                status: "queued".to_owned(),
                tokens_used: None,
                model: None,
                error_message: None,
            })
        }

        async fn get_run_status(&self, _: &str, run_id: &str) -> Result<RunState, LlmError> {
            *self.polls.lock().expect("lock") += 1;
            let status = self
                .statuses
                .lock()
                .expect("lock")
                .pop()
                .unwrap_or("in_progress");
            Ok(RunState {
                id: run_id.to_owned(),
                status: status.to_owned(),
                tokens_used: Some(77),
                model: Some("gpt-4".to_owned()),
                error_message: None,
            })
        }

        async fn get_thread_messages(&self, _: &str) -> Result<Vec<ThreadMessage>, LlmError> {
            Ok(vec![
                ThreadMessage {
                    role: "assistant".to_owned(),
                    text: "{\"ok\":true}".to_owned(),
                },
                ThreadMessage {
                    role: "user".to_owned(),
                    text: "prompt".to_owned(),
                },
            ])
        }
    }

    #[test]
    fn default_schedule_ramps_then_repeats() {
        let schedule = PollSchedule::default();
        let delays: Vec<u64> = (1..=7).map(|n| schedule.delay_before(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 3, 5, 5, 10, 10, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_in_progress_polls() -> anyhow::Result<()> {
        let client = ScriptedThread::new(vec!["queued", "in_progress", "completed"]);
        let state =
            poll_run_until_complete(&client, "thread_1", "run_1", &PollSchedule::default()).await?;
        assert!(state.is_completed());
        assert_eq!(client.polls(), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_stops_polling_immediately() {
        for status in ["failed", "cancelled", "expired"] {
            let client = ScriptedThread::new(vec!["in_progress", status, "completed"]);
            let err = poll_run_until_complete(&client, "t", "run_1", &PollSchedule::default())
                .await
                .unwrap_err();
            assert!(matches!(err, LlmError::RunFailed { .. }), "{status}: {err}");
            assert_eq!(client.polls(), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_bound_raises_timeout() {
        let client = ScriptedThread::new(Vec::new());
        let err = poll_run_until_complete(&client, "t", "run_1", &PollSchedule::default())
            .await
            .unwrap_err();
        match err {
            LlmError::RunTimeout {
                attempts,
                elapsed_secs,
                ..
            } => {
                assert!(attempts < 60, "elapsed bound should trip first: {attempts}");
                assert!(elapsed_secs >= 300);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_bound_raises_timeout() {
        let client = ScriptedThread::new(Vec::new());
        let schedule = PollSchedule {
            delays: vec![Duration::from_millis(10)],
            max_attempts: 4,
            max_elapsed: Duration::from_secs(300),
        };
        let err = poll_run_until_complete(&client, "t", "run_1", &schedule)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RunTimeout { attempts: 4, .. }));
        assert_eq!(client.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_reuses_existing_thread_and_returns_reply() -> anyhow::Result<()> {
        let backend = ThreadRunBackend::new(
            ScriptedThread::new(vec!["completed"]),
            PollSchedule::default(),
        );
        let mut options = RequestOptions::new("gpt-4", 0.8);
        options.thread_id = Some("thread_existing".to_owned());

        let response = backend.send_request("prompt", &options).await?;
        assert_eq!(response.content, "{\"ok\":true}");
        assert_eq!(response.tokens_used, 77);
        assert_eq!(response.thread_id.as_deref(), Some("thread_existing"));
        assert_eq!(*backend.client.created_threads.lock().expect("lock"), 0);
        Ok(())
    }
}
