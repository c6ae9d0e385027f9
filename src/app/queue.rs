use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Semaphore-bounded `tokio::spawn`: at most `max_concurrency` jobs hold a
/// worker slot at once.
#[derive(Debug, Clone)]
pub struct InProcessQueue {
    semaphore: Arc<Semaphore>,
}

impl InProcessQueue {
    pub fn new(max_concurrency: usize) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        // Claimed eagerly so `available_slots` drops as soon as this returns.
        let claimed = Arc::clone(&semaphore).try_acquire_owned().ok();
        tokio::spawn(async move {
            let _permit = match claimed {
                Some(permit) => permit,
                None => match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::error!("in-process queue semaphore is closed; dropping job");
                        return;
                    }
                },
            };
            fut.await;
        })
    }
}
