use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub const MAX_WORKERS: usize = 20;

#[derive(Debug)]
pub struct Buckets<T> {
    pub selectable: Vec<T>,
    pub unselectable: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            selectable: Vec::new(),
            unselectable: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum Outcome<T> {
    Selectable(T),
    Unselectable(T),
    Skip,
}

// The queue is filled and closed before any worker starts.
pub async fn fetch_all<I, T, F, Fut>(inputs: Vec<I>, cap: usize, work: F) -> Buckets<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
{
    let total = inputs.len();
    if total == 0 {
        return Buckets::default();
    }
    let workers = cap.max(1).min(total);

    let (tx, rx) = mpsc::channel(total);
    for input in inputs {
        if tx.send(input).await.is_err() {
            break;
        }
    }
    drop(tx);

    let rx = Arc::new(AsyncMutex::new(rx));
    let results = Arc::new(Mutex::new(Buckets::default()));
    let work = Arc::new(work);

    let mut tasks = JoinSet::new();
    for worker in 0..workers {
        let rx = Arc::clone(&rx);
        let results = Arc::clone(&results);
        let work = Arc::clone(&work);
        tasks.spawn(async move {
            loop {
                let next = rx.lock().await.recv().await;
                let Some(input) = next else {
                    break;
                };
                let outcome = work(input).await;
                {
                    let mut buckets = results.lock().unwrap_or_else(PoisonError::into_inner);
                    match outcome {
                        Outcome::Selectable(value) => buckets.selectable.push(value),
                        Outcome::Unselectable(value) => buckets.unselectable.push(value),
                        Outcome::Skip => {}
                    }
                }
            }
            debug!(worker, "fetch worker drained");
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = joined {
            warn!("fetch worker failed: {error}");
        }
    }

    let mut buckets = results.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *buckets)
}
