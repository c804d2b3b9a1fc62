//! Fire-and-forget work that shutdown still waits for.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

/// Tracks in-flight background tasks. Clones share one counter.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            in_flight: Arc::new(tx),
        }
    }

    /// Runs `task` on the runtime. A panic inside it is logged and never
    /// reaches the caller; the counter is released either way.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.send_modify(|n| *n += 1);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                error!(task = name, panic = %panic_message(&*panic), "Background task panicked");
            }
            in_flight.send_modify(|n| *n -= 1);
        });
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Resolves once no background task is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time;

    #[tokio::test]
    async fn test_wait_idle_with_nothing_running() {
        let tasks = BackgroundTasks::new();
        time::timeout(Duration::from_millis(50), tasks.wait_idle())
            .await
            .expect("idle tracker resolves immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_idle_waits_for_completion() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicBool::new(false));

        let flag = done.clone();
        tasks.spawn("slow", async move {
            time::sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(tasks.in_flight(), 1);

        tasks.wait_idle().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained_and_released() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("boom", async {
            panic!("smtp exploded");
        });

        time::timeout(Duration::from_secs(1), tasks.wait_idle())
            .await
            .expect("counter released after panic");
        assert_eq!(tasks.in_flight(), 0);
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*panic), "static");
        let panic: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*panic), "owned");
        let panic: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*panic), "unknown panic");
    }
}
