use std::sync::Arc;

/// Token semaphore that is a no-op when configured with a value of `0`.
#[derive(Debug, Clone, Default)]
pub struct Semaphore {
    sem: Option<Arc<tokio::sync::Semaphore>>,
}

impl Semaphore {
    pub fn new(value: usize) -> Self {
        if value == 0 {
            return Self { sem: None };
        }
        Self {
            sem: Some(Arc::new(tokio::sync::Semaphore::new(value))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sem.is_some()
    }

    pub fn available(&self) -> Option<usize> {
        self.sem.as_ref().map(|sem| sem.available_permits())
    }

    /// Returns a permit that is released back when dropped.
    pub async fn acquire(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        match &self.sem {
            // the semaphore is never closed so acquire can only fail if that changes
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        }
    }

    /// Takes a token without giving it back; tokens are only returned by replenishment.
    pub async fn consume(&self) {
        if let Some(sem) = &self.sem {
            if let Ok(permit) = sem.acquire().await {
                permit.forget();
            }
        }
    }

    pub async fn run_replenish_thread(&self, replenish: usize, interval: std::time::Duration) {
        let Some(sem) = &self.sem else {
            return;
        };
        loop {
            tokio::time::sleep(interval).await;
            let curr_permits = sem.available_permits();
            if curr_permits >= replenish {
                continue;
            }
            sem.add_permits(replenish - curr_permits);
        }
    }
}
