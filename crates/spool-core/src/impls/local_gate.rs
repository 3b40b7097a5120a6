//! Process-local TokenGate.
//!
//! A mutex-guarded counter. The critical section is the counter update and
//! nothing else; callers never block beyond it.

use tokio::sync::Mutex;

use async_trait::async_trait;

use crate::domain::SpoolError;
use crate::ports::TokenGate;

struct GateState {
    available: usize,
    capacity: usize,
}

pub struct LocalTokenGate {
    state: Mutex<GateState>,
}

impl LocalTokenGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                available: capacity,
                capacity,
            }),
        }
    }

    /// Currently available permits (observability only).
    pub async fn available(&self) -> usize {
        self.state.lock().await.available
    }
}

#[async_trait]
impl TokenGate for LocalTokenGate {
    async fn acquire(&self) -> Result<(), SpoolError> {
        let mut state = self.state.lock().await;
        if state.available == 0 {
            return Err(SpoolError::QueueSaturated);
        }
        state.available -= 1;
        Ok(())
    }

    async fn release(&self) {
        let mut state = self.state.lock().await;
        // Clamped: releases without a matching observed acquire (recovered
        // tasks, compensation paths) must not grow the pool past capacity.
        state.available = (state.available + 1).min(state.capacity);
    }

    async fn initialize(&self, capacity: usize) {
        let mut state = self.state.lock().await;
        state.available = capacity;
        state.capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn acquire_drains_to_zero_then_saturates() {
        let gate = LocalTokenGate::new(2);
        gate.acquire().await.unwrap();
        gate.acquire().await.unwrap();
        assert!(matches!(
            gate.acquire().await,
            Err(SpoolError::QueueSaturated)
        ));
    }

    #[tokio::test]
    async fn release_restores_a_permit() {
        let gate = LocalTokenGate::new(1);
        gate.acquire().await.unwrap();
        gate.release().await;
        gate.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn release_never_exceeds_capacity() {
        let gate = LocalTokenGate::new(1);
        gate.release().await;
        gate.release().await;
        assert_eq!(gate.available().await, 1);
    }

    #[tokio::test]
    async fn initialize_resets_both_counters() {
        let gate = LocalTokenGate::new(1);
        gate.initialize(3).await;
        assert_eq!(gate.available().await, 3);
        gate.acquire().await.unwrap();
        gate.acquire().await.unwrap();
        gate.acquire().await.unwrap();
        assert!(gate.acquire().await.is_err());
    }

    #[tokio::test]
    async fn concurrent_acquires_never_oversubscribe() {
        let gate = Arc::new(LocalTokenGate::new(10));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.acquire().await.is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
    }
}
