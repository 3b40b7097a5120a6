//! Executor implementations.

use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::domain::Task;
use crate::ports::{ExecFailure, Executor};

/// Work unit that sleeps for a random duration and succeeds.
///
/// Stands in for real task execution the same way the service it fronts
/// would: the engine only sees "ran for a while, then finished".
pub struct SimulatedExecutor {
    unit: Duration,
    units: RangeInclusive<u64>,
}

impl SimulatedExecutor {
    /// 1-5 seconds per task, the production default.
    pub fn new() -> Self {
        Self::with_unit(Duration::from_secs(1), 1..=5)
    }

    /// Scale the base unit (tests use milliseconds).
    pub fn with_unit(unit: Duration, units: RangeInclusive<u64>) -> Self {
        Self { unit, units }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, _task: &Task) -> Result<(), ExecFailure> {
        let units = rand::thread_rng().gen_range(self.units.clone());
        tokio::time::sleep(self.unit * units as u32).await;
        Ok(())
    }
}

/// Executor that completes immediately. Useful when only the state protocol
/// is under test.
pub struct NoopExecutor;

#[async_trait]
impl Executor for NoopExecutor {
    async fn execute(&self, _task: &Task) -> Result<(), ExecFailure> {
        Ok(())
    }
}
