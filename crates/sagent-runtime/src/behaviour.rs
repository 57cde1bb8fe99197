use async_trait::async_trait;
use sagent_core::Result;
use std::time::Duration;
use tokio::time::Instant;

use crate::context::AgentContext;

/// Time-based guard shared by every behaviour: due once `period` has passed
/// since the last successful run.
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Duration,
    last_run_at: Instant,
}

impl Cooldown {
    /// Starts counting from now, so the first run happens one period after
    /// construction.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_run_at: Instant::now(),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_run_at(&self) -> Instant {
        self.last_run_at
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_run_at) >= self.period
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_run_at = now;
    }
}

/// A periodic unit of agent work.
///
/// `run` is the scheduler's entry point: it checks `guard`, runs `logic` and
/// restarts the cooldown only if `logic` succeeded.
#[async_trait]
pub trait Behaviour: Send + Sync {
    fn name(&self) -> &str;

    fn cooldown(&self) -> &Cooldown;

    fn cooldown_mut(&mut self) -> &mut Cooldown;

    fn guard(&self) -> bool {
        self.cooldown().is_due(Instant::now())
    }

    async fn logic(&mut self, ctx: &AgentContext) -> Result<()>;

    /// Returns whether `logic` ran.
    async fn run(&mut self, ctx: &AgentContext) -> Result<bool> {
        if !self.guard() {
            return Ok(false);
        }
        self.logic(ctx).await?;
        self.cooldown_mut().mark(Instant::now());
        Ok(true)
    }
}
