// src/sys/poller.rs
//
// Bounded fixed-interval polling against an eventually-consistent control plane.
// Used for network-rule propagation and for read-after-write availability.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::sys::signals::InterruptSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    /// 5s interval, 300s timeout: 60 attempts.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    /// ⌈timeout / interval⌉, and never less than one probe.
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let timeout = self.timeout.as_millis();
        let attempts = timeout.div_ceil(interval).max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Succeeded(T),
    /// The probe never succeeded within the policy. Callers decide if fatal.
    TimedOut { attempts: u32 },
    /// Process interruption was observed between attempts.
    Interrupted { attempts: u32 },
}

pub struct PropagationPoller {
    policy: PollPolicy,
    interrupt: Option<InterruptSignal>,
}

impl PropagationPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy, interrupt: None }
    }

    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Polls a yes/no probe. A probe error counts as "not yet visible".
    pub async fn poll<F, Fut>(&self, label: &str, mut probe: F) -> PollOutcome<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, String>>,
    {
        self.poll_for(label, || {
            let pending = probe();
            async move {
                match pending.await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err("not yet visible".to_string()),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Polls a probe that yields a value once the remote side is ready.
    pub async fn poll_for<T, F, Fut>(&self, label: &str, probe: F) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let timeout_secs = self.policy.timeout.as_secs_f64();
        self.poll_for_with_progress(label, probe, |fraction| {
            info!(
                "⏳ Waiting for {}: {:.0}% of {:.0}s window",
                label,
                fraction * 100.0,
                timeout_secs
            );
        })
        .await
    }

    /// Same as `poll_for`, reporting `elapsed / timeout` after every failed probe.
    pub async fn poll_for_with_progress<T, F, Fut, P>(
        &self,
        label: &str,
        mut probe: F,
        mut on_progress: P,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, String>>,
        P: FnMut(f64),
    {
        let max_attempts = self.policy.max_attempts();
        let timeout = self.policy.timeout.as_secs_f64().max(f64::EPSILON);

        for attempt in 1..=max_attempts {
            if self.interrupted() {
                return PollOutcome::Interrupted { attempts: attempt - 1 };
            }

            match probe().await {
                Ok(value) => return PollOutcome::Succeeded(value),
                Err(reason) => debug!(label, attempt, %reason, "probe not satisfied"),
            }

            let elapsed = self.policy.interval.as_secs_f64() * f64::from(attempt);
            on_progress((elapsed / timeout).min(1.0));

            if attempt < max_attempts && !self.wait_interval().await {
                return PollOutcome::Interrupted { attempts: attempt };
            }
        }

        PollOutcome::TimedOut { attempts: max_attempts }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(InterruptSignal::is_raised)
    }

    /// Sleeps one interval. Returns false if cut short by an interrupt.
    async fn wait_interval(&self) -> bool {
        match &self.interrupt {
            None => {
                tokio::time::sleep(self.policy.interval).await;
                true
            }
            Some(interrupt) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.interval) => true,
                    _ = interrupt.raised() => false,
                }
            }
        }
    }
}
