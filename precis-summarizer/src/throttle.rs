//! Process-wide spacing and cooldown gate in front of the completion service.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);
/// Cooldown used when a reported penalty does not fit on the clock.
const MAX_COOLDOWN: Duration = Duration::from_secs(365 * 24 * 3600);

/// Returned by [`ThrottleGuard::acquire`] while the upstream is cooling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("upstream cooling down for another {}s", whole_secs(.retry_after))]
pub struct Cooling {
    pub retry_after: Duration,
}

/// Seconds, rounded up, so a sub-second remainder never reads as zero.
pub(crate) fn whole_secs(d: &Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStatus {
    pub available: bool,
    /// Whole seconds until calls are admitted again, rounded up.
    pub cooldown_remaining: u64,
}

#[derive(Debug)]
struct ThrottleState {
    last_call_at: Option<Instant>,
    min_interval: Duration,
    cooldown_until: Option<Instant>,
}

/// Minimum spacing plus overload cooldown for upstream calls.
///
/// One instance per process, shared by `Arc` between the synchronous path and
/// the workers. Callers queue on `gate` so exactly one `acquire` is granted at a
/// time; the state itself only changes through [`acquire`](Self::acquire) and
/// [`report_overload`](Self::report_overload).
#[derive(Debug)]
pub struct ThrottleGuard {
    gate: tokio::sync::Mutex<()>,
    state: Mutex<ThrottleState>,
    default_cooldown: Duration,
}

impl Default for ThrottleGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL, DEFAULT_COOLDOWN)
    }
}

impl ThrottleGuard {
    pub fn new(min_interval: Duration, default_cooldown: Duration) -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(ThrottleState {
                last_call_at: None,
                min_interval,
                cooldown_until: None,
            }),
            default_cooldown,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for permission to call upstream.
    ///
    /// Fails fast with [`Cooling`] during a cooldown, including one reported
    /// while this caller was waiting out the spacing interval.
    pub async fn acquire(&self) -> Result<(), Cooling> {
        let _turn = self.gate.lock().await;
        loop {
            let wait = {
                let mut state = self.lock_state();
                let now = Instant::now();
                if let Some(until) = state.cooldown_until {
                    if until > now {
                        return Err(Cooling {
                            retry_after: until - now,
                        });
                    }
                    state.cooldown_until = None;
                }
                match state.last_call_at {
                    Some(last) if last + state.min_interval > now => {
                        last + state.min_interval - now
                    }
                    _ => {
                        state.last_call_at = Some(now);
                        return Ok(());
                    }
                }
            };
            tracing::debug!(wait_ms = wait.as_millis() as u64, "spacing upstream call");
            tokio::time::sleep(wait).await;
        }
    }

    /// Record an overload signal. The cooldown window only ever grows.
    ///
    /// Returns the cooldown now in force.
    pub fn report_overload(&self, retry_after: Option<Duration>) -> Duration {
        let penalty = retry_after.unwrap_or(self.default_cooldown);
        let mut state = self.lock_state();
        let now = Instant::now();
        let proposed = now
            .checked_add(penalty)
            .unwrap_or_else(|| now + MAX_COOLDOWN);
        let until = match state.cooldown_until {
            Some(current) if current >= proposed => current,
            _ => proposed,
        };
        state.cooldown_until = Some(until);
        let remaining = until - now;
        tracing::warn!(
            retry_after_secs = whole_secs(&remaining),
            "upstream overloaded, cooling down"
        );
        remaining
    }

    /// Time left in the current cooldown, if any.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let state = self.lock_state();
        let now = Instant::now();
        state
            .cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn status(&self) -> ThrottleStatus {
        match self.cooldown_remaining() {
            Some(remaining) => ThrottleStatus {
                available: false,
                cooldown_remaining: whole_secs(&remaining),
            },
            None => ThrottleStatus {
                available: true,
                cooldown_remaining: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn guard() -> ThrottleGuard {
        ThrottleGuard::new(Duration::from_secs(2), Duration::from_secs(120))
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_then_spaced() {
        let g = guard();
        let start = Instant::now();
        g.acquire().await.unwrap();
        assert_eq!(Instant::now(), start);

        g.acquire().await.unwrap();
        assert!(Instant::now() - start >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        let g = Arc::new(guard());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let g = g.clone();
            handles.push(tokio::spawn(async move {
                g.acquire().await.unwrap();
                Instant::now()
            }));
        }
        let mut grants = Vec::new();
        for h in handles {
            grants.push(h.await.unwrap());
        }
        grants.sort();
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overload_fails_fast_for_the_whole_window() {
        let g = guard();
        g.report_overload(Some(Duration::from_secs(60)));

        let err = g.acquire().await.unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(60));
        assert_eq!(g.status().cooldown_remaining, 60);
        assert!(!g.status().available);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(g.acquire().await.is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(g.acquire().await.is_ok());
        assert!(g.status().available);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_only_extends() {
        let g = guard();
        g.report_overload(Some(Duration::from_secs(60)));
        let remaining = g.report_overload(Some(Duration::from_secs(10)));
        assert_eq!(remaining, Duration::from_secs(60));

        g.report_overload(None);
        assert_eq!(g.cooldown_remaining(), Some(Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn overload_during_spacing_wait_fails_the_waiter() {
        let g = Arc::new(guard());
        g.acquire().await.unwrap();

        let waiter = {
            let g = g.clone();
            tokio::spawn(async move { g.acquire().await })
        };
        // let the waiter reach its spacing sleep
        tokio::task::yield_now().await;
        g.report_overload(Some(Duration::from_secs(30)));

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.retry_after <= Duration::from_secs(30));
        assert!(err.retry_after >= Duration::from_secs(28));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_penalty_still_yields_a_cooldown() {
        let g = guard();
        let remaining = g.report_overload(Some(Duration::from_secs(u64::MAX)));
        assert!(remaining >= Duration::from_secs(3600));
        assert!(!g.status().available);
        assert!(g.acquire().await.is_err());

        // a later overflowing report keeps the window it already has
        assert_eq!(g.report_overload(Some(Duration::MAX)), remaining);
    }

    #[test]
    fn whole_secs_rounds_up() {
        assert_eq!(whole_secs(&Duration::from_millis(1)), 1);
        assert_eq!(whole_secs(&Duration::from_secs(3)), 3);
        assert_eq!(whole_secs(&Duration::from_millis(2500)), 3);
    }
}
