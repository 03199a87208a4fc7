//! Bounded polling used for tooling and dev-server readiness.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Interval between tooling status checks.
pub const TOOLING_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ceiling for tooling status checks before the install fallback.
pub const TOOLING_POLL_CEILING: Duration = Duration::from_secs(10);

/// Outcome of [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A probe succeeded.
    Ready {
        /// Value returned by the successful probe.
        value: T,
        /// Number of probes issued.
        attempts: u32,
    },
    /// The ceiling elapsed without success.
    Exhausted {
        /// Value returned by the last probe, if any.
        last: Option<T>,
        /// Number of probes issued.
        attempts: u32,
    },
}

/// Run `probe` every `interval` until it reports ready or `ceiling` elapses.
///
/// The probe returns `(ready, value)`. The first probe runs immediately and
/// the loop never sleeps past the ceiling. Errors from the probe abort the
/// loop.
pub async fn poll_until<T, E, F, Fut>(
    interval: Duration,
    ceiling: Duration,
    mut probe: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(bool, T), E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let (ready, value) = probe().await?;
        if ready {
            tracing::debug!(
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Probe ready"
            );
            return Ok(PollOutcome::Ready { value, attempts });
        }

        let elapsed = start.elapsed();
        if elapsed >= ceiling {
            tracing::debug!(attempts, elapsed_ms = elapsed.as_millis() as u64, "Probe ceiling reached");
            return Ok(PollOutcome::Exhausted {
                last: Some(value),
                attempts,
            });
        }
        tracing::trace!(attempt = attempts, "Probe not ready, retrying...");
        tokio::time::sleep(interval.min(ceiling - elapsed)).await;
    }
}
