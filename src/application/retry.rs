//! Bounded poll-until-ready primitive.
//!
//! Used by the launcher to wait for an externally started simulator to become
//! reachable before wiring the serial proxy.  The probe is an idempotent async
//! boolean check; a timeout is a normal `false` outcome, never an error.
//!
//! The loop is explicit and the sleep function injectable
//! ([`retry_with_sleep`]) so tests can substitute the timing source and bound
//! the iteration count without real wall-clock delay.

use std::future::Future;
use std::time::Duration;

/// Repeatedly invokes `probe` until it returns `true` or the budget runs out.
///
/// After each failed probe the poller sleeps `interval`, increments its
/// attempt counter, and gives up once `attempt_count * interval > timeout`.
/// The budget is counted in attempts, not measured wall-clock time: probe
/// execution time is not included.  This matches the behaviour callers have
/// historically relied on; see `retry_with_sleep` for the exact loop.
///
/// `interval` must be nonzero: with a zero interval the product never exceeds
/// the timeout and the loop polls until the probe succeeds.
///
/// Probes never overlap — the next probe starts only after the previous one
/// completed and the interval elapsed.
pub async fn retry<P, F>(probe: P, interval: Duration, timeout: Duration) -> bool
where
    P: FnMut() -> F,
    F: Future<Output = bool>,
{
    retry_with_sleep(probe, interval, timeout, tokio::time::sleep).await
}

/// [`retry`] with an injectable sleep function.
///
/// `sleep` is invoked with `interval` between attempts; production code passes
/// `tokio::time::sleep`, tests pass a counting or instantaneous substitute.
pub async fn retry_with_sleep<P, F, S, SF>(
    mut probe: P,
    interval: Duration,
    timeout: Duration,
    mut sleep: S,
) -> bool
where
    P: FnMut() -> F,
    F: Future<Output = bool>,
    S: FnMut(Duration) -> SF,
    SF: Future<Output = ()>,
{
    let mut attempts: u32 = 0;

    loop {
        if probe().await {
            return true;
        }

        sleep(interval).await;
        attempts += 1;

        // Attempt-count budget, not elapsed time: probe duration is ignored.
        if u128::from(attempts) * interval.as_millis() > timeout.as_millis() {
            return false;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
