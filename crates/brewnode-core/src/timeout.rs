//! Bounded waits for bus and network I/O.
//!
//! Every wait inside a wake cycle goes through [`with_timeout`], which races
//! the operation against an async delay. The delay is whatever the platform
//! provides (`embassy_time::Delay` on the device, a virtual clock in tests),
//! so the bound holds regardless of the executor.

use embassy_futures::select::{Either, select};
use embedded_hal_async::delay::DelayNs;

/// The operation did not complete before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

/// Run `fut` to completion unless `timeout_ms` elapses first.
///
/// The operation is polled before the delay, so an operation that is ready
/// immediately always wins.
pub async fn with_timeout<D, F>(delay: &mut D, timeout_ms: u32, fut: F) -> Result<F::Output, Elapsed>
where
    D: DelayNs,
    F: Future,
{
    match select(fut, delay.delay_ms(timeout_ms)).await {
        Either::First(output) => Ok(output),
        Either::Second(()) => Err(Elapsed),
    }
}
