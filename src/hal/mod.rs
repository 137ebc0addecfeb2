//! # Hardware Seams
//!
//! Pins and busy-wait delays come from `embedded-hal`
//! ([`OutputPin`](embedded_hal::digital::OutputPin),
//! [`InputPin`](embedded_hal::digital::InputPin),
//! [`DelayNs`](embedded_hal::delay::DelayNs)). `embedded-hal` has no
//! free-running clock, so the microsecond counter is the [`MicrosClock`]
//! trait defined here.
//!
//! [`sim`] provides a virtual-time wire implementing all four seams, used to
//! exercise the link on a host.

pub mod sim;

/// Free-running microsecond counter
///
/// The counter wraps at `u32::MAX`. Callers measure elapsed time with
/// `now.wrapping_sub(earlier)`, which stays correct across the wrap as long
/// as the interval is shorter than about 71 minutes.
#[cfg_attr(test, mockall::automock)]
pub trait MicrosClock {
    /// Current counter value in microseconds
    fn now_us(&mut self) -> u32;
}

impl<C: MicrosClock + ?Sized> MicrosClock for &mut C {
    fn now_us(&mut self) -> u32 {
        (**self).now_us()
    }
}

/// Microseconds elapsed since `earlier`, modulo 2^32
#[inline]
pub fn elapsed_us(now: u32, earlier: u32) -> u32 {
    now.wrapping_sub(earlier)
}
