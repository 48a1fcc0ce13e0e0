//! RTC deep sleep.

use brewnode_core::SleepControl;
use esp_hal::peripherals::LPWR;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;

/// Deep sleep with a timer wake-up. The chip resets on wake, so
/// [`SleepControl::sleep_for`] never returns.
pub struct DeepSleep<'d> {
    rtc: Rtc<'d>,
}

impl<'d> DeepSleep<'d> {
    pub fn new(lpwr: LPWR<'d>) -> Self {
        Self { rtc: Rtc::new(lpwr) }
    }
}

impl DeepSleep<'static> {
    /// Take the RTC without owning its peripheral, for the panic path.
    ///
    /// # Safety
    ///
    /// Nothing else may drive the RTC afterwards. Only call this on the
    /// way into deep sleep.
    pub unsafe fn steal() -> Self {
        Self::new(unsafe { LPWR::steal() })
    }
}

impl SleepControl for DeepSleep<'_> {
    fn sleep_for(&mut self, duration_us: u64) {
        let timer = TimerWakeupSource::new(core::time::Duration::from_micros(duration_us));
        self.rtc.sleep_deep(&[&timer]);
    }
}
