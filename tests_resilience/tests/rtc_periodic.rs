//! RTC Periodic Event Tests
//!
//! Tear-safe clock reads and the subscriber path from IRQ 8 through the
//! interrupt router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use device_drivers::rtc::{
    REGISTER_CENTURY, REGISTER_HOUR, REGISTER_MINUTE, REGISTER_MONTH, REGISTER_MONTHDAY,
    REGISTER_SECOND, REGISTER_YEAR,
};
use device_drivers::{attach_rtc, Rtc, RtcConfig};
use hal_x86_64::{FakeCmos, IrqError, IrqLine, SleepClock};
use services_device_manager::RtcTime;
use tests_resilience::test_bootstrap;

fn new_years_eve() -> FakeCmos {
    let mut cmos = FakeCmos::new();
    cmos.set(REGISTER_SECOND, 0x59);
    cmos.set(REGISTER_MINUTE, 0x59);
    cmos.set(REGISTER_HOUR, 0x23);
    cmos.set(REGISTER_MONTHDAY, 0x31);
    cmos.set(REGISTER_MONTH, 0x12);
    cmos.set(REGISTER_YEAR, 0x99);
    cmos.set(REGISTER_CENTURY, 0x19);
    cmos
}

#[test]
fn test_torn_read_across_century_rollover() {
    let mut cmos = new_years_eve();
    // Rollover lands between the first sample's year and century reads
    for (register, value) in [
        (REGISTER_SECOND, 0x00),
        (REGISTER_MINUTE, 0x00),
        (REGISTER_HOUR, 0x00),
        (REGISTER_MONTHDAY, 0x01),
        (REGISTER_MONTH, 0x01),
        (REGISTER_YEAR, 0x00),
        (REGISTER_CENTURY, 0x20),
    ] {
        cmos.schedule_update(7, register, value);
    }
    let (mut registry, mut interrupts) = test_bootstrap();
    let handle = attach_rtc(
        &mut registry,
        Rtc::new(cmos, &RtcConfig::default()),
        &mut interrupts,
    )
    .unwrap();

    let time = registry.rtc(handle).unwrap().read_time();
    assert_eq!(
        time,
        RtcTime {
            second: 0,
            minute: 0,
            hour: 0,
            weekday: 0,
            monthday: 0x01,
            month: 0x01,
            year: 0x00,
            century: 0x20,
        }
    );
}

#[test]
fn test_subscribers_run_on_every_rtc_interrupt() {
    static CLOCK: SleepClock = SleepClock::new();

    let (mut registry, mut interrupts) = test_bootstrap();
    let rtc = Rtc::with_clock(new_years_eve(), &RtcConfig::default(), &CLOCK);
    let handle = attach_rtc(&mut registry, rtc, &mut interrupts).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry.rtc(handle).unwrap().subscribe(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    for _ in 0..4 {
        interrupts.dispatch_irq(IrqLine::Rtc.line()).unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(CLOCK.ticks(), 4);
    assert_eq!(interrupts.pic_ack_count(), 4);
    assert!(CLOCK.elapsed_since(0, 4));
}

#[test]
fn test_other_lines_do_not_reach_rtc() {
    let (mut registry, mut interrupts) = test_bootstrap();
    attach_rtc(
        &mut registry,
        Rtc::new(new_years_eve(), &RtcConfig::default()),
        &mut interrupts,
    )
    .unwrap();

    assert_eq!(interrupts.dispatch_irq(0), Err(IrqError::HandlerMissing(0)));
}
