//! PC speaker driven by PIT channel 2.

use std::sync::Arc;

use core_types::DeviceType;
use hal_x86_64::{sleep_clock, PortIo, SleepClock};
use services_device_manager::{
    Capability, DeviceError, DeviceHandle, DeviceRegistry, SpeakerCapability,
};

use crate::hooks::DriverHooks;
use crate::pit::{lock_pit, SharedPit};

pub const DESCRIPTION: &str = "PC Speaker";

/// Speaker gate port
pub const SPEAKER_PORT: u16 = 0x61;

pub struct Speaker<P: PortIo + Send> {
    pit: SharedPit<P>,
    clock: &'static SleepClock,
}

impl<P: PortIo + Send> Speaker<P> {
    pub fn new(pit: SharedPit<P>) -> Self {
        Self::with_clock(pit, sleep_clock())
    }

    /// Times tones on `clock` instead of the process-wide sleep clock.
    pub fn with_clock(pit: SharedPit<P>, clock: &'static SleepClock) -> Self {
        Self { pit, clock }
    }
}

impl<P: PortIo + Send> SpeakerCapability for Speaker<P> {
    /// Busy-waits one sleep tick per millisecond. The PIT lock is not held
    /// while waiting.
    fn beep(&self, frequency_hz: u32, duration_ms: u32) {
        lock_pit(&self.pit).start_tone(frequency_hz);
        self.clock.wait(u64::from(duration_ms));
        lock_pit(&self.pit).stop_tone();
    }
}

pub fn attach_speaker<P: PortIo + Send + 'static>(
    registry: &mut DeviceRegistry,
    speaker: Speaker<P>,
) -> Result<DeviceHandle, DeviceError> {
    let builder = registry
        .new_device()
        .device_type(DeviceType::Speaker)
        .description(DESCRIPTION)
        .capability(Capability::Speaker(Arc::new(speaker)))
        .hooks(Arc::new(DriverHooks::at_port(SPEAKER_PORT)));
    registry.register_device(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use hal_x86_64::FakePortIo;
    use services_device_manager::RegistryConfig;

    use crate::pit::shared_pit;

    #[test]
    fn test_zero_length_beep_opens_and_closes_gate() {
        static CLOCK: SleepClock = SleepClock::new();

        let mut io = FakePortIo::new();
        io.script_reads(&[(0x61, 0x00), (0x61, 0x03)]);
        let pit = shared_pit(io);
        let mut registry = DeviceRegistry::new(RegistryConfig::default());
        let handle =
            attach_speaker(&mut registry, Speaker::with_clock(pit.clone(), &CLOCK)).unwrap();
        assert_eq!(registry.name(handle), Some("speaker0"));

        registry.speaker(handle).unwrap().beep(4000, 0);

        let pit = lock_pit(&pit);
        assert_eq!(
            pit.port_io().byte_writes(),
            vec![
                (0x43, 0xB6),
                (0x42, 0x2A),
                (0x42, 0x01),
                (0x61, 0x03),
                (0x61, 0x00)
            ]
        );
        assert_eq!(pit.tone_hz(), None);
    }

    #[test]
    fn test_beep_waits_for_ticks() {
        static CLOCK: SleepClock = SleepClock::new();

        let mut io = FakePortIo::new();
        io.script_reads(&[(0x61, 0x00), (0x61, 0x03)]);
        let pit = shared_pit(io);
        let speaker = Speaker::with_clock(pit.clone(), &CLOCK);

        let done = Arc::new(AtomicBool::new(false));
        let ticking = Arc::clone(&done);
        let ticker = thread::spawn(move || {
            while !ticking.load(Ordering::Acquire) {
                CLOCK.tick();
                thread::yield_now();
            }
        });
        speaker.beep(440, 5);
        done.store(true, Ordering::Release);
        ticker.join().unwrap();

        assert!(CLOCK.ticks() >= 5);
        assert_eq!(lock_pit(&pit).port_io().remaining_reads(), 0);
    }
}
