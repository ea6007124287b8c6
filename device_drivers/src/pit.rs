//! 8254 PIT channel 0 as a counting timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use core_types::DeviceType;
use hal::InterruptHal;
use hal_x86_64::{Pit, PortIo};
use services_device_manager::{
    Capability, DeviceError, DeviceHandle, DeviceRegistry, PitCapability,
};

use crate::config::PitConfig;
use crate::hooks::DriverHooks;

pub const DESCRIPTION: &str = "8253/8254 PIT";

/// One PIT shared by the timer (channel 0) and the speaker (channel 2).
pub type SharedPit<P> = Arc<Mutex<Pit<P>>>;

pub fn shared_pit<P: PortIo>(port_io: P) -> SharedPit<P> {
    Arc::new(Mutex::new(Pit::new(port_io)))
}

pub(crate) fn lock_pit<P: PortIo>(pit: &SharedPit<P>) -> std::sync::MutexGuard<'_, Pit<P>> {
    pit.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PitTimer<P: PortIo + Send> {
    pit: SharedPit<P>,
    ticks: AtomicU64,
    frequency_hz: u32,
}

impl<P: PortIo + Send> PitTimer<P> {
    /// Programs channel 0 for `frequency_hz`.
    pub fn new(pit: SharedPit<P>, frequency_hz: u32) -> Self {
        lock_pit(&pit).set_frequency(frequency_hz);
        Self {
            pit,
            ticks: AtomicU64::new(0),
            frequency_hz,
        }
    }

    pub fn pit(&self) -> &SharedPit<P> {
        &self.pit
    }

    pub fn handle_irq(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }
}

impl<P: PortIo + Send> PitCapability for PitTimer<P> {
    fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }
}

/// Programs the PIT, registers it and installs its tick handler.
pub fn attach_pit<P: PortIo + Send + 'static>(
    registry: &mut DeviceRegistry,
    pit: SharedPit<P>,
    config: &PitConfig,
    interrupts: &mut dyn InterruptHal,
) -> Result<DeviceHandle, DeviceError> {
    let timer = Arc::new(PitTimer::new(pit, config.frequency_hz));
    let builder = registry
        .new_device()
        .device_type(DeviceType::Pit)
        .description(DESCRIPTION)
        .capability(Capability::Pit(timer.clone()))
        .hooks(Arc::new(DriverHooks::at_irq(config.irq_line)));
    let handle = registry.register_device(builder)?;

    if let Err(err) = interrupts.register_handler(
        config.irq_line,
        Box::new(move || timer.handle_irq()),
    ) {
        let name = registry.name(handle).unwrap_or_default().to_string();
        registry.unregister_device(handle)?;
        return Err(DeviceError::InitFailed {
            name,
            reason: err.to_string(),
        });
    }
    Ok(handle)
}
