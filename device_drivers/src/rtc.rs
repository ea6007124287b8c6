//! CMOS real-time clock and periodic tick source.
//!
//! The RTC is the kernel's only periodic event: its interrupt runs every
//! subscriber in subscription order, advances the sleep clock, and then
//! reads status register C so the chip raises the next interrupt.
//!
//! The interrupt handler never blocks. It only `try_lock`s the registers and
//! the subscriber list. When a tick lands while thread context holds the
//! registers, the status C read is deferred to the moment they are released.
//! When it lands while the subscriber list is being extended, that tick's
//! subscriber round is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};

use core_types::DeviceType;
use hal::{InterruptError, InterruptHal};
use hal_x86_64::cmos::CMOS_NMI_DISABLE;
use hal_x86_64::{sleep_clock, CmosRegisters, SleepClock};
use services_device_manager::{
    Capability, DeviceError, DeviceHandle, DeviceInfo, DeviceLifecycle, DeviceRegistry,
    RtcCallback, RtcCapability, RtcTime,
};

use crate::config::RtcConfig;
use crate::hooks::announce;

pub const DESCRIPTION: &str = "RTC";

pub const REGISTER_SECOND: u8 = 0x00;
pub const REGISTER_MINUTE: u8 = 0x02;
pub const REGISTER_HOUR: u8 = 0x04;
pub const REGISTER_WEEKDAY: u8 = 0x06;
pub const REGISTER_MONTHDAY: u8 = 0x07;
pub const REGISTER_MONTH: u8 = 0x08;
pub const REGISTER_YEAR: u8 = 0x09;
pub const REGISTER_STATUS_A: u8 = 0x0A;
pub const REGISTER_STATUS_B: u8 = 0x0B;
pub const REGISTER_STATUS_C: u8 = 0x0C;
pub const REGISTER_CENTURY: u8 = 0x32;

/// Status B bit enabling the periodic interrupt
pub const PERIODIC_INTERRUPT_ENABLE: u8 = 0x40;

/// RTC driver state.
pub struct Rtc<C: CmosRegisters + Send> {
    cmos: Mutex<C>,
    subscribers: OnceLock<Mutex<Vec<RtcCallback>>>,
    clock: &'static SleepClock,
    irq_line: u8,
    ack_pending: AtomicBool,
}

/// Non-blocking lock for interrupt context; `None` if the lock is held.
fn try_lock_in_irq<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

impl<C: CmosRegisters + Send> Rtc<C> {
    pub fn new(cmos: C, config: &RtcConfig) -> Self {
        Self::with_clock(cmos, config, sleep_clock())
    }

    /// Uses `clock` instead of the process-wide sleep clock.
    pub fn with_clock(cmos: C, config: &RtcConfig, clock: &'static SleepClock) -> Self {
        Self {
            cmos: Mutex::new(cmos),
            subscribers: OnceLock::new(),
            clock,
            irq_line: config.irq_line,
            ack_pending: AtomicBool::new(false),
        }
    }

    pub fn irq_line(&self) -> u8 {
        self.irq_line
    }

    /// Runs `f` with the CMOS registers held, then performs any status C
    /// read an interrupt deferred meanwhile.
    pub fn with_cmos<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let result = {
            let mut cmos = self.cmos.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut cmos)
        };
        if self.ack_pending.swap(false, Ordering::AcqRel) {
            self.acknowledge();
        }
        result
    }

    /// Reads status C, or leaves it to the current holder of the registers.
    fn acknowledge(&self) {
        match try_lock_in_irq(&self.cmos) {
            Some(mut cmos) => {
                cmos.read_register(REGISTER_STATUS_C);
            }
            None => self.ack_pending.store(true, Ordering::Release),
        }
    }

    /// Creates the subscriber list. Later calls leave it untouched.
    pub fn init_subscribers(&self) {
        self.subscribers.get_or_init(|| Mutex::new(Vec::new()));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.get().map_or(0, |list| {
            list.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    /// Turns on the periodic interrupt in status register B.
    ///
    /// Interrupts stay disabled from the first select until the write lands;
    /// reading the data port moves the selection, so B is selected again
    /// before writing.
    pub fn enable_periodic_interrupt(&self, interrupts: &mut dyn InterruptHal) {
        interrupts.disable_interrupts();
        self.with_cmos(|cmos| {
            let prev = cmos.read_register(CMOS_NMI_DISABLE | REGISTER_STATUS_B);
            cmos.write_register(
                CMOS_NMI_DISABLE | REGISTER_STATUS_B,
                prev | PERIODIC_INTERRUPT_ENABLE,
            );
        });
        interrupts.enable_interrupts();
    }

    /// Interrupt body.
    ///
    /// Subscribers run with the list locked, so a subscriber must not
    /// subscribe. A tick that finds the list busy skips the subscribers.
    pub fn handle_irq(&self) {
        if let Some(subscribers) = self.subscribers.get().and_then(try_lock_in_irq) {
            for subscriber in subscribers.iter() {
                subscriber();
            }
        }
        self.clock.tick();
        self.acknowledge();
    }

    fn sample(cmos: &mut C) -> RtcTime {
        RtcTime {
            second: cmos.read_register(REGISTER_SECOND),
            minute: cmos.read_register(REGISTER_MINUTE),
            hour: cmos.read_register(REGISTER_HOUR),
            weekday: cmos.read_register(REGISTER_WEEKDAY),
            monthday: cmos.read_register(REGISTER_MONTHDAY),
            month: cmos.read_register(REGISTER_MONTH),
            year: cmos.read_register(REGISTER_YEAR),
            century: cmos.read_register(REGISTER_CENTURY),
        }
    }
}

impl<C: CmosRegisters + Send> RtcCapability for Rtc<C> {
    /// Samples all registers until two consecutive samples agree.
    fn read_time(&self) -> RtcTime {
        self.with_cmos(|cmos| {
            let mut previous = Self::sample(cmos);
            loop {
                let current = Self::sample(cmos);
                if current == previous {
                    return current;
                }
                previous = current;
            }
        })
    }

    /// # Panics
    ///
    /// Panics if the device has not been initialized.
    fn subscribe(&self, callback: RtcCallback) {
        let Some(list) = self.subscribers.get() else {
            panic!("rtc: subscribe before init");
        };
        list.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

struct RtcHooks<C: CmosRegisters + Send> {
    rtc: Arc<Rtc<C>>,
}

impl<C: CmosRegisters + Send + 'static> DeviceLifecycle for RtcHooks<C> {
    fn init(&self, device: &DeviceInfo) -> Result<(), DeviceError> {
        announce("Init", &format!("at IRQ {}", self.rtc.irq_line), device);
        self.rtc.init_subscribers();
        Ok(())
    }

    fn uninit(&self, device: &DeviceInfo) {
        announce("Uninit", &format!("at IRQ {}", self.rtc.irq_line), device);
    }
}

/// Registers the RTC, installs the handler on `config.irq_line` and then
/// enables the periodic interrupt.
///
/// If the line is already taken the device is unregistered again and the
/// chip is left as it was.
pub fn attach_rtc<C: CmosRegisters + Send + 'static>(
    registry: &mut DeviceRegistry,
    rtc: Rtc<C>,
    interrupts: &mut dyn InterruptHal,
) -> Result<DeviceHandle, DeviceError> {
    let rtc = Arc::new(rtc);
    let builder = registry
        .new_device()
        .device_type(DeviceType::Rtc)
        .description(DESCRIPTION)
        .capability(Capability::Rtc(rtc.clone()))
        .private(rtc.clone())
        .hooks(Arc::new(RtcHooks { rtc: rtc.clone() }));
    let handle = registry.register_device(builder)?;

    let irq = Arc::clone(&rtc);
    if let Err(err) = interrupts.register_handler(rtc.irq_line, Box::new(move || irq.handle_irq()))
    {
        let name = registry.name(handle).unwrap_or_default().to_string();
        registry.unregister_device(handle)?;
        return Err(init_failed(name, err));
    }
    rtc.enable_periodic_interrupt(interrupts);
    Ok(handle)
}

fn init_failed(name: String, err: InterruptError) -> DeviceError {
    DeviceError::InitFailed {
        name,
        reason: err.to_string(),
    }
}

/// The concrete driver behind an RTC device, if it uses `C`.
pub fn rtc_of<C: CmosRegisters + Send + 'static>(
    registry: &DeviceRegistry,
    handle: DeviceHandle,
) -> Option<Arc<Rtc<C>>> {
    registry.private_state::<Arc<Rtc<C>>>(handle).cloned()
}
