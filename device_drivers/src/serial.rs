//! 16550 serial ports discovered through the ISA fixed list.

use std::sync::{Arc, Mutex, PoisonError};

use core_types::DeviceType;
use hal_x86_64::{PortIo, Uart16550};
use services_bus::{IsaBus, IsaDevice};
use services_device_manager::{
    Capability, DeviceError, DeviceHandle, DeviceRegistry, SerialCapability,
};

use crate::config::SerialConfig;
use crate::hooks::DriverHooks;

/// A UART shared as a Serial capability.
pub struct SerialPort<P: PortIo + Send> {
    label: &'static str,
    uart: Mutex<Uart16550<P>>,
}

impl<P: PortIo + Send> SerialPort<P> {
    /// Wraps `uart` and programs it for `baud`.
    pub fn new(label: &'static str, mut uart: Uart16550<P>, baud: u32) -> Self {
        uart.init(baud);
        Self {
            label,
            uart: Mutex::new(uart),
        }
    }

    /// ISA label ("COM1" ...).
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn with_uart<R>(&self, f: impl FnOnce(&mut Uart16550<P>) -> R) -> R {
        let mut uart = self.uart.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut uart)
    }
}

impl<P: PortIo + Send> SerialCapability for SerialPort<P> {
    fn write(&self, bytes: &[u8]) {
        self.with_uart(|uart| bytes.iter().for_each(|&byte| uart.write_char(byte)));
    }

    fn read_char(&self) -> u8 {
        self.with_uart(Uart16550::read_char)
    }

    fn char_available(&self) -> bool {
        self.with_uart(Uart16550::char_available)
    }

    fn write_char(&self, byte: u8) {
        self.with_uart(|uart| uart.write_char(byte));
    }
}

/// Registers the UART at `isa.io_base` as a root-level Serial device.
pub fn attach_serial<P: PortIo + Send + 'static>(
    registry: &mut DeviceRegistry,
    isa: &IsaDevice,
    port_io: P,
    config: &SerialConfig,
) -> Result<DeviceHandle, DeviceError> {
    let port = Arc::new(SerialPort::new(
        isa.label,
        Uart16550::new(port_io, isa.io_base),
        config.baud,
    ));
    let hooks = match isa.irq {
        Some(irq) => DriverHooks::at_irq(irq),
        None => DriverHooks::at_port(isa.io_base),
    };
    let builder = registry
        .new_device()
        .device_type(DeviceType::Serial)
        .description(format!("RS232 {}", isa.label))
        .capability(Capability::Serial(port.clone()))
        .private(port)
        .hooks(Arc::new(hooks));
    registry.register_device(builder)
}

/// Registers every serial port on `bus`, in list order.
///
/// `port_io` builds the port accessor for each entry. If one port fails,
/// the ports registered before it are unregistered again.
pub fn register_serial_ports<P, F>(
    registry: &mut DeviceRegistry,
    bus: &IsaBus,
    config: &SerialConfig,
    mut port_io: F,
) -> Result<Vec<DeviceHandle>, DeviceError>
where
    P: PortIo + Send + 'static,
    F: FnMut(&IsaDevice) -> P,
{
    let mut found = Vec::new();
    bus.scan(DeviceType::Serial, |isa| found.push(*isa));

    let mut handles = Vec::with_capacity(found.len());
    for isa in &found {
        match attach_serial(registry, isa, port_io(isa), config) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                for handle in handles.into_iter().rev() {
                    registry.unregister_device(handle)?;
                }
                return Err(err);
            }
        }
    }
    Ok(handles)
}

/// The concrete port behind a Serial device, if it uses `P`.
pub fn serial_port_of<P: PortIo + Send + 'static>(
    registry: &DeviceRegistry,
    handle: DeviceHandle,
) -> Option<Arc<SerialPort<P>>> {
    registry.private_state::<Arc<SerialPort<P>>>(handle).cloned()
}
