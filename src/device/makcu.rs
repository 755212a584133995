//! Serial driver for the makcu mouse bridge.
//!
//! The bridge enumerates as a CH343 USB-serial port. Commands are ASCII lines
//! (`km.move(dx,dy)`), and once `km.buttons(1)` is sent the device emits one
//! bitmask byte per button transition (bit0 left .. bit4 mouse5). A dedicated
//! I/O thread owns the read half, counts press/release transitions per button,
//! and reconnects with a fixed backoff when the port drops. The device echoes
//! every command line back, so the reader skips whole echo lines (first
//! printable byte through the trailing newline) before decoding mask bytes.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tracing::{debug, info, warn};

use super::{ButtonEdge, ButtonId, DeviceError, MouseTransport};

/// WCH CH343 bridge used by makcu boards.
pub const MAKCU_VID: u16 = 0x1A86;
pub const MAKCU_PID: u16 = 0x55D3;

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Per-button transition counters, advanced by the I/O thread and consumed by
/// [`MouseTransport::poll_button`].
#[derive(Debug, Default, Clone, Copy)]
struct EdgeCounter {
    presses: u32,
    releases: u32,
    seen_presses: u32,
    seen_releases: u32,
}

#[derive(Debug, Default)]
struct ButtonLatches {
    /// Last bitmask byte seen from the stream.
    mask: u8,
    counters: [EdgeCounter; ButtonId::COUNT],
}

pub struct MakcuTransport {
    serial_override: Option<String>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    latches: Mutex<ButtonLatches>,
    connected: AtomicBool,
    stopping: AtomicBool,
}

impl MakcuTransport {
    /// Creates the transport and starts its I/O thread. The thread keeps
    /// trying to (re)connect, so a device that is absent at startup is picked
    /// up as soon as it appears.
    pub fn spawn(serial_override: Option<String>) -> std::io::Result<Arc<Self>> {
        let transport = Arc::new(Self::new(serial_override));
        let worker = transport.clone();
        std::thread::Builder::new()
            .name("makcu-io".into())
            .spawn(move || worker.io_loop())?;
        Ok(transport)
    }

    fn new(serial_override: Option<String>) -> Self {
        Self {
            serial_override,
            writer: Mutex::new(None),
            latches: Mutex::new(ButtonLatches::default()),
            connected: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    /// Asks the I/O thread to wind down. Called after the control loop has
    /// stopped so no move command can be in flight afterwards.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Relaxed);
        self.mark_disconnected();
    }

    fn io_loop(&self) {
        let mut reader: Option<Box<dyn SerialPort>> = None;
        let mut buf = [0u8; 64];
        let mut in_echo = false;

        while !self.stopping.load(Ordering::Relaxed) {
            if reader.is_none() {
                match self.try_connect() {
                    Ok(port) => {
                        reader = Some(port);
                        in_echo = false;
                    }
                    Err(e) => {
                        debug!("makcu connect attempt failed: {}", e);
                        std::thread::sleep(RECONNECT_DELAY);
                        continue;
                    }
                }
            }

            let Some(port) = reader.as_mut() else {
                continue;
            };
            match port.read(&mut buf) {
                Ok(n) => self.ingest(&buf[..n], &mut in_echo),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("makcu read failed, reconnecting: {}", e);
                    reader = None;
                    self.mark_disconnected();
                    std::thread::sleep(RECONNECT_DELAY);
                }
            }
        }
        info!("makcu I/O thread stopped");
    }

    fn try_connect(&self) -> Result<Box<dyn SerialPort>, DeviceError> {
        let path = self.discover_port()?;
        let mut port = serialport::new(&path, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| DeviceError::Io(e.to_string()))?;

        port.write_all(b"km.buttons(1)\r\n")
            .map_err(|e| DeviceError::Io(e.to_string()))?;

        let writer = port
            .try_clone()
            .map_err(|e| DeviceError::Io(e.to_string()))?;

        {
            let mut guard = lock(&self.writer);
            *guard = Some(writer);
        }
        {
            // Forget stale transition history from a previous connection.
            let mut latches = lock(&self.latches);
            *latches = ButtonLatches::default();
        }
        self.connected.store(true, Ordering::Relaxed);
        info!("Connected to makcu device at {}", path);
        Ok(port)
    }

    fn discover_port(&self) -> Result<String, DeviceError> {
        if let Some(path) = &self.serial_override {
            return Ok(path.clone());
        }
        let ports = serialport::available_ports()
            .map_err(|e| DeviceError::NotFound(e.to_string()))?;
        ports
            .iter()
            .find(|p| match &p.port_type {
                SerialPortType::UsbPort(usb) => usb.vid == MAKCU_VID && usb.pid == MAKCU_PID,
                _ => false,
            })
            .map(|p| p.port_name.clone())
            .ok_or_else(|| {
                DeviceError::NotFound(format!(
                    "no serial port matching {:04x}:{:04x}",
                    MAKCU_VID, MAKCU_PID
                ))
            })
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
        let mut guard = lock(&self.writer);
        *guard = None;
    }

    /// Feeds raw bytes from the serial stream. A printable byte opens a
    /// command echo line that runs through its terminating newline, CR and LF
    /// included; everything outside an echo line is a button bitmask byte.
    fn ingest(&self, bytes: &[u8], in_echo: &mut bool) {
        for &byte in bytes {
            if *in_echo {
                if byte == b'\n' {
                    *in_echo = false;
                }
            } else if byte >= 0x20 {
                *in_echo = true;
            } else {
                self.apply_mask(byte);
            }
        }
    }

    /// Folds one bitmask byte from the stream into the edge counters. Every
    /// transition is counted, so an edge shorter than the control loop's poll
    /// interval still surfaces on the next poll.
    fn apply_mask(&self, mask: u8) {
        let mut latches = lock(&self.latches);
        let changed = latches.mask ^ mask;
        if changed == 0 {
            return;
        }
        for index in 0..ButtonId::COUNT {
            let bit = 1 << index;
            if changed & bit == 0 {
                continue;
            }
            let counter = &mut latches.counters[index];
            if mask & bit != 0 {
                counter.presses = counter.presses.wrapping_add(1);
            } else {
                counter.releases = counter.releases.wrapping_add(1);
            }
        }
        latches.mask = mask;
    }
}

impl MouseTransport for MakcuTransport {
    fn poll_button(&self, button: ButtonId) -> ButtonEdge {
        let mut latches = lock(&self.latches);
        let counter = &mut latches.counters[button.index()];
        if counter.seen_presses != counter.presses {
            counter.seen_presses = counter.presses;
            ButtonEdge::Pressed
        } else if counter.seen_releases != counter.releases {
            counter.seen_releases = counter.releases;
            ButtonEdge::Released
        } else {
            ButtonEdge::Unchanged
        }
    }

    fn move_rel(&self, dx: i32, dy: i32) -> Result<(), DeviceError> {
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        let mut guard = lock(&self.writer);
        let Some(port) = guard.as_mut() else {
            return Err(DeviceError::Disconnected);
        };
        let command = format!("km.move({},{})\r\n", dx, dy);
        if let Err(e) = port.write_all(command.as_bytes()) {
            *guard = None;
            self.connected.store(false, Ordering::Relaxed);
            return Err(DeviceError::Io(e.to_string()));
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Mutex poisoning only happens if a holder panicked; the guarded state is a
/// plain value, so continuing with it is sound.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
