//! Test doubles shared by the unit tests of this crate.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::Cell;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType as I2cErrorType, I2c};
use embedded_io_async::{ErrorKind as IoErrorKind, ErrorType as IoErrorType, Read, Write};

use crate::reporter::{Transport, TransportError};
use crate::sensors::mpu6050::{REG_WHO_AM_I, WHO_AM_I_EXPECTED};
use crate::sensors::{Accelerometer, RawSample, SensorError};

#[track_caller]
pub fn assert_close(actual: f32, expected: f32, tolerance: f32) {
    assert!(
        libm::fabsf(actual - expected) <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

/// Delay that completes immediately and adds the requested time to a shared
/// virtual clock.
#[derive(Clone, Default)]
pub struct VirtualDelay {
    elapsed_ns: Rc<Cell<u64>>,
}

impl VirtualDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns.get() / 1_000_000
    }
}

impl DelayNs for VirtualDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.set(self.elapsed_ns.get() + u64::from(ns));
    }
}

/// Accelerometer that replays a fixed list of samples.
pub struct ScriptedAccelerometer {
    samples: Vec<RawSample>,
    failing_read: Option<usize>,
    temperature: Option<f32>,
    reads: usize,
    power_downs: usize,
}

impl ScriptedAccelerometer {
    /// Reads past the end of `samples` repeat the last one.
    pub fn with_samples(samples: &[RawSample]) -> Self {
        Self {
            samples: samples.to_vec(),
            failing_read: None,
            temperature: Some(19.5),
            reads: 0,
            power_downs: 0,
        }
    }

    pub fn constant(sample: RawSample) -> Self {
        Self::with_samples(&[sample])
    }

    /// Make the read with this zero-based index fail.
    pub fn fail_read(&mut self, index: usize) {
        self.failing_read = Some(index);
    }

    pub fn without_temperature(mut self) -> Self {
        self.temperature = None;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn power_downs(&self) -> usize {
        self.power_downs
    }
}

impl Accelerometer for ScriptedAccelerometer {
    const NAME: &'static str = "scripted";

    async fn read_raw(&mut self) -> Result<RawSample, SensorError> {
        let index = self.reads;
        self.reads += 1;

        if self.failing_read == Some(index) {
            return Err(SensorError::ReadFailed {
                sensor: Self::NAME,
                operation: "read acceleration",
                details: "injected fault",
            });
        }

        let sample = self
            .samples
            .get(index)
            .or(self.samples.last())
            .copied()
            .unwrap_or_default();
        Ok(sample)
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.temperature.ok_or(SensorError::Timeout {
            sensor: Self::NAME,
            operation: "read temperature",
        })
    }

    async fn power_down(&mut self) -> Result<(), SensorError> {
        self.power_downs += 1;
        Ok(())
    }
}

/// I2C bus with a single register-file device behind it.
pub struct FakeBus {
    address: u8,
    registers: [u8; 128],
    pointer: usize,
    stalled: bool,
    transactions: usize,
}

impl FakeBus {
    /// A device answering WHO_AM_I like an MPU-6050.
    pub fn mpu6050(address: u8) -> Self {
        let mut bus = Self {
            address,
            registers: [0; 128],
            pointer: 0,
            stalled: false,
            transactions: 0,
        };
        bus.set_register(REG_WHO_AM_I, WHO_AM_I_EXPECTED);
        bus
    }

    pub fn set_register(&mut self, register: u8, value: u8) {
        self.registers[usize::from(register)] = value;
    }

    /// Store a big-endian 16-bit value at `register` and `register + 1`.
    pub fn set_register_pair(&mut self, register: u8, value: i16) {
        let [high, low] = value.to_be_bytes();
        self.set_register(register, high);
        self.set_register(register + 1, low);
    }

    pub fn register(&self, register: u8) -> u8 {
        self.registers[usize::from(register)]
    }

    /// Every following transaction never completes.
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    pub fn transactions(&self) -> usize {
        self.transactions
    }
}

impl I2cErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.transactions += 1;

        if self.stalled {
            core::future::pending::<()>().await;
        }
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    if let Some((&register, values)) = bytes.split_first() {
                        self.pointer = usize::from(register);
                        for value in values {
                            self.registers[self.pointer % 128] = *value;
                            self.pointer += 1;
                        }
                    }
                }
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = self.registers[self.pointer % 128];
                        self.pointer += 1;
                    }
                }
            }
        }

        Ok(())
    }
}

/// What the scripted collector does with one connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Refuse(TransportError),
    /// `connect` never completes.
    HangConnect,
    /// Reply with these bytes, then close.
    Respond(&'static [u8]),
    /// Accept the request but never answer.
    Silent,
    /// Fail the read with this I/O error kind.
    FailRead(IoErrorKind),
}

/// Transport whose connection attempts follow a script. The last entry
/// repeats once the script runs out.
pub struct ScriptedTransport {
    script: VecDeque<Script>,
    last: Script,
    requests: Vec<Vec<u8>>,
    targets: Vec<(String, u16)>,
}

impl ScriptedTransport {
    pub fn new(script: &[Script]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            last: script.last().copied().unwrap_or(Script::Silent),
            requests: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn always(script: Script) -> Self {
        Self::new(&[script])
    }

    pub fn connects(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self) -> &[(String, u16)] {
        &self.targets
    }

    pub fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }
}

impl Transport for ScriptedTransport {
    type Connection<'c> = ScriptedConnection<'c>;

    async fn connect<'c>(
        &'c mut self,
        host: &str,
        port: u16,
    ) -> Result<ScriptedConnection<'c>, TransportError> {
        self.targets.push((host.to_string(), port));
        let script = self.script.pop_front().unwrap_or(self.last);

        match script {
            Script::Refuse(error) => Err(error),
            Script::HangConnect => core::future::pending().await,
            _ => {
                self.requests.push(Vec::new());
                let written = self
                    .requests
                    .last_mut()
                    .ok_or(TransportError::Io)?;
                Ok(ScriptedConnection {
                    script,
                    written,
                    offset: 0,
                })
            }
        }
    }
}

pub struct ScriptedConnection<'c> {
    script: Script,
    written: &'c mut Vec<u8>,
    offset: usize,
}

impl IoErrorType for ScriptedConnection<'_> {
    type Error = IoErrorKind;
}

impl Write for ScriptedConnection<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Read for ScriptedConnection<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.script {
            Script::Respond(response) => {
                // Short reads exercise the reassembly of the status line.
                let remaining = &response[self.offset..];
                let n = remaining.len().min(buf.len()).min(16);
                buf[..n].copy_from_slice(&remaining[..n]);
                self.offset += n;
                Ok(n)
            }
            Script::FailRead(kind) => Err(kind),
            _ => core::future::pending().await,
        }
    }
}
