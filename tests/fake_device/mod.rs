// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory device behind the `test` scheme

#![allow(dead_code)]

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, LazyLock, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use tokio_plc::{
    bytes::Bytes,
    driver::{Driver, DriverRegistry, FieldData, Transport},
    ConnectionDescriptor, DataType, Dialect, DriverManager, FieldDescriptor, MemoryArea,
    ResponseCode,
};

pub const SCHEME: &str = "test";

pub const REGISTERS: [u16; 8] = [42, 1, 0, 0xFFFF, 0, 0, 0, 0];

/// Answers with a single byte instead of a whole register.
pub const TRUNCATED_ADDRESS: u32 = 7;

static DIALECT: LazyLock<Dialect> = LazyLock::new(|| {
    Dialect::builder(SCHEME)
        .pattern(
            r"(?P<area>[a-z]+):(?P<address>\d{1,5})(?::(?P<type>[A-Z0-9]+))?(?:\[(?P<quantity>\d{1,3})\])?",
        )
        .area("area", MemoryArea::HoldingRegister)
        .data_type("INT16", DataType::Int16)
        .data_type("UINT16", DataType::UInt16)
        .data_type("BOOL", DataType::Bool)
        .default_data_type(DataType::Int16)
        .build()
        .unwrap()
});

/// Observable state of the device.
#[derive(Debug, Default)]
pub struct Device {
    connects: AtomicUsize,
    reads: AtomicUsize,
    closes: AtomicUsize,
    drops: AtomicUsize,
    refuse: AtomicBool,
    disconnected: AtomicBool,
    connect_delay: Mutex<Duration>,
    read_delay: Mutex<Duration>,
}

impl Device {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Transports that have been closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Transports that have been dropped, closed or not.
    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    fn read_field(field: &FieldDescriptor) -> FieldData {
        if field.address() == TRUNCATED_ADDRESS {
            return Ok(Bytes::from_static(&[0x00]));
        }
        let start = usize::try_from(field.address()).unwrap();
        let end = start + usize::from(field.quantity());
        let registers = REGISTERS
            .get(start..end)
            .ok_or(ResponseCode::InvalidAddress)?;
        let data = if field.data_type() == DataType::Bool {
            let mut bits = vec![0u8; registers.len().div_ceil(8)];
            for (index, register) in registers.iter().enumerate() {
                if *register != 0 {
                    bits[index / 8] |= 1 << (index % 8);
                }
            }
            bits
        } else {
            registers.iter().flat_map(|r| r.to_be_bytes()).collect()
        };
        Ok(data.into())
    }
}

#[derive(Debug)]
pub struct TestDriver {
    device: Arc<Device>,
}

impl TestDriver {
    pub fn new(device: &Arc<Device>) -> Self {
        Self {
            device: Arc::clone(device),
        }
    }
}

#[async_trait]
impl Driver for TestDriver {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn dialect(&self) -> &Dialect {
        &DIALECT
    }

    async fn connect(&self, _descriptor: &ConnectionDescriptor) -> io::Result<Box<dyn Transport>> {
        self.device.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.device.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.device.refuse.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }
        Ok(Box::new(TestTransport {
            device: Arc::clone(&self.device),
        }))
    }
}

#[derive(Debug)]
struct TestTransport {
    device: Arc<Device>,
}

#[async_trait]
impl Transport for TestTransport {
    async fn read(&mut self, fields: &[FieldDescriptor]) -> io::Result<Vec<FieldData>> {
        self.device.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.device.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.device.disconnected.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        Ok(fields.iter().map(Device::read_field).collect())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.device.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for TestTransport {
    fn drop(&mut self) {
        self.device.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A manager that only knows the `test` driver.
pub fn manager(device: &Arc<Device>) -> DriverManager {
    let registry = DriverRegistry::new();
    registry.register(Arc::new(TestDriver::new(device)));
    DriverManager::with_registry(Arc::new(registry))
}
