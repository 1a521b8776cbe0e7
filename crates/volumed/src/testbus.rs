//! Recording bus shared by the controller and transport tests.

use std::sync::{Arc, Mutex};

use mcp42xxx::{BusError, Mcp42xxx, PotBus};

use crate::levels::LevelMap;
use crate::volume::{UNITS, VolumeController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Cs(bool),
    Write(Vec<u8>),
    Shdn(bool),
    Rs(bool),
}

/// A [`PotBus`] that records every operation instead of touching hardware.
pub struct TestBus {
    ops: Arc<Mutex<Vec<BusOp>>>,
}

impl TestBus {
    pub fn new() -> (Self, Arc<Mutex<Vec<BusOp>>>) {
        let ops = Arc::new(Mutex::new(Vec::new()));
        (Self { ops: ops.clone() }, ops)
    }
}

impl PotBus for TestBus {
    fn clock_hz(&self) -> u32 {
        // fast clock keeps the settle wait negligible in tests
        10_000_000
    }

    fn chip_select(&mut self, active: bool) -> Result<(), BusError> {
        self.ops.lock().unwrap().push(BusOp::Cs(active));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.ops.lock().unwrap().push(BusOp::Write(bytes.to_vec()));
        Ok(())
    }

    fn shutdown_line(&mut self, active: bool) -> Result<(), BusError> {
        self.ops.lock().unwrap().push(BusOp::Shdn(active));
        Ok(())
    }

    fn reset_line(&mut self, active: bool) -> Result<(), BusError> {
        self.ops.lock().unwrap().push(BusOp::Rs(active));
        Ok(())
    }
}

/// Fresh controller over a recording bus, plus the recorded operations.
pub fn test_controller() -> (VolumeController<TestBus>, Arc<Mutex<Vec<BusOp>>>) {
    let (bus, ops) = TestBus::new();
    let driver = Mcp42xxx::new(bus, UNITS);
    (VolumeController::new(driver, LevelMap::new()), ops)
}
