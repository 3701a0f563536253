//! Modbus register image and the process-variable projection.
//!
//! The projection driver maps a snapshot of the process image into a
//! 200-word holding-register image once per second. The internal Modbus
//! server reads that image on its request path; this module's writer is the
//! only writer.

use crate::model::{ProcessImage, SharedProcess};
use crate::types::{PROJECTION_PERIOD, REGISTER_IMAGE_WORDS};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

// =============================================================================
// Projection Table
// =============================================================================

// Register addresses backed by process variables. Everything else stays zero.
const REG_TEMPERATURE: u16 = 0;
const REG_PRESSURE: u16 = 1;
const REG_LEVEL: u16 = 2;
const REG_VALVE_OPEN: u16 = 3;
const REG_MOTOR1_RUNNING: u16 = 4;
const REG_MOTOR2_RUNNING: u16 = 5;
const REG_CPU_LOAD: u16 = 100;
const REG_SCAN_TIME: u16 = 101;

/// Fixed projection from process fields to register words.
pub static PROJECTION_TABLE: &[(u16, fn(&ProcessImage) -> u16)] = &[
    (REG_TEMPERATURE, encode_temperature),
    (REG_PRESSURE, encode_pressure),
    (REG_LEVEL, encode_level),
    (REG_VALVE_OPEN, encode_valve_open),
    (REG_MOTOR1_RUNNING, encode_motor1),
    (REG_MOTOR2_RUNNING, encode_motor2),
    (REG_CPU_LOAD, encode_cpu_load),
    (REG_SCAN_TIME, encode_scan_time),
];

fn encode_temperature(image: &ProcessImage) -> u16 {
    scaled(image.db1.temperature, 10.0)
}

fn encode_pressure(image: &ProcessImage) -> u16 {
    scaled(image.db1.pressure, 1000.0)
}

fn encode_level(image: &ProcessImage) -> u16 {
    scaled(image.db10.level, 1.0)
}

fn encode_valve_open(image: &ProcessImage) -> u16 {
    flag(image.db10.valve_open)
}

fn encode_motor1(image: &ProcessImage) -> u16 {
    flag(image.db1.motor1_running)
}

fn encode_motor2(image: &ProcessImage) -> u16 {
    flag(image.db1.motor2_running)
}

fn encode_cpu_load(image: &ProcessImage) -> u16 {
    scaled(image.db100.cpu_load, 1.0)
}

fn encode_scan_time(image: &ProcessImage) -> u16 {
    scaled(image.db100.scan_time, 10.0)
}

/// Rounds `value * factor` into a register word, wrapping modulo 2^16.
fn scaled(value: f64, factor: f64) -> u16 {
    ((value * factor).round() as i64) as u16
}

fn flag(on: bool) -> u16 {
    u16::from(on)
}

/// Applies the projection table to one snapshot.
pub fn project(image: &ProcessImage) -> Vec<(u16, u16)> {
    PROJECTION_TABLE
        .iter()
        .map(|&(addr, encode)| (addr, encode(image)))
        .collect()
}

// =============================================================================
// Register Image
// =============================================================================

/// The holding-register image served by the internal Modbus server.
///
/// Written by the projection driver in one batch per tick; read by the
/// server request path. Each word is atomically representable, so tearing
/// across word boundaries is the only tearing possible and it is tolerated.
#[derive(Debug)]
pub struct RegisterImage {
    words: RwLock<[u16; REGISTER_IMAGE_WORDS]>,
}

impl Default for RegisterImage {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterImage {
    /// Creates an all-zero image.
    pub fn new() -> Self {
        Self {
            words: RwLock::new([0; REGISTER_IMAGE_WORDS]),
        }
    }

    /// Applies one batch of (address, value) writes under a single lock.
    /// Addresses beyond the image are ignored.
    pub async fn write_batch(&self, entries: &[(u16, u16)]) {
        let mut words = self.words.write().await;
        for &(addr, value) in entries {
            if let Some(slot) = words.get_mut(addr as usize) {
                *slot = value;
            }
        }
    }

    /// Writes a contiguous run starting at `addr`. Returns false when the
    /// run does not fit in the image.
    pub async fn write_range(&self, addr: u16, values: &[u16]) -> bool {
        let start = addr as usize;
        let Some(end) = start.checked_add(values.len()) else {
            return false;
        };
        let mut words = self.words.write().await;
        match words.get_mut(start..end) {
            Some(slice) => {
                slice.copy_from_slice(values);
                true
            }
            None => false,
        }
    }

    /// Reads `count` words starting at `addr`; None when out of range.
    pub async fn read_range(&self, addr: u16, count: u16) -> Option<Vec<u16>> {
        let start = addr as usize;
        let end = start + count as usize;
        let words = self.words.read().await;
        words.get(start..end).map(|slice| slice.to_vec())
    }
}

/// Shared handle to the register image.
pub type SharedRegisters = Arc<RegisterImage>;

// =============================================================================
// Projection Driver
// =============================================================================

/// Projects the process image into the register map once per second.
///
/// Deliberately not phase-locked with the scan driver; readers may observe
/// either of two adjacent cycles, never a torn mix.
pub async fn run_projection(process: SharedProcess, registers: SharedRegisters) {
    let mut ticker = interval(PROJECTION_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let snapshot = process.read().await.clone();
        let batch = project(&snapshot);
        registers.write_batch(&batch).await;
        debug!("Projected {} registers", batch.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shared_process;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_seed_snapshot_projection() {
        let image = ProcessImage::new();
        let batch = project(&image);
        assert_eq!(
            batch,
            vec![
                (0, 225),  // 22.5 C, scaled x10
                (1, 1020), // 1.02 bar, scaled x1000
                (2, 74),
                (3, 0),
                (4, 0),
                (5, 1),
                (100, 9), // 8.5 rounds away from zero
                (101, 123),
            ]
        );
    }

    #[test]
    fn test_scaling_wraps_instead_of_clamping() {
        assert_eq!(scaled(7000.0, 10.0), (70000 % 65536) as u16);
        assert_eq!(scaled(-1.0, 10.0), 65526);
    }

    #[tokio::test]
    async fn test_register_image_bounds() {
        let registers = RegisterImage::new();
        assert!(registers.write_range(198, &[1, 2]).await);
        assert!(!registers.write_range(199, &[1, 2]).await);
        assert_eq!(registers.read_range(198, 2).await, Some(vec![1, 2]));
        assert_eq!(registers.read_range(199, 2).await, None);
        assert_eq!(registers.read_range(0, 1).await, Some(vec![0]));
    }

    #[tokio::test]
    async fn test_batch_write_ignores_out_of_image_addresses() {
        let registers = RegisterImage::new();
        registers.write_batch(&[(0, 42), (5000, 7)]).await;
        assert_eq!(registers.read_range(0, 1).await, Some(vec![42]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_projection_driver_writes_the_seed_snapshot() {
        let process = shared_process();
        let registers: SharedRegisters = Arc::new(RegisterImage::new());

        let driver = tokio::spawn(run_projection(process, registers.clone()));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        driver.abort();

        let mapped = registers.read_range(0, 6).await.unwrap();
        assert_eq!(mapped, vec![225, 1020, 74, 0, 0, 1]);
        assert_eq!(registers.read_range(100, 2).await.unwrap(), vec![9, 123]);

        // Unlisted addresses stay zero.
        assert_eq!(registers.read_range(6, 94).await.unwrap(), vec![0; 94]);
    }

    proptest! {
        #[test]
        fn prop_scaling_is_round_then_wrap(value in -1.0e6f64..1.0e6) {
            let encoded = scaled(value, 10.0);
            let expected = ((value * 10.0).round() as i64).rem_euclid(65536) as u16;
            prop_assert_eq!(encoded, expected);
        }
    }
}
