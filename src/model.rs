//! Simulated process-data model.
//!
//! Three Siemens-style data blocks with a fixed schema. The scan driver
//! perturbs the values once per cycle so register reads look like a live
//! process instead of a static decoy.

use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// DB1: main process values.
#[derive(Debug, Clone, Serialize)]
pub struct DataBlock1 {
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Pressure")]
    pub pressure: f64,
    #[serde(rename = "Motor1_Running")]
    pub motor1_running: bool,
    #[serde(rename = "Motor2_Running")]
    pub motor2_running: bool,
}

/// DB10: tank level and valve state.
#[derive(Debug, Clone, Serialize)]
pub struct DataBlock10 {
    #[serde(rename = "Level")]
    pub level: f64,
    #[serde(rename = "Valve_Open")]
    pub valve_open: bool,
}

/// DB100: CPU diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DataBlock100 {
    #[serde(rename = "CPU_Load")]
    pub cpu_load: f64,
    #[serde(rename = "Scan_Time")]
    pub scan_time: f64,
    #[serde(rename = "Error_Code")]
    pub error_code: u16,
}

/// The full process image: every data block the device pretends to hold.
///
/// Schema is fixed at startup; the scan driver is the only writer.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessImage {
    #[serde(rename = "DB1")]
    pub db1: DataBlock1,
    #[serde(rename = "DB10")]
    pub db10: DataBlock10,
    #[serde(rename = "DB100")]
    pub db100: DataBlock100,
}

impl Default for ProcessImage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessImage {
    /// Creates the image with the power-on seed values.
    pub fn new() -> Self {
        Self {
            db1: DataBlock1 {
                temperature: 22.5,
                pressure: 1.02,
                motor1_running: false,
                motor2_running: true,
            },
            db10: DataBlock10 {
                level: 74.0,
                valve_open: false,
            },
            db100: DataBlock100 {
                cpu_load: 8.5,
                scan_time: 12.3,
                error_code: 0,
            },
        }
    }

    /// Applies one scan cycle worth of drift.
    ///
    /// Motor flags and the error code stay put; everything else moves inside
    /// the ranges a real plant floor would show.
    pub fn cycle_update(&mut self) {
        let mut rng = rand::thread_rng();

        self.db1.temperature += rng.gen_range(-0.1..=0.1);
        self.db1.pressure += rng.gen_range(-0.01..=0.01);

        self.db10.level += rng.gen_range(-1.0..=1.0);
        self.db10.valve_open = rng.gen_bool(0.5);

        self.db100.cpu_load = rng.gen_range(5.0..=40.0);
        self.db100.scan_time = rng.gen_range(8.0..=15.0);
    }
}

/// Shared, lock-guarded process image. Written only by the scan driver;
/// readers clone a consistent snapshot under the read lock.
pub type SharedProcess = Arc<RwLock<ProcessImage>>;

/// Creates the shared image with power-on seed values.
pub fn shared_process() -> SharedProcess {
    Arc::new(RwLock::new(ProcessImage::new()))
}
