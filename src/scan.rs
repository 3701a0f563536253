//! Scan-cycle driver.
//!
//! Advances the process image once per second and logs the full dump, the
//! way the simulated CPU would run its OB1 cycle. Missed ticks stretch the
//! period instead of catching up.

use crate::model::SharedProcess;
use crate::types::SCAN_PERIOD;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Runs the scan cycle until the task is cancelled.
pub async fn run_scan_cycle(process: SharedProcess) {
    info!("CPU in RUN mode. Starting OB1 scan cycle...");

    let mut ticker = interval(SCAN_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let dump = {
            let mut image = process.write().await;
            image.cycle_update();
            serde_json::to_string(&*image)
        };

        match dump {
            Ok(json) => info!("[DB UPDATE] {}", json),
            Err(e) => warn!("Scan dump failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shared_process;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_scan_cycle_advances_the_image() {
        let process = shared_process();
        let seed_temperature = process.read().await.db1.temperature;

        let driver = tokio::spawn(run_scan_cycle(process.clone()));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        driver.abort();

        let image = process.read().await;
        // At most five cycles fit in the window, each bounded by 0.1.
        assert!((image.db1.temperature - seed_temperature).abs() <= 0.5 + 1e-9);
        assert!(image.db100.cpu_load >= 5.0 && image.db100.cpu_load <= 40.0);
        assert!(!image.db1.motor1_running);
        assert!(image.db1.motor2_running);
    }
}
