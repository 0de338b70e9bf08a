// Log the poses of a motion capture stream
//
// A simulated tracker publishes a slow horizontal circle at 10Hz for 3
// seconds. Run with RUST_LOG=info to see the poses.

use std::f64::consts::PI;
use std::time::Duration;

use crazyflie_fleet::pose::{PoseMonitor, PoseStamped};

#[tokio::main]
async fn main() {
    env_logger::init();

    let (tx, rx) = flume::unbounded::<PoseStamped>();

    let tracker = tokio::spawn(async move {
        for i in 0..30 {
            let t = i as f64 * 0.1;
            let angle = 2.0 * PI * t / 3.0;
            let pose = PoseStamped {
                stamp: t,
                position: [angle.cos(), angle.sin(), 0.5],
                orientation: [0.0, 0.0, (angle / 2.0).sin(), (angle / 2.0).cos()],
            };
            if tx.send_async(pose).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let count = PoseMonitor::new(rx).run().await;
    let _ = tracker.await;

    println!("{} poses received", count);
}
