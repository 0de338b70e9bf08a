//! # Motion capture pose stream
//!
//! Consumer side of an external motion capture pose topic. The transport is
//! not part of this crate: anything able to deliver [PoseStamped] samples can
//! implement [PoseSource]. A `flume` receiver is a source out of the box.
//!
//! Poses are only logged for now, they are not fed to the Crazyflies.

use std::sync::Arc;

use async_trait::async_trait;

use crate::sink::LogSink;

/// One pose sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseStamped {
    /// Sample time in seconds, as stamped by the publisher
    pub stamp: f64,
    /// Position x, y, z in meters
    pub position: [f64; 3],
    /// Orientation quaternion x, y, z, w
    pub orientation: [f64; 4],
}

/// Asynchronous source of pose samples
#[async_trait]
pub trait PoseSource: Send {
    /// Next sample, `None` once the stream has ended
    async fn next_pose(&mut self) -> Option<PoseStamped>;
}

#[async_trait]
impl PoseSource for flume::Receiver<PoseStamped> {
    async fn next_pose(&mut self) -> Option<PoseStamped> {
        self.recv_async().await.ok()
    }
}

/// Logs every pose of a source
pub struct PoseMonitor<S> {
    source: S,
    sink: Option<Arc<LogSink>>,
}

impl<S: PoseSource> PoseMonitor<S> {
    /// Monitor logging through the `log` facade only
    pub fn new(source: S) -> Self {
        Self { source, sink: None }
    }

    /// Also write the poses to `sink`
    pub fn with_sink(mut self, sink: Arc<LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    fn report(&self, line: &str) {
        log::info!("{}", line);
        if let Some(sink) = &self.sink {
            sink.line(line);
        }
    }

    /// Drain the source, returns the number of poses received
    pub async fn run(mut self) -> usize {
        let mut count = 0;

        while let Some(pose) = self.source.next_pose().await {
            let [x, y, z] = pose.position;
            let [qx, qy, qz, qw] = pose.orientation;

            self.report(&format!("Position: ({}, {}, {})", x, y, z));
            self.report(&format!("Orientation Quaternion: ({}, {}, {}, {})", qx, qy, qz, qw));
            count += 1;
        }

        log::debug!("Pose stream ended after {} samples", count);
        count
    }
}
