//! Per-frame instructions shared by every channel.

use allargando_core::BandBins;

/// What one channel does for one frame.
///
/// Plans are computed once per `process` call on the calling thread and
/// handed to every channel, so all channels advance in lock-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    pub index: usize,
    /// Input samples to advance after this frame
    pub input_hop: usize,
    /// Output samples between this frame and the next
    pub output_hop: usize,
    /// Frequency ratio
    pub pitch: f32,
    /// Peak-lock band edges, softened for the current stretch
    pub lock_bins: BandBins,
    /// Transient decision from the study pass, if one covers this frame
    pub transient: Option<bool>,
}
