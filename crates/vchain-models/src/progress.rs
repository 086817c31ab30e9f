//! Progress band math.
//!
//! Segment generation fills the 0-80% band, split evenly across segments;
//! assembly fills 80-100%.

use crate::segment::SegmentSeconds;

/// Upper bound of the generation band.
pub const GENERATION_BAND: f64 = 80.0;

/// Width of the assembly band.
pub const ASSEMBLY_BAND: f64 = 20.0;

/// Rough size of one second of generated video.
pub const BYTES_PER_SECOND_ESTIMATE: u64 = 8 * 1024 * 1024;

/// Estimated output size above which a run is considered memory-heavy.
pub const MEMORY_WARNING_BYTES: u64 = 1536 * 1024 * 1024;

/// Overall progress while segment `index` of `total` is at `segment_progress`.
///
/// `(index / total) * 80 + (segment_progress / 100) * (80 / total)`, rounded.
pub fn generation_progress(index: usize, total: usize, segment_progress: u8) -> u8 {
    if total == 0 {
        return 0;
    }
    let total = total as f64;
    let base = (index as f64 / total) * GENERATION_BAND;
    let contribution = (f64::from(segment_progress.min(100)) / 100.0) * (GENERATION_BAND / total);
    (base + contribution).round().clamp(0.0, GENERATION_BAND) as u8
}

/// Overall progress while assembly is at `percent`.
pub fn assembly_progress(percent: u8) -> u8 {
    let scaled = GENERATION_BAND + (f64::from(percent.min(100)) / 100.0) * ASSEMBLY_BAND;
    scaled.round().min(100.0) as u8
}

/// Estimated in-memory size of a run's media.
pub fn estimate_output_bytes(seconds: SegmentSeconds, segments: usize) -> u64 {
    u64::from(seconds.as_secs()) * segments as u64 * BYTES_PER_SECOND_ESTIMATE
}
