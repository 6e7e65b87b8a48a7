//! Region Scheduler
//!
//! Turns a track's regions into segment reads on its source node, relative
//! to an arbitrary playback start position. Regions that already ended are
//! skipped; regions that start later are queued with a delay so the whole
//! track plays from one start time.

use std::fmt;

use log::{debug, warn};

use super::sources::{SourceInfo, SourceLoader};
use crate::graph::{ScheduledSegment, SourcePlayer};
use crate::model::{Region, RegionId, Track, TrackId};

/// Shortest segment worth submitting, in seconds
const MIN_SEGMENT_SECS: f64 = 1e-6;

/// Upper bound on repeats generated for one looped region
const MAX_LOOP_SEGMENTS: usize = 4096;

/// Why a region produced no segment
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The region ends at or before the start position
    Ended,
    /// The read offset lies at or beyond the end of the source
    OffsetBeyondSource,
    /// The source could not be opened
    SourceUnavailable(String),
    /// The region record violates its invariants
    Invalid(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Ended => write!(f, "region already ended"),
            SkipReason::OffsetBeyondSource => write!(f, "offset beyond end of source"),
            SkipReason::SourceUnavailable(reason) => write!(f, "source unavailable: {}", reason),
            SkipReason::Invalid(reason) => write!(f, "invalid region: {}", reason),
        }
    }
}

/// A region that was not scheduled
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRegion {
    pub region: RegionId,
    pub reason: SkipReason,
}

/// Outcome of scheduling one track
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleReport {
    pub track: TrackId,
    pub start_time: f64,
    /// Segments in submission order
    pub segments: Vec<ScheduledSegment>,
    pub skipped: Vec<SkippedRegion>,
}

impl ScheduleReport {
    /// True when nothing was queued for playback
    pub fn is_silent(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Schedules regions onto source nodes
pub struct RegionScheduler<'a> {
    loader: &'a dyn SourceLoader,
}

impl<'a> RegionScheduler<'a> {
    pub fn new(loader: &'a dyn SourceLoader) -> Self {
        Self { loader }
    }

    /// Queue every region of `track` that still has audio at `start_time`
    ///
    /// Segments are submitted in region list order. The player is not
    /// started here: the caller starts every track's player together so that
    /// inter-track sync is preserved. A region whose source cannot be opened
    /// is skipped without affecting the others.
    pub fn schedule_from_position(
        &self,
        track: &Track,
        start_time: f64,
        player: &mut SourcePlayer,
    ) -> ScheduleReport {
        let mut report = ScheduleReport {
            track: track.id,
            start_time,
            segments: Vec::new(),
            skipped: Vec::new(),
        };

        for region in &track.regions {
            let outcome = if region.end_time() <= start_time {
                // Cheap check first: no need to open sources of past regions
                Err(SkipReason::Ended)
            } else {
                match self.loader.open(&region.source) {
                    Ok(info) => Self::segments_for(region, start_time, &info),
                    Err(e) => {
                        warn!(
                            "[SCHEDULER] Track {} region {}: cannot open {}: {}",
                            track.id,
                            region.id,
                            region.source.display(),
                            e
                        );
                        Err(SkipReason::SourceUnavailable(e.to_string()))
                    }
                }
            };

            match outcome {
                Ok(segments) => {
                    for segment in segments {
                        player.schedule(segment.clone());
                        report.segments.push(segment);
                    }
                }
                Err(reason) => {
                    debug!(
                        "[SCHEDULER] Track {} skipped region {}: {}",
                        track.id, region.id, reason
                    );
                    report.skipped.push(SkippedRegion {
                        region: region.id,
                        reason,
                    });
                }
            }
        }

        debug!(
            "[SCHEDULER] Track {} from {:.3}s: {} segment(s), {} skipped",
            track.id,
            start_time,
            report.segments.len(),
            report.skipped.len()
        );
        report
    }

    /// Compute the segment reads for one region from `start_time`
    ///
    /// The read offset is `max(0, start_time - region.start_time) +
    /// region.offset_within_source`. A region starting after `start_time`
    /// gets a delay equal to the gap.
    pub fn segments_for(
        region: &Region,
        start_time: f64,
        source: &SourceInfo,
    ) -> Result<Vec<ScheduledSegment>, SkipReason> {
        region
            .validate()
            .map_err(|e| SkipReason::Invalid(e.to_string()))?;

        if region.end_time() <= start_time {
            return Err(SkipReason::Ended);
        }

        let source_duration = source.duration();
        if region.offset_within_source >= source_duration {
            return Err(SkipReason::OffsetBeyondSource);
        }

        let skipped = (start_time - region.start_time).max(0.0);
        let delay = (region.start_time - start_time).max(0.0);
        let remaining = region.duration - skipped;
        let fade_in = (region.fade_in - skipped).max(0.0);

        if !region.is_looped {
            let offset = region.offset_within_source + skipped;
            if offset >= source_duration {
                return Err(SkipReason::OffsetBeyondSource);
            }
            let length = remaining.min(source_duration - offset);
            return Self::segment(region, source, offset, length, delay, fade_in, true)
                .map(|segment| vec![segment])
                .ok_or(SkipReason::OffsetBeyondSource);
        }

        let window = source_duration - region.offset_within_source;
        let mut position_in_window = skipped % window;
        let mut remaining = remaining;
        let mut delay = delay;
        let mut fade_in = fade_in;
        let mut segments = Vec::new();

        while remaining > MIN_SEGMENT_SECS && segments.len() < MAX_LOOP_SEGMENTS {
            let offset = region.offset_within_source + position_in_window;
            let length = (window - position_in_window).min(remaining);
            let is_last = remaining - length <= MIN_SEGMENT_SECS;
            if let Some(segment) =
                Self::segment(region, source, offset, length, delay, fade_in, is_last)
            {
                segments.push(segment);
            }
            delay += length;
            remaining -= length;
            position_in_window = 0.0;
            fade_in = 0.0;
        }

        if segments.is_empty() {
            return Err(SkipReason::OffsetBeyondSource);
        }
        Ok(segments)
    }

    fn segment(
        region: &Region,
        source: &SourceInfo,
        offset: f64,
        length: f64,
        delay: f64,
        fade_in: f64,
        is_last: bool,
    ) -> Option<ScheduledSegment> {
        if length <= MIN_SEGMENT_SECS {
            return None;
        }
        let start_frame = source.frames_at(offset).min(source.frames);
        let frame_count = source
            .frames_at(length)
            .min(source.frames.saturating_sub(start_frame));
        if frame_count == 0 {
            return None;
        }
        Some(ScheduledSegment {
            region: region.id,
            source: region.source.clone(),
            source_offset: offset,
            start_frame,
            frame_count,
            sample_rate: source.sample_rate,
            delay,
            fade_in: fade_in.min(length),
            fade_out: if is_last {
                region.fade_out.min(length)
            } else {
                0.0
            },
            gain: region.gain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sources::InMemorySourceLoader;
    use approx::assert_relative_eq;

    fn ten_seconds() -> SourceInfo {
        SourceInfo::from_duration(48000, 10.0)
    }

    // ------------------------------------------------------------------------
    // Offset Computation
    // ------------------------------------------------------------------------

    #[test]
    fn test_offset_mid_region() {
        let region = Region::new("a.wav", 2.0, 3.0).with_offset(1.0);
        let segments = RegionScheduler::segments_for(&region, 3.0, &ten_seconds()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_relative_eq!(segments[0].source_offset, 2.0);
        assert_eq!(segments[0].start_frame, 96000);
        assert_relative_eq!(segments[0].duration(), 2.0);
        assert_eq!(segments[0].delay, 0.0);
    }

    #[test]
    fn test_future_region_is_delayed() {
        let region = Region::new("a.wav", 2.0, 4.0);
        let segments = RegionScheduler::segments_for(&region, 0.0, &ten_seconds()).unwrap();
        assert_relative_eq!(segments[0].delay, 2.0);
        assert_relative_eq!(segments[0].source_offset, 0.0);
        assert_relative_eq!(segments[0].duration(), 4.0);
    }

    #[test]
    fn test_past_region_skipped() {
        let region = Region::new("a.wav", 0.0, 4.0);
        assert_eq!(
            RegionScheduler::segments_for(&region, 4.0, &ten_seconds()),
            Err(SkipReason::Ended)
        );
    }

    #[test]
    fn test_offset_beyond_short_source() {
        let region = Region::new("a.wav", 0.0, 8.0).with_offset(1.0);
        let short = SourceInfo::from_duration(48000, 3.0);
        assert_eq!(
            RegionScheduler::segments_for(&region, 2.5, &short),
            Err(SkipReason::OffsetBeyondSource)
        );
    }

    #[test]
    fn test_length_clamped_to_source() {
        let region = Region::new("a.wav", 0.0, 8.0);
        let short = SourceInfo::from_duration(48000, 3.0);
        let segments = RegionScheduler::segments_for(&region, 1.0, &short).unwrap();
        assert_relative_eq!(segments[0].duration(), 2.0);
    }

    #[test]
    fn test_fade_in_shortened_when_starting_mid_fade() {
        let region = Region::new("a.wav", 0.0, 4.0).with_fades(1.0, 0.5);
        let segments = RegionScheduler::segments_for(&region, 0.25, &ten_seconds()).unwrap();
        assert_relative_eq!(segments[0].fade_in, 0.75);
        assert_relative_eq!(segments[0].fade_out, 0.5);
    }

    #[test]
    fn test_invalid_region_skipped() {
        let region = Region::new("a.wav", 0.0, -1.0);
        assert!(matches!(
            RegionScheduler::segments_for(&region, 0.0, &ten_seconds()),
            Err(SkipReason::Invalid(_))
        ));
    }

    // ------------------------------------------------------------------------
    // Looped Regions
    // ------------------------------------------------------------------------

    #[test]
    fn test_looped_region_repeats_source_window() {
        // 2s source window (offset 1 of a 3s source), region lasts 5s
        let source = SourceInfo::from_duration(48000, 3.0);
        let region = Region::new("loop.wav", 0.0, 5.0).with_offset(1.0).looped();
        let segments = RegionScheduler::segments_for(&region, 0.0, &source).unwrap();

        let lengths: Vec<f64> = segments.iter().map(|s| s.duration()).collect();
        assert_eq!(lengths.len(), 3);
        assert_relative_eq!(lengths[0], 2.0);
        assert_relative_eq!(lengths[1], 2.0);
        assert_relative_eq!(lengths[2], 1.0);
        assert_relative_eq!(segments[1].delay, 2.0);
        assert!(segments.iter().all(|s| s.source_offset >= 1.0));
    }

    #[test]
    fn test_looped_region_from_mid_repeat() {
        let source = SourceInfo::from_duration(48000, 2.0);
        let region = Region::new("loop.wav", 0.0, 6.0).looped();
        let segments = RegionScheduler::segments_for(&region, 3.5, &source).unwrap();
        assert_relative_eq!(segments[0].source_offset, 1.5);
        assert_relative_eq!(segments[0].duration(), 0.5);
        let total: f64 = segments.iter().map(|s| s.duration()).sum();
        assert_relative_eq!(total, 2.5, epsilon = 1e-6);
    }

    // ------------------------------------------------------------------------
    // Track Scheduling
    // ------------------------------------------------------------------------

    #[test]
    fn test_unreadable_source_does_not_abort_track() {
        let loader = InMemorySourceLoader::new().with_source("good.wav", ten_seconds());
        let scheduler = RegionScheduler::new(&loader);
        let track = Track::new("A")
            .with_region(Region::new("missing.wav", 0.0, 2.0))
            .with_region(Region::new("good.wav", 1.0, 2.0));

        let mut player = SourcePlayer::new();
        let report = scheduler.schedule_from_position(&track, 0.0, &mut player);
        assert_eq!(report.segments.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::SourceUnavailable(_)
        ));
        assert_eq!(player.segments().len(), 1);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_segments_follow_region_order() {
        let loader = InMemorySourceLoader::new().with_source("a.wav", ten_seconds());
        let scheduler = RegionScheduler::new(&loader);
        let first = Region::new("a.wav", 4.0, 1.0);
        let second = Region::new("a.wav", 1.0, 1.0);
        let track = Track::new("A")
            .with_region(first.clone())
            .with_region(second.clone());

        let mut player = SourcePlayer::new();
        let report = scheduler.schedule_from_position(&track, 0.0, &mut player);
        let order: Vec<RegionId> = report.segments.iter().map(|s| s.region).collect();
        assert_eq!(order, vec![first.id, second.id]);
    }
}
