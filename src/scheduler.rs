//! Frame-skip scheduling.
//!
//! Perception is expensive, so with a skip interval `N` it runs on the first
//! frame and on every frame whose counter is a multiple of `N + 1`. Frames in
//! between reuse the cached observations; they are still filtered and scored
//! against the live policy.

use crate::perception::Perception;

pub const DEFAULT_SKIP_FRAMES: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDecision {
    /// Monitoring is off: no inference, no verdicts, frame passes through.
    Idle,
    /// Run perception and replace the cache.
    Infer,
    /// Score the cached observations.
    Reuse,
}

impl FrameDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameDecision::Idle => "idle",
            FrameDecision::Infer => "infer",
            FrameDecision::Reuse => "reuse",
        }
    }
}

#[derive(Debug)]
pub struct FrameSkipScheduler {
    skip_interval: u32,
    frame_counter: u64,
    cache: Perception,
}

impl FrameSkipScheduler {
    pub fn new(skip_interval: u32) -> Self {
        Self {
            skip_interval,
            frame_counter: 0,
            cache: Perception::default(),
        }
    }

    pub fn skip_interval(&self) -> u32 {
        self.skip_interval
    }

    /// Frames counted while monitoring was on.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Decide what to do with the next frame.
    ///
    /// While inactive the cache is dropped so that re-enabling monitoring
    /// never scores observations from an earlier session.
    pub fn decide(&mut self, active: bool) -> FrameDecision {
        if !active {
            self.cache = Perception::default();
            return FrameDecision::Idle;
        }
        self.frame_counter += 1;
        let period = u64::from(self.skip_interval) + 1;
        if self.frame_counter == 1 || self.frame_counter % period == 0 {
            FrameDecision::Infer
        } else {
            FrameDecision::Reuse
        }
    }

    pub fn store(&mut self, perception: Perception) {
        self.cache = perception;
    }

    pub fn cached(&self) -> &Perception {
        &self.cache
    }
}

impl Default for FrameSkipScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{BBox, PoseObservation};

    fn inference_frames(scheduler: &mut FrameSkipScheduler, frames: usize) -> Vec<u64> {
        (0..frames)
            .filter_map(|_| match scheduler.decide(true) {
                FrameDecision::Infer => Some(scheduler.frame_counter()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn skip_two_infers_on_first_frame_and_every_third() {
        let mut scheduler = FrameSkipScheduler::new(2);
        assert_eq!(inference_frames(&mut scheduler, 10), vec![1, 3, 6, 9]);
    }

    #[test]
    fn skip_zero_infers_every_frame() {
        let mut scheduler = FrameSkipScheduler::new(0);
        assert_eq!(inference_frames(&mut scheduler, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn reuse_keeps_cache() {
        let mut scheduler = FrameSkipScheduler::new(2);
        assert_eq!(scheduler.decide(true), FrameDecision::Infer);
        scheduler.store(Perception {
            poses: vec![PoseObservation {
                track_id: 4,
                bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
                keypoints: vec![],
            }],
            equipment: vec![],
        });
        assert_eq!(scheduler.decide(true), FrameDecision::Reuse);
        assert_eq!(scheduler.cached().poses.len(), 1);
    }

    #[test]
    fn inactive_clears_cache_without_counting() {
        let mut scheduler = FrameSkipScheduler::new(2);
        scheduler.decide(true);
        scheduler.store(Perception {
            poses: vec![PoseObservation {
                track_id: 1,
                bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
                keypoints: vec![],
            }],
            equipment: vec![],
        });

        assert_eq!(scheduler.decide(false), FrameDecision::Idle);
        assert_eq!(scheduler.frame_counter(), 1);
        assert!(scheduler.cached().is_empty());

        // Frame 2 on re-enable is a reuse frame with nothing cached.
        assert_eq!(scheduler.decide(true), FrameDecision::Reuse);
        assert!(scheduler.cached().is_empty());
    }
}
