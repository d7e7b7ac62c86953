//! Frame container handed from a source to its pipeline.
//!
//! - `Frame`: owns the pixel buffer for one cycle. Bytes are private.
//! - `InferenceView`: what perception backends receive. Pixels flow in, only
//!   observations flow out.
//!
//! Frames are ephemeral: a pipeline never keeps a frame past `process_frame`.
//! Only the observations derived from it are cached.

/// One captured frame.
pub struct Frame {
    /// Private pixel data (packed RGB).
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Sequence number assigned by the source, starting at 1.
    pub seq: u64,

    /// Capture time in milliseconds since the Unix epoch. Sources replaying a
    /// file stamp frames on the file's own timeline.
    pub captured_at_ms: u64,
}

// Explicitly NOT implementing Clone: a frame belongs to exactly one cycle.

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64, captured_at_ms: u64) -> Self {
        Self {
            data,
            width,
            height,
            seq,
            captured_at_ms,
        }
    }

    /// Restricted view for perception backends.
    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { frame: self }
    }

    /// Raw byte length (for health logging).
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Read-only view of a frame for perception.
///
/// Provides dimensions, sequence number, capture time and the pixel slice for
/// the duration of one inference call. It cannot be cloned into an owned frame.
pub struct InferenceView<'a> {
    frame: &'a Frame,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn seq(&self) -> u64 {
        self.frame.seq
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.frame.captured_at_ms
    }

    /// Pixel data. Backends must not retain the slice beyond the call.
    pub fn pixels(&self) -> &'a [u8] {
        &self.frame.data
    }
}
