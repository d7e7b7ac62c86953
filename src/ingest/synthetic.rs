use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL, `stub://<name>`.
    pub url: String,
    /// Frames per second on the virtual timeline.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// End of stream after this many frames. `None` streams forever.
    pub frame_limit: Option<u64>,
    /// Timestamp of frame 0, epoch ms.
    pub start_ms: u64,
    /// Stamp frames with the wall clock at capture instead of the virtual
    /// timeline. Live sources set this.
    pub live_clock: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://main_camera".to_string(),
            target_fps: 10,
            width: 1280,
            height: 720,
            frame_limit: None,
            start_ms: 0,
            live_clock: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Deterministic frame source for `stub://` URLs.
///
/// Frame `n` (1-based) is stamped `start_ms + n * 1000 / fps`, or with the
/// wall clock when `live_clock` is set.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "unsupported source url {}: only stub:// sources are built in",
                config.url
            ));
        }
        if config.target_fps == 0 {
            return Err(anyhow!("{}: target_fps must be > 0", config.url));
        }
        Ok(Self {
            config,
            frame_count: 0,
            connected: false,
        })
    }

    /// Synthetic sources are always reachable.
    pub fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    /// Next frame, or `None` once the frame limit is reached.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("{}: next_frame before connect", self.config.url));
        }
        if self
            .config
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        self.frame_count += 1;

        let captured_at_ms = if self.config.live_clock {
            crate::now_ms()?
        } else {
            self.config.start_ms + self.frame_count * 1000 / u64::from(self.config.target_fps)
        };
        let pixel_count = self.config.width as usize * self.config.height as usize * 3;
        // Flat grey that shifts slowly; content is irrelevant to the stub models.
        let shade = (self.frame_count / 50 % 256) as u8;

        Ok(Some(Frame::new(
            vec![shade; pixel_count],
            self.config.width,
            self.config.height,
            self.frame_count,
            captured_at_ms,
        )))
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
