use crate::particle::Physics;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pixelstorm")]
#[command(about = "Rain an image into a heap, blow it away, then blow it up")]
pub(crate) struct Cli {
    /// Folder with .png / .jpg / .jpeg images (default: images)
    #[arg(long)]
    pub(crate) images: Option<PathBuf>,

    /// JSON settings file; missing keys keep their defaults
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// Target frames per second
    #[arg(long)]
    pub(crate) fps: Option<u32>,

    /// Pixel-block size in canvas pixels
    #[arg(long)]
    pub(crate) block: Option<u32>,

    /// Canvas width in pixels (default: terminal columns)
    #[arg(long)]
    pub(crate) width: Option<u32>,

    /// Canvas height in pixels (default: terminal rows x 2)
    #[arg(long)]
    pub(crate) height: Option<u32>,

    /// Seed for the random stream; fixed seeds replay the same animation
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    /// Skip the melody timeline
    #[arg(long, default_value_t = false)]
    pub(crate) no_melody: bool,

    /// Run a single cycle and exit
    #[arg(long, default_value_t = false)]
    pub(crate) once: bool,

    /// Write tracing output to this file
    #[arg(long)]
    pub(crate) log_file: Option<PathBuf>,
}

impl Cli {
    pub(crate) fn apply(&self, s: &mut Settings) {
        if let Some(p) = &self.images {
            s.images = p.clone();
        }
        if let Some(v) = self.fps {
            s.fps = v;
        }
        if let Some(v) = self.block {
            s.block = v;
        }
        if self.width.is_some() {
            s.canvas_width = self.width;
        }
        if self.height.is_some() {
            s.canvas_height = self.height;
        }
        if self.seed.is_some() {
            s.seed = self.seed;
        }
        if self.no_melody {
            s.melody = false;
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) images: PathBuf,
    pub(crate) canvas_width: Option<u32>,
    pub(crate) canvas_height: Option<u32>,
    pub(crate) block: u32,
    pub(crate) fps: u32,
    pub(crate) intro_hold_secs: f32,
    pub(crate) falling_batch: usize,
    pub(crate) gravity: f32,
    pub(crate) flying_jitter: f32,
    pub(crate) tornado_steps: u32,
    pub(crate) flash_reps: u32,
    pub(crate) flash_ms: u64,
    pub(crate) explosion_frames: u32,
    pub(crate) explosion_speed: f32,
    pub(crate) explosion_decay: f32,
    pub(crate) seed: Option<u64>,
    pub(crate) melody: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            images: PathBuf::from("images"),
            canvas_width: None,
            canvas_height: None,
            block: 2,
            fps: 60,
            intro_hold_secs: 3.0,
            falling_batch: 32,
            gravity: 0.25,
            flying_jitter: 2.0,
            tornado_steps: 100,
            flash_reps: 3,
            flash_ms: 50,
            explosion_frames: 60,
            explosion_speed: 6.0,
            explosion_decay: 0.9,
            seed: None,
            melody: true,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ConfigError {
    #[error("pixel-block size must be at least 1")]
    ZeroBlock,
    #[error("frame rate must be at least 1")]
    ZeroFps,
    #[error("canvas {width}x{height} is smaller than one {block}px block")]
    CanvasTooSmall { width: u32, height: u32, block: u32 },
    #[error("gravity must be a positive number, got {0}")]
    Gravity(f32),
    #[error("explosion decay must lie in (0, 1), got {0}")]
    Decay(f32),
    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),
    #[error("{name} must be finite and at most {max} px per frame, got {value}", max = MAX_SPEED)]
    Speed { name: &'static str, value: f32 },
}

/// Upper bound for per-frame jitter and launch speed.
pub(crate) const MAX_SPEED: f32 = 1000.0;

/// Everything the phase controller needs, resolved to frames and canvas
/// pixels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Choreography {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) cols: usize,
    pub(crate) rows: usize,
    pub(crate) physics: Physics,
    pub(crate) intro_frames: u32,
    pub(crate) falling_batch: usize,
    pub(crate) tornado_steps: u32,
    pub(crate) flash_reps: u32,
    pub(crate) flash_frames: u32,
    pub(crate) explosion_frames: u32,
    pub(crate) explosion_speed: f32,
    pub(crate) fps: u32,
}

impl Choreography {
    /// Rough length of everything after the intro: rain release plus one
    /// full-height drop, the sweep, the flash cue and the explosion.
    pub(crate) fn show_frames(&self) -> u32 {
        let cells = self.cols * self.rows;
        let release = cells.div_ceil(self.falling_batch.max(1)) as u32;
        let drop = (2.0 * self.height as f32 / self.physics.gravity).sqrt().ceil() as u32;
        release
            + drop
            + self.tornado_steps
            + self.flash_reps * 2 * self.flash_frames
            + self.explosion_frames
    }

    pub(crate) fn show_duration(&self) -> Duration {
        Duration::from_millis(self.show_frames() as u64 * 1000 / self.fps.max(1) as u64)
    }
}

impl Settings {
    pub(crate) fn frame_time(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.fps.max(1) as f32)
    }

    fn frames_for_ms(&self, ms: u64) -> u32 {
        (ms * self.fps as u64).div_ceil(1000) as u32
    }

    /// Validate and resolve against the canvas size in use. The canvas is
    /// trimmed down to a whole number of blocks.
    pub(crate) fn choreography(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Choreography, ConfigError> {
        if self.block == 0 {
            return Err(ConfigError::ZeroBlock);
        }
        if self.fps == 0 {
            return Err(ConfigError::ZeroFps);
        }
        if width < self.block || height < self.block {
            return Err(ConfigError::CanvasTooSmall {
                width,
                height,
                block: self.block,
            });
        }
        if !(self.gravity > 0.0 && self.gravity.is_finite()) {
            return Err(ConfigError::Gravity(self.gravity));
        }
        if !(self.explosion_decay > 0.0 && self.explosion_decay < 1.0) {
            return Err(ConfigError::Decay(self.explosion_decay));
        }
        if self.falling_batch == 0 {
            return Err(ConfigError::ZeroCount("falling_batch"));
        }
        if self.tornado_steps == 0 {
            return Err(ConfigError::ZeroCount("tornado_steps"));
        }
        if self.explosion_frames == 0 {
            return Err(ConfigError::ZeroCount("explosion_frames"));
        }
        for (name, value) in [
            ("flying_jitter", self.flying_jitter),
            ("explosion_speed", self.explosion_speed),
        ] {
            if !value.is_finite() || value.abs() > MAX_SPEED {
                return Err(ConfigError::Speed { name, value });
            }
        }

        let cols = (width / self.block) as usize;
        let rows = (height / self.block) as usize;
        let width = cols as u32 * self.block;
        let height = rows as u32 * self.block;

        Ok(Choreography {
            width,
            height,
            cols,
            rows,
            physics: Physics {
                block: self.block,
                floor_y: (height - self.block) as f32,
                gravity: self.gravity,
                jitter: self.flying_jitter.abs(),
                decay: self.explosion_decay,
            },
            intro_frames: self.frames_for_ms((self.intro_hold_secs.max(0.0) * 1000.0) as u64),
            falling_batch: self.falling_batch,
            tornado_steps: self.tornado_steps,
            flash_reps: self.flash_reps,
            flash_frames: self.frames_for_ms(self.flash_ms).max(1),
            explosion_frames: self.explosion_frames,
            explosion_speed: self.explosion_speed.abs(),
            fps: self.fps,
        })
    }
}

pub(crate) fn load_settings(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(s) => match serde_json::from_str::<Settings>(&s) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "bad settings file, using defaults"
                );
                Settings::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "settings file unreadable, using defaults"
            );
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let s = Settings::default();
        let c = s.choreography(161, 97).expect("valid defaults");
        assert_eq!((c.cols, c.rows), (80, 48));
        assert_eq!((c.width, c.height), (160, 96));
        assert_eq!(c.physics.floor_y, 94.0);
        assert_eq!(c.intro_frames, 180);
        assert_eq!(c.flash_frames, 3);
        // 120 release + 28 drop + 100 sweep + 18 flash + 60 explosion
        assert_eq!(c.show_frames(), 326);
        assert_eq!(c.show_duration(), Duration::from_millis(5433));
    }

    #[test]
    fn rejects_bad_values() {
        let mut s = Settings::default();
        s.block = 0;
        assert_eq!(s.choreography(10, 10).unwrap_err(), ConfigError::ZeroBlock);

        let mut s = Settings::default();
        s.explosion_decay = 1.0;
        assert_eq!(s.choreography(10, 10).unwrap_err(), ConfigError::Decay(1.0));

        let mut s = Settings::default();
        s.gravity = 0.0;
        assert!(matches!(s.choreography(10, 10), Err(ConfigError::Gravity(_))));

        let s = Settings::default();
        assert!(matches!(
            s.choreography(1, 10),
            Err(ConfigError::CanvasTooSmall { .. })
        ));
    }

    #[test]
    fn rejects_runaway_speeds() {
        let s: Settings = serde_json::from_str(r#"{ "flying_jitter": 3e38 }"#).expect("parse");
        assert!(matches!(
            s.choreography(80, 48),
            Err(ConfigError::Speed { name: "flying_jitter", .. })
        ));

        let mut s = Settings::default();
        s.explosion_speed = f32::NAN;
        assert!(matches!(
            s.choreography(80, 48),
            Err(ConfigError::Speed { name: "explosion_speed", .. })
        ));

        let mut s = Settings::default();
        s.explosion_speed = -MAX_SPEED;
        s.flying_jitter = MAX_SPEED;
        assert!(s.choreography(80, 48).is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: Settings = serde_json::from_str(r#"{ "block": 4, "fps": 30 }"#).expect("parse");
        assert_eq!(s.block, 4);
        assert_eq!(s.fps, 30);
        assert_eq!(s.tornado_steps, Settings::default().tornado_steps);
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from(["pixelstorm", "--fps", "24", "--seed", "9", "--no-melody"]);
        let mut s = Settings::default();
        cli.apply(&mut s);
        assert_eq!(s.fps, 24);
        assert_eq!(s.seed, Some(9));
        assert!(!s.melody);
        assert_eq!(s.block, 2);
    }

    #[test]
    fn missing_settings_file_falls_back() {
        let s = load_settings(Path::new("/definitely/not/here.json"));
        assert_eq!(s, Settings::default());
    }
}
