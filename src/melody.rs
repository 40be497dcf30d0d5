use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use tokio::{runtime::Handle, task::JoinHandle};

/// Major pentatonic degrees, two octaves.
const SCALE: [u8; 10] = [0, 2, 4, 7, 9, 12, 14, 16, 19, 21];
const RHYTHM_MS: [u64; 5] = [125, 250, 250, 375, 500];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Note {
    /// MIDI note number; `None` is a rest.
    pub(crate) pitch: Option<u8>,
    pub(crate) duration: Duration,
}

impl Note {
    pub(crate) fn frequency(&self) -> Option<f32> {
        self.pitch
            .map(|p| 440.0 * 2f32.powf((p as f32 - 69.0) / 12.0))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Melody {
    notes: Vec<Note>,
}

impl Melody {
    #[cfg(test)]
    pub(crate) fn new(notes: Vec<Note>) -> Self {
        Self { notes }
    }

    /// Derive a tune from an image content hash. The same hash always gives
    /// the same tune; it runs at least `length` long.
    pub(crate) fn from_digest(digest: [u8; 16], length: Duration) -> Self {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&digest[..8]);
        hi.copy_from_slice(&digest[8..]);
        let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(lo) ^ u64::from_le_bytes(hi));

        let root = 48 + digest[0] % 12;
        let mut degree = rng.gen_range(0..SCALE.len() as i32);
        let mut notes = Vec::new();
        let mut total = Duration::ZERO;
        while total < length {
            let duration = Duration::from_millis(RHYTHM_MS[rng.gen_range(0..RHYTHM_MS.len())]);
            let pitch = if rng.gen_ratio(1, 8) {
                None
            } else {
                degree = (degree + rng.gen_range(-2..=2)).clamp(0, SCALE.len() as i32 - 1);
                Some(root + SCALE[degree as usize])
            };
            notes.push(Note { pitch, duration });
            total += duration;
        }
        Self { notes }
    }

    pub(crate) fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub(crate) fn total(&self) -> Duration {
        self.notes.iter().map(|n| n.duration).sum()
    }
}

/// Walk the timeline in real time. There is no audio device behind this; the
/// task only keeps the tune's clock.
async fn play(melody: Melody) -> usize {
    let mut played = 0;
    for note in melody.notes {
        tracing::trace!(
            pitch = ?note.pitch,
            hz = ?note.frequency(),
            ms = note.duration.as_millis() as u64,
            "note"
        );
        tokio::time::sleep(note.duration).await;
        played += 1;
    }
    played
}

/// Background melody playback; the next cycle waits on `wait`.
pub(crate) struct MelodyTask {
    rt: Handle,
    handle: JoinHandle<usize>,
}

impl MelodyTask {
    pub(crate) fn spawn(rt: &Handle, melody: Melody) -> Self {
        tracing::debug!(
            notes = melody.notes().len(),
            total_ms = melody.total().as_millis() as u64,
            "melody start"
        );
        Self {
            rt: rt.clone(),
            handle: rt.spawn(play(melody)),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn abort(self) {
        self.handle.abort();
    }

    /// Block until the tune ends. Must not be called from inside the runtime.
    pub(crate) fn wait(self) -> anyhow::Result<usize> {
        let played = self
            .rt
            .block_on(self.handle)
            .context("melody task failed")?;
        tracing::debug!(played, "melody done");
        Ok(played)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn digest_decides_the_tune() {
        let a = Melody::from_digest([7; 16], Duration::from_secs(4));
        let b = Melody::from_digest([7; 16], Duration::from_secs(4));
        let mut other = [7; 16];
        other[3] = 8;
        let c = Melody::from_digest(other, Duration::from_secs(4));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tune_covers_requested_length() {
        let m = Melody::from_digest([1; 16], Duration::from_secs(3));
        assert!(m.total() >= Duration::from_secs(3));
        assert!(m.total() < Duration::from_millis(3500));
        for n in m.notes() {
            if let Some(p) = n.pitch {
                assert!((48..=80).contains(&p));
            }
        }
    }

    #[test]
    fn empty_length_gives_empty_tune() {
        let m = Melody::from_digest([0; 16], Duration::ZERO);
        assert!(m.notes().is_empty());
        assert_eq!(m.total(), Duration::ZERO);
    }

    #[test]
    fn a4_is_440() {
        let n = Note {
            pitch: Some(69),
            duration: Duration::ZERO,
        };
        assert_eq!(n.frequency(), Some(440.0));
    }

    #[tokio::test]
    async fn play_walks_every_note() {
        let m = Melody::new(vec![
            Note {
                pitch: Some(60),
                duration: Duration::from_millis(5),
            },
            Note {
                pitch: None,
                duration: Duration::from_millis(5),
            },
        ]);
        let start = Instant::now();
        assert_eq!(play(m).await, 2);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn wait_joins_the_task() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .expect("runtime");
        let m = Melody::new(vec![
            Note {
                pitch: Some(64),
                duration: Duration::from_millis(20),
            };
            3
        ]);
        let task = MelodyTask::spawn(rt.handle(), m);
        assert_eq!(task.wait().expect("join"), 3);
    }
}
