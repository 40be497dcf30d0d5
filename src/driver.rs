use crate::canvas::{Canvas, Rgb};
use crate::config::Choreography;
use crate::input;
use crate::melody::{Melody, MelodyTask};
use crate::particle::Regime;
use crate::phase::{Phase, PhaseController};
use crate::source::SourceGrid;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

/// Frame clock. `wait_frame` blocks until the next frame is due and reports
/// whether the user asked to stop in the meantime.
pub(crate) trait Pacer {
    fn wait_frame(&mut self) -> anyhow::Result<Flow>;
}

/// Real-time pacer: polls the keyboard while waiting out the frame budget.
pub(crate) struct FramePacer {
    frame_dt: Duration,
    next: Instant,
}

impl FramePacer {
    pub(crate) fn new(frame_dt: Duration) -> Self {
        Self {
            frame_dt,
            next: Instant::now() + frame_dt,
        }
    }
}

impl Pacer for FramePacer {
    fn wait_frame(&mut self) -> anyhow::Result<Flow> {
        let now = Instant::now();
        let budget = self.next.saturating_duration_since(now);
        // Leave the last couple of milliseconds to the spin wait.
        let poll = budget.saturating_sub(Duration::from_millis(2));
        if input::quit_requested(poll)? {
            return Ok(Flow::Quit);
        }
        spin_sleep_until(self.next);

        // Fell behind: restart the schedule instead of bursting frames.
        let now = Instant::now();
        self.next = if now > self.next + self.frame_dt {
            now + self.frame_dt
        } else {
            self.next + self.frame_dt
        };
        Ok(Flow::Continue)
    }
}

fn spin_sleep_until(end: Instant) {
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        let left = end - t;
        if left > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}

/// Render the controller's current state: flash cue, or the untouched source
/// blocks with every live particle on top in collection order.
pub(crate) fn draw_frame<C: Canvas + ?Sized, R: Rng>(ctrl: &PhaseController<R>, canvas: &mut C) {
    if let Some(color) = ctrl.flash() {
        canvas.clear(color);
        return;
    }
    canvas.clear(Rgb::BLACK);

    let block = ctrl.choreography().physics.block;
    for (x, y, color) in ctrl.source().remaining() {
        canvas.fill_rect(
            (x as u32 * block) as i32,
            (y as u32 * block) as i32,
            block,
            block,
            color,
        );
    }

    for p in ctrl.particles() {
        let (x, y) = (p.x.floor() as i32, p.y.floor() as i32);
        match p.regime() {
            Regime::Exploding => {
                if !p.is_spent() {
                    canvas.fill_rect_rgba(x, y, p.size, p.size, p.color(), p.alpha);
                }
            }
            Regime::Falling | Regime::Landed | Regime::Flying => {
                canvas.fill_rect(x, y, p.size, p.size, p.color());
            }
        }
    }
}

/// Fixed-rate loop around the phase controller: step, draw, present, pace.
pub(crate) struct FrameDriver<C: Canvas, P: Pacer, R: Rng> {
    canvas: C,
    pacer: P,
    rng: R,
    cfg: Choreography,
    melody_rt: Option<Handle>,
    frames: u64,
}

impl<C: Canvas, P: Pacer, R: Rng> FrameDriver<C, P, R> {
    pub(crate) fn new(
        canvas: C,
        pacer: P,
        rng: R,
        cfg: Choreography,
        melody_rt: Option<Handle>,
    ) -> Self {
        Self {
            canvas,
            pacer,
            rng,
            cfg,
            melody_rt,
            frames: 0,
        }
    }

    pub(crate) fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    pub(crate) fn choreography(&self) -> &Choreography {
        &self.cfg
    }

    #[cfg(test)]
    pub(crate) fn frames(&self) -> u64 {
        self.frames
    }

    pub(crate) fn into_canvas(self) -> C {
        self.canvas
    }

    fn show(&mut self) -> anyhow::Result<Flow> {
        self.canvas.present()?;
        self.frames += 1;
        self.pacer.wait_frame()
    }

    /// Animate one image from intro to the closing flash. The melody, if
    /// any, starts once the intro hold is over and is joined before
    /// returning.
    pub(crate) fn run_cycle(
        &mut self,
        grid: SourceGrid,
        melody: Option<Melody>,
    ) -> anyhow::Result<Flow> {
        anyhow::ensure!(
            grid.cols() == self.cfg.cols && grid.rows() == self.cfg.rows,
            "source grid is {}x{}, canvas holds {}x{} blocks",
            grid.cols(),
            grid.rows(),
            self.cfg.cols,
            self.cfg.rows
        );
        anyhow::ensure!(
            self.canvas.size() == (self.cfg.width, self.cfg.height),
            "canvas size does not match the configured {}x{}",
            self.cfg.width,
            self.cfg.height
        );
        tracing::info!(blocks = grid.len(), "cycle start");

        let mut melody = melody;
        let mut task: Option<MelodyTask> = None;
        let mut ctrl = PhaseController::new(self.cfg, grid, &mut self.rng);

        loop {
            let entered = ctrl.step();
            draw_frame(&ctrl, &mut self.canvas);

            if entered == Some(Phase::Falling) {
                if let (Some(m), Some(rt)) = (melody.take(), self.melody_rt.as_ref()) {
                    task = Some(MelodyTask::spawn(rt, m));
                }
            }

            if entered == Some(Phase::Done) {
                break;
            }

            self.canvas.present()?;
            self.frames += 1;
            if self.pacer.wait_frame()? == Flow::Quit {
                if let Some(t) = task {
                    t.abort();
                }
                return Ok(Flow::Quit);
            }
        }
        drop(ctrl);

        // Closing cue before the next image.
        for color in [Rgb::WHITE, Rgb::BLACK] {
            self.canvas.clear(color);
            if self.show()? == Flow::Quit {
                if let Some(t) = task {
                    t.abort();
                }
                return Ok(Flow::Quit);
            }
        }

        if let Some(t) = task {
            while !t.is_finished() {
                if self.pacer.wait_frame()? == Flow::Quit {
                    t.abort();
                    return Ok(Flow::Quit);
                }
            }
            t.wait()?;
        }
        tracing::info!(frames = self.frames, "cycle done");
        Ok(Flow::Continue)
    }
}
