use crate::canvas::Rgb;
use crate::config::Choreography;
use crate::occupancy::OccupancyGrid;
use crate::particle::{Particle, Physics, Regime};
use crate::source::SourceGrid;
use rand::{seq::SliceRandom, Rng};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Intro,
    Falling,
    Tornado,
    Explosion,
    Done,
}

/// Edge the tornado sweeps in from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Sweep {
    Left,
    Right,
    Top,
    Bottom,
}

impl Sweep {
    pub(crate) const ALL: [Sweep; 4] = [Sweep::Left, Sweep::Right, Sweep::Top, Sweep::Bottom];

    /// Threshold coordinate after `step` of `steps`.
    pub(crate) fn threshold(self, step: u32, steps: u32, width: u32, height: u32) -> f32 {
        let t = step as f32 / steps.max(1) as f32;
        match self {
            Sweep::Left => width as f32 * t,
            Sweep::Top => height as f32 * t,
            Sweep::Right => width as f32 * (1.0 - t),
            Sweep::Bottom => height as f32 * (1.0 - t),
        }
    }

    /// Whether the threshold has reached the particle's block: its leading
    /// edge for left/top sweeps, its trailing edge for right/bottom ones.
    pub(crate) fn passed(self, threshold: f32, p: &Particle) -> bool {
        let extent = p.size as f32;
        match self {
            Sweep::Left => p.x < threshold,
            Sweep::Top => p.y < threshold,
            Sweep::Right => p.x + extent > threshold,
            Sweep::Bottom => p.y + extent > threshold,
        }
    }
}

/// Falling phase: staggered introduction of particles onto a growing heap.
pub(crate) struct Rain {
    order: Vec<(usize, usize)>,
    introduced: usize,
    batch: usize,
    ground: OccupancyGrid,
}

impl Rain {
    pub(crate) fn new<R: Rng + ?Sized>(source: &SourceGrid, batch: usize, rng: &mut R) -> Self {
        let mut order: Vec<(usize, usize)> = (0..source.rows())
            .flat_map(|y| (0..source.cols()).map(move |x| (x, y)))
            .collect();
        order.shuffle(rng);
        Self {
            order,
            introduced: 0,
            batch: batch.max(1),
            ground: OccupancyGrid::new(source.cols(), source.rows()),
        }
    }

    pub(crate) fn ground(&self) -> &OccupancyGrid {
        &self.ground
    }

    pub(crate) fn pending(&self) -> usize {
        self.order.len() - self.introduced
    }

    /// One frame: release the next batch, then move everything released so
    /// far. Returns true once every cell is released and has landed.
    pub(crate) fn frame<R: Rng + ?Sized>(
        &mut self,
        source: &mut SourceGrid,
        particles: &mut Vec<Particle>,
        physics: &Physics,
        rng: &mut R,
    ) -> bool {
        if self.introduced < self.order.len() {
            let end = (self.introduced + self.batch).min(self.order.len());
            for &(cx, cy) in &self.order[self.introduced..end] {
                if let Some(color) = source.take(cx, cy) {
                    let x = (cx as u32 * physics.block) as f32;
                    let y = (cy as u32 * physics.block) as f32;
                    particles.push(Particle::new(x, y, color, physics.block));
                }
            }
            tracing::trace!(from = self.introduced, to = end, "released batch");
            self.introduced = end;
        }

        for p in particles.iter_mut() {
            p.update(Some(&mut self.ground), physics, rng);
        }

        self.pending() == 0 && particles.iter().all(|p| p.regime() == Regime::Landed)
    }
}

/// Tornado phase: a threshold sweeps across the canvas and lifts everything
/// it passes.
pub(crate) struct Tornado {
    sweep: Sweep,
    step: u32,
    steps: u32,
    width: u32,
    height: u32,
}

impl Tornado {
    pub(crate) fn new(sweep: Sweep, steps: u32, width: u32, height: u32) -> Self {
        Self {
            sweep,
            step: 0,
            steps: steps.max(1),
            width,
            height,
        }
    }

    #[cfg(test)]
    pub(crate) fn sweep(&self) -> Sweep {
        self.sweep
    }

    pub(crate) fn frame<R: Rng + ?Sized>(
        &mut self,
        particles: &mut [Particle],
        physics: &Physics,
        rng: &mut R,
    ) -> bool {
        self.step = (self.step + 1).min(self.steps);
        let threshold = self
            .sweep
            .threshold(self.step, self.steps, self.width, self.height);

        let mut lifted = 0usize;
        for p in particles.iter_mut() {
            if p.regime() != Regime::Flying && self.sweep.passed(threshold, p) && p.promote_flying()
            {
                lifted += 1;
            }
        }
        if lifted > 0 {
            tracing::trace!(step = self.step, threshold, lifted, "tornado lift");
        }

        for p in particles.iter_mut() {
            p.update(None, physics, rng);
        }
        self.step >= self.steps
    }
}

/// Explosion phase: a flash cue, then every particle is launched outward and
/// fades away.
pub(crate) struct Blast {
    frame: u32,
    flash_frames: u32,
    flash_total: u32,
    frames: u32,
    speed: f32,
    ignited: bool,
    flash: Option<Rgb>,
}

impl Blast {
    pub(crate) fn new(flash_reps: u32, flash_frames: u32, frames: u32, speed: f32) -> Self {
        let flash_frames = flash_frames.max(1);
        Self {
            frame: 0,
            flash_frames,
            flash_total: flash_reps * 2 * flash_frames,
            frames: frames.max(1),
            speed,
            ignited: false,
            flash: None,
        }
    }

    /// Flash color shown for the current frame, if still in the cue.
    pub(crate) fn flash(&self) -> Option<Rgb> {
        self.flash
    }

    pub(crate) fn frame<R: Rng + ?Sized>(
        &mut self,
        particles: &mut [Particle],
        physics: &Physics,
        rng: &mut R,
    ) -> bool {
        self.frame += 1;
        if self.frame <= self.flash_total {
            let half = (self.frame - 1) / self.flash_frames;
            self.flash = Some(if half % 2 == 0 { Rgb::WHITE } else { Rgb::BLACK });
            return false;
        }
        self.flash = None;

        if !self.ignited {
            let s = self.speed;
            for p in particles.iter_mut() {
                let (vx, vy) = if s > 0.0 {
                    (rng.gen_range(-s..=s), rng.gen_range(-s..=s))
                } else {
                    (0.0, 0.0)
                };
                p.ignite(vx, vy, self.frames, physics.block);
            }
            self.ignited = true;
            tracing::debug!(particles = particles.len(), "ignited");
        }

        for p in particles.iter_mut() {
            p.update(None, physics, rng);
        }
        self.frame - self.flash_total >= self.frames
    }
}

enum Stage {
    Intro { frame: u32 },
    Falling(Rain),
    Tornado(Tornado),
    Explosion(Blast),
    Done,
}

/// Owns the particles of one image cycle and walks them through
/// Intro → Falling → Tornado → Explosion → Done, one frame per `step`.
pub(crate) struct PhaseController<R: Rng> {
    cfg: Choreography,
    rng: R,
    stage: Stage,
    source: SourceGrid,
    particles: Vec<Particle>,
}

impl<R: Rng> PhaseController<R> {
    pub(crate) fn new(cfg: Choreography, source: SourceGrid, rng: R) -> Self {
        Self {
            cfg,
            rng,
            stage: Stage::Intro { frame: 0 },
            source,
            particles: Vec::with_capacity(cfg.cols * cfg.rows),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        match self.stage {
            Stage::Intro { .. } => Phase::Intro,
            Stage::Falling(_) => Phase::Falling,
            Stage::Tornado(_) => Phase::Tornado,
            Stage::Explosion(_) => Phase::Explosion,
            Stage::Done => Phase::Done,
        }
    }

    pub(crate) fn choreography(&self) -> &Choreography {
        &self.cfg
    }

    pub(crate) fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub(crate) fn source(&self) -> &SourceGrid {
        &self.source
    }

    #[cfg(test)]
    pub(crate) fn ground(&self) -> Option<&OccupancyGrid> {
        match &self.stage {
            Stage::Falling(rain) => Some(rain.ground()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn sweep(&self) -> Option<Sweep> {
        match &self.stage {
            Stage::Tornado(t) => Some(t.sweep()),
            _ => None,
        }
    }

    pub(crate) fn flash(&self) -> Option<Rgb> {
        match &self.stage {
            Stage::Explosion(b) => b.flash(),
            _ => None,
        }
    }

    /// Advance one frame. Returns the phase entered at the end of the frame,
    /// if the current one completed.
    pub(crate) fn step(&mut self) -> Option<Phase> {
        let physics = self.cfg.physics;
        let finished = match &mut self.stage {
            Stage::Intro { frame } => {
                *frame += 1;
                *frame >= self.cfg.intro_frames
            }
            Stage::Falling(rain) => {
                rain.frame(&mut self.source, &mut self.particles, &physics, &mut self.rng)
            }
            Stage::Tornado(t) => t.frame(&mut self.particles, &physics, &mut self.rng),
            Stage::Explosion(b) => b.frame(&mut self.particles, &physics, &mut self.rng),
            Stage::Done => false,
        };
        if !finished {
            return None;
        }
        self.advance();
        Some(self.phase())
    }

    fn advance(&mut self) {
        let next = match &self.stage {
            Stage::Intro { .. } => {
                let rain = Rain::new(&self.source, self.cfg.falling_batch, &mut self.rng);
                tracing::info!(cells = rain.pending(), "falling");
                Stage::Falling(rain)
            }
            Stage::Falling(rain) => {
                tracing::debug!(
                    landed = self.particles.len(),
                    occupied = rain.ground().occupied_count(),
                    "heap settled"
                );
                let sweep = Sweep::ALL[self.rng.gen_range(0..Sweep::ALL.len())];
                tracing::info!(?sweep, "tornado");
                Stage::Tornado(Tornado::new(
                    sweep,
                    self.cfg.tornado_steps,
                    self.cfg.width,
                    self.cfg.height,
                ))
            }
            Stage::Tornado(_) => {
                tracing::info!("explosion");
                Stage::Explosion(Blast::new(
                    self.cfg.flash_reps,
                    self.cfg.flash_frames,
                    self.cfg.explosion_frames,
                    self.cfg.explosion_speed,
                ))
            }
            Stage::Explosion(_) | Stage::Done => Stage::Done,
        };
        self.stage = next;
    }

    /// Step until `Done`, with an upper bound on frames as a safety net.
    #[cfg(test)]
    pub(crate) fn run_to_done(&mut self, max_frames: usize) -> usize {
        let mut n = 0;
        while self.phase() != Phase::Done && n < max_frames {
            self.step();
            n += 1;
        }
        n
    }
}
