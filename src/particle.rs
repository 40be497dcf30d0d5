use crate::canvas::Rgb;
use crate::occupancy::OccupancyGrid;
use rand::Rng;

/// Motion mode of a particle. Exactly one applies at a time, and a particle
/// only ever moves forward through these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Regime {
    Falling,
    Landed,
    Flying,
    Exploding,
}

/// Per-run motion constants shared by every particle.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Physics {
    pub(crate) block: u32,
    /// Lowest y a block may occupy: canvas height minus one block.
    pub(crate) floor_y: f32,
    pub(crate) gravity: f32,
    pub(crate) jitter: f32,
    pub(crate) decay: f32,
}

#[derive(Clone, Debug)]
pub(crate) struct Particle {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) vx: f32,
    pub(crate) vy: f32,
    color: Rgb,
    regime: Regime,
    pub(crate) size: u32,
    pub(crate) alpha: u8,
    fade: u8,
    life: u32,
    life_total: u32,
}

impl Particle {
    pub(crate) fn new(x: f32, y: f32, color: Rgb, size: u32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            color,
            regime: Regime::Falling,
            size,
            alpha: 255,
            fade: 0,
            life: 0,
            life_total: 0,
        }
    }

    pub(crate) fn color(&self) -> Rgb {
        self.color
    }

    pub(crate) fn regime(&self) -> Regime {
        self.regime
    }

    /// Faded out during the explosion; kept in place but no longer drawn.
    pub(crate) fn is_spent(&self) -> bool {
        self.regime == Regime::Exploding && self.alpha == 0
    }

    /// Hand the particle to the tornado. Returns false if it is already
    /// airborne or exploding.
    pub(crate) fn promote_flying(&mut self) -> bool {
        match self.regime {
            Regime::Falling | Regime::Landed => {
                self.regime = Regime::Flying;
                self.vx = 0.0;
                self.vy = 0.0;
                true
            }
            Regime::Flying | Regime::Exploding => false,
        }
    }

    /// Start the explosion: fully opaque, launched with `(vx, vy)`, fading out
    /// over `frames` updates.
    pub(crate) fn ignite(&mut self, vx: f32, vy: f32, frames: u32, block: u32) {
        let frames = frames.max(1);
        self.regime = Regime::Exploding;
        self.vx = vx;
        self.vy = vy;
        self.alpha = 255;
        self.size = block;
        self.fade = (255 / frames).min(255) as u8;
        self.life = frames;
        self.life_total = frames;
    }

    pub(crate) fn update<R: Rng + ?Sized>(
        &mut self,
        ground: Option<&mut OccupancyGrid>,
        physics: &Physics,
        rng: &mut R,
    ) {
        match self.regime {
            Regime::Exploding => self.explode(physics, rng),
            Regime::Flying => self.drift(physics, rng),
            Regime::Landed => {}
            Regime::Falling => self.fall(ground, physics),
        }
    }

    fn fall(&mut self, ground: Option<&mut OccupancyGrid>, physics: &Physics) {
        self.vy += physics.gravity;
        let next_y = self.y + self.vy;
        let hit_floor = next_y >= physics.floor_y;
        let block = physics.block.max(1);

        let Some(ground) = ground else {
            // No heap to stack on: only the floor arrests the fall.
            if hit_floor {
                self.y = (physics.floor_y / block as f32).floor() * block as f32;
                self.settle();
            } else {
                self.y = next_y;
            }
            return;
        };

        let (cx, cur_row) = OccupancyGrid::cell_of(self.x, self.y, block);
        let floor_row = ground.rows().saturating_sub(1);
        let cand_row = if hit_floor {
            floor_row
        } else {
            OccupancyGrid::cell_of(self.x, next_y, block).1
        };

        let blocked = ground.first_occupied(cx, cur_row, cand_row);
        if blocked.is_none() && !hit_floor {
            self.y = next_y;
            return;
        }

        // Rest directly above whatever stopped us; if a later arrival already
        // filled that cell, climb to the first free one.
        let target = match blocked {
            Some(row) => row.checked_sub(1),
            None => Some(floor_row),
        };
        match target.and_then(|row| ground.free_at_or_above(cx, row)) {
            Some(row) => {
                ground.mark(cx, row);
                self.y = (row as u32 * block) as f32;
            }
            None => {
                tracing::warn!(column = cx, "column full, landing without a cell");
                self.y = (cur_row as u32 * block) as f32;
            }
        }
        self.settle();
    }

    fn settle(&mut self) {
        self.regime = Regime::Landed;
        self.vy = 0.0;
    }

    fn drift<R: Rng + ?Sized>(&mut self, physics: &Physics, rng: &mut R) {
        let j = physics.jitter.abs();
        if j <= 0.0 {
            return;
        }
        self.x += rng.gen_range(-j..=j);
        self.y += rng.gen_range(-j..=j);
    }

    fn explode<R: Rng + ?Sized>(&mut self, physics: &Physics, rng: &mut R) {
        if self.alpha == 0 {
            return;
        }
        self.vx *= physics.decay;
        self.vy *= physics.decay;
        self.x += self.vx;
        self.y += self.vy;

        self.life = self.life.saturating_sub(1);
        self.alpha = if self.life == 0 {
            0
        } else {
            self.alpha.saturating_sub(self.fade)
        };

        let remaining = self.life as f32 / self.life_total.max(1) as f32;
        let pulse = 1.0 + 0.5 * remaining * (1.0 + rng.gen_range(-0.3..=0.3));
        self.size = ((physics.block as f32 * pulse) as u32).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn physics(block: u32, height: u32) -> Physics {
        Physics {
            block,
            floor_y: (height - block) as f32,
            gravity: 0.5,
            jitter: 2.0,
            decay: 0.9,
        }
    }

    #[test]
    fn falls_until_floor_and_marks_cell() {
        let ph = physics(4, 40);
        let mut ground = OccupancyGrid::new(10, 10);
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = Particle::new(8.0, 0.0, Rgb::WHITE, 4);

        let mut steps = 0;
        while p.regime() == Regime::Falling {
            let before = p.y;
            p.update(Some(&mut ground), &ph, &mut rng);
            assert!(p.y >= before);
            steps += 1;
            assert!(steps < 100);
        }
        assert_eq!(p.y, 36.0);
        assert!(ground.is_occupied(2, 9));
        assert_eq!(ground.occupied_count(), 1);
    }

    #[test]
    fn stacks_on_top_of_occupied_cell() {
        let ph = physics(4, 40);
        let mut ground = OccupancyGrid::new(10, 10);
        ground.mark(0, 9);
        ground.mark(0, 8);
        let mut rng = StdRng::seed_from_u64(2);
        let mut p = Particle::new(0.0, 0.0, Rgb::WHITE, 4);
        for _ in 0..200 {
            p.update(Some(&mut ground), &ph, &mut rng);
        }
        assert_eq!(p.regime(), Regime::Landed);
        assert_eq!(p.y, 28.0);
        assert!(ground.is_occupied(0, 7));
    }

    #[test]
    fn fast_particle_does_not_tunnel_into_heap() {
        let ph = physics(1, 100);
        let mut ground = OccupancyGrid::new(1, 100);
        for row in 50..100 {
            ground.mark(0, row);
        }
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = Particle::new(0.0, 40.0, Rgb::WHITE, 1);
        p.vy = 30.0;
        p.update(Some(&mut ground), &ph, &mut rng);
        assert_eq!(p.regime(), Regime::Landed);
        assert_eq!(p.y, 49.0);
    }

    #[test]
    fn overlapped_cell_climbs_to_free_cell() {
        let ph = physics(1, 10);
        let mut ground = OccupancyGrid::new(1, 10);
        ground.mark(0, 9);
        ground.mark(0, 8);
        let mut rng = StdRng::seed_from_u64(4);
        let mut p = Particle::new(0.0, 8.0, Rgb::WHITE, 1);
        p.update(Some(&mut ground), &ph, &mut rng);
        assert_eq!(p.regime(), Regime::Landed);
        assert_eq!(p.y, 7.0);
        assert!(ground.is_occupied(0, 7));
    }

    #[test]
    fn landed_is_frame_invariant() {
        let ph = physics(2, 20);
        let mut ground = OccupancyGrid::new(10, 10);
        let mut rng = StdRng::seed_from_u64(5);
        let mut p = Particle::new(4.0, 10.0, Rgb::WHITE, 2);
        while p.regime() == Regime::Falling {
            p.update(Some(&mut ground), &ph, &mut rng);
        }
        let (x, y) = (p.x, p.y);
        for _ in 0..50 {
            p.update(Some(&mut ground), &ph, &mut rng);
            assert_eq!((p.x, p.y), (x, y));
        }
        assert_eq!(ground.occupied_count(), 1);
    }

    #[test]
    fn flying_jitter_is_bounded() {
        let ph = physics(2, 20);
        let mut rng = StdRng::seed_from_u64(6);
        let mut p = Particle::new(10.0, 10.0, Rgb::WHITE, 2);
        assert!(p.promote_flying());
        for _ in 0..100 {
            let (x, y) = (p.x, p.y);
            p.update(None, &ph, &mut rng);
            assert!((p.x - x).abs() <= 2.0);
            assert!((p.y - y).abs() <= 2.0);
        }
        assert_eq!(p.regime(), Regime::Flying);
    }

    #[test]
    fn regimes_never_go_backwards() {
        let mut p = Particle::new(0.0, 0.0, Rgb::WHITE, 1);
        assert!(p.promote_flying());
        assert!(!p.promote_flying());
        p.ignite(1.0, 1.0, 10, 1);
        assert!(!p.promote_flying());
        assert_eq!(p.regime(), Regime::Exploding);
    }

    #[test]
    fn explosion_fades_to_zero_on_last_frame() {
        let ph = physics(4, 40);
        let mut rng = StdRng::seed_from_u64(7);
        let mut p = Particle::new(0.0, 0.0, Rgb::new(10, 20, 30), 4);
        p.ignite(25.0, -25.0, 60, 4);
        let mut last = p.alpha;
        for frame in 1..=60 {
            p.update(None, &ph, &mut rng);
            assert!(p.alpha <= last);
            last = p.alpha;
            if frame < 60 {
                assert_eq!(p.alpha, 255 - 4 * frame as u8);
            }
            assert!(p.size >= 1);
        }
        assert_eq!(p.alpha, 0);
        assert!(p.is_spent());

        let (x, y) = (p.x, p.y);
        p.update(None, &ph, &mut rng);
        assert_eq!((p.x, p.y), (x, y));
        assert_eq!(p.color(), Rgb::new(10, 20, 30));
    }

    proptest! {
        #[test]
        fn explosion_alpha_never_rises_and_ends_at_zero(
            frames in 1u32..200,
            vx in -30.0f32..30.0,
            vy in -30.0f32..30.0,
            seed in any::<u64>(),
        ) {
            let ph = physics(2, 20);
            let mut rng = StdRng::seed_from_u64(seed);
            let mut p = Particle::new(5.0, 5.0, Rgb::WHITE, 2);
            p.ignite(vx, vy, frames, 2);
            let mut last = p.alpha;
            for _ in 0..frames {
                p.update(None, &ph, &mut rng);
                prop_assert!(p.alpha <= last);
                last = p.alpha;
            }
            prop_assert_eq!(p.alpha, 0);
        }
    }
}
