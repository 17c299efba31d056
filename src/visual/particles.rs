//! Beat-driven shockwaves and particles.
//!
//! Entities are advanced once per display frame and dropped as soon as
//! their life or radius bounds are exceeded.

use rand::Rng;

use crate::visual::canvas::{hsl, Canvas};

pub const SHOCKWAVE_START_RADIUS: f32 = 12.0;
/// Fraction of the smaller canvas dimension a shockwave may reach.
pub const SHOCKWAVE_MAX_FRACTION: f32 = 0.55;
const SHOCKWAVE_GROWTH: f32 = 4.0;
const SHOCKWAVE_ACCELERATION: f32 = 0.03;
const SHOCKWAVE_FADE: f32 = 0.02;

const PARTICLE_LIFE_DECAY: f32 = 0.02;
const PARTICLE_SHRINK: f32 = 0.96;
const BURST_MIN: usize = 6;
const BURST_MAX: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Shockwave {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub max_radius: f32,
    pub opacity: f32,
    pub line_width: f32,
    pub hue: f32,
}

impl Shockwave {
    /// Grows and fades; returns whether it is still alive.
    pub fn advance(&mut self) -> bool {
        self.radius += SHOCKWAVE_GROWTH + self.radius * SHOCKWAVE_ACCELERATION;
        self.opacity -= SHOCKWAVE_FADE;
        self.line_width *= 0.97;
        self.opacity > 0.0 && self.radius <= self.max_radius
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
    pub size: f32,
    pub hue: f32,
}

impl Particle {
    pub fn advance(&mut self) -> bool {
        self.x += self.vx;
        self.y += self.vy;
        self.life -= PARTICLE_LIFE_DECAY;
        self.size *= PARTICLE_SHRINK;
        self.life > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct ParticleField {
    width: f32,
    height: f32,
    max_particles: usize,
    shockwaves: Vec<Shockwave>,
    particles: Vec<Particle>,
}

impl ParticleField {
    pub fn new(width: u32, height: u32, max_particles: usize) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
            max_particles,
            shockwaves: Vec::new(),
            particles: Vec::new(),
        }
    }

    pub fn shockwaves(&self) -> &[Shockwave] {
        &self.shockwaves
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn is_empty(&self) -> bool {
        self.shockwaves.is_empty() && self.particles.is_empty()
    }

    pub fn clear(&mut self) {
        self.shockwaves.clear();
        self.particles.clear();
    }

    fn centre(&self) -> (f32, f32) {
        (self.width * 0.5, self.height * 0.5)
    }

    /// One shockwave and a burst of particles from the centre, scaled by
    /// `bass` in [0, 1].
    pub fn spawn_beat<R: Rng + ?Sized>(&mut self, bass: f32, rng: &mut R) {
        let (cx, cy) = self.centre();
        let hue = rng.gen_range(180.0..320.0);
        self.shockwaves.push(Shockwave {
            x: cx,
            y: cy,
            radius: SHOCKWAVE_START_RADIUS,
            max_radius: self.width.min(self.height) * SHOCKWAVE_MAX_FRACTION,
            opacity: 1.0,
            line_width: 2.0 + 6.0 * bass,
            hue,
        });

        let count = rng.gen_range(BURST_MIN..=BURST_MAX);
        for _ in 0..count {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let speed = (2.0 + rng.gen_range(0.0..4.0)) * (0.5 + bass);
            self.push_particle(Particle {
                x: cx,
                y: cy,
                vx: angle.cos() * speed,
                vy: angle.sin() * speed,
                life: 1.0,
                size: 2.0 + rng.gen_range(0.0..3.0),
                hue: hue + rng.gen_range(-20.0..20.0),
            });
        }
    }

    /// A couple of particles drifting off a bar tip.
    pub fn spawn_tip<R: Rng + ?Sized>(&mut self, x: f32, y: f32, hue: f32, rng: &mut R) {
        let count = rng.gen_range(1..=2);
        for _ in 0..count {
            self.push_particle(Particle {
                x,
                y,
                vx: rng.gen_range(-1.0..1.0),
                vy: -rng.gen_range(0.5..2.5),
                life: 0.8,
                size: 1.5 + rng.gen_range(0.0..1.5),
                hue,
            });
        }
    }

    fn push_particle(&mut self, particle: Particle) {
        if self.particles.len() < self.max_particles {
            self.particles.push(particle);
        }
    }

    /// Advances every entity one frame and drops the dead.
    pub fn advance(&mut self) {
        self.shockwaves.retain_mut(Shockwave::advance);
        self.particles.retain_mut(Particle::advance);
    }

    pub fn draw(&self, canvas: &mut Canvas) {
        for wave in &self.shockwaves {
            canvas.stroke_ring(
                wave.x,
                wave.y,
                wave.radius,
                wave.line_width,
                hsl(wave.hue, 0.9, 0.6, wave.opacity),
            );
        }
        for p in &self.particles {
            canvas.fill_circle(p.x, p.y, p.size, hsl(p.hue, 0.9, 0.65, p.life));
        }
    }
}
