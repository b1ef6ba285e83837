//! Decorative arcs between airport hubs, independent of the live feed.
//!
//! Every arc runs `Waiting -> Growing -> Hold -> Fading` and is dropped once
//! fully faded. Sparks burst from the destination when the arc enters `Hold`.

use std::f64::consts::{PI, TAU};

use foundation::math::{GLOBE_RADIUS, GeoPoint, Vec3, any_perpendicular, slerp_unit, unit_normal};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

/// Major hubs used as arc endpoints.
pub const HUB_ANCHORS: [GeoPoint; 24] = [
    GeoPoint { lat_deg: 40.64, lng_deg: -73.78 },   // JFK
    GeoPoint { lat_deg: 33.94, lng_deg: -118.41 },  // LAX
    GeoPoint { lat_deg: 41.97, lng_deg: -87.91 },   // ORD
    GeoPoint { lat_deg: 33.64, lng_deg: -84.43 },   // ATL
    GeoPoint { lat_deg: 49.19, lng_deg: -123.18 },  // YVR
    GeoPoint { lat_deg: 19.44, lng_deg: -99.07 },   // MEX
    GeoPoint { lat_deg: -23.43, lng_deg: -46.47 },  // GRU
    GeoPoint { lat_deg: -34.82, lng_deg: -58.54 },  // EZE
    GeoPoint { lat_deg: 51.47, lng_deg: -0.45 },    // LHR
    GeoPoint { lat_deg: 49.01, lng_deg: 2.55 },     // CDG
    GeoPoint { lat_deg: 50.04, lng_deg: 8.56 },     // FRA
    GeoPoint { lat_deg: 52.31, lng_deg: 4.76 },     // AMS
    GeoPoint { lat_deg: 40.98, lng_deg: 28.82 },    // IST
    GeoPoint { lat_deg: 25.25, lng_deg: 55.36 },    // DXB
    GeoPoint { lat_deg: 30.12, lng_deg: 31.41 },    // CAI
    GeoPoint { lat_deg: -26.14, lng_deg: 28.24 },   // JNB
    GeoPoint { lat_deg: -1.32, lng_deg: 36.93 },    // NBO
    GeoPoint { lat_deg: 28.56, lng_deg: 77.10 },    // DEL
    GeoPoint { lat_deg: 1.36, lng_deg: 103.99 },    // SIN
    GeoPoint { lat_deg: 22.31, lng_deg: 113.92 },   // HKG
    GeoPoint { lat_deg: 40.08, lng_deg: 116.58 },   // PEK
    GeoPoint { lat_deg: 35.55, lng_deg: 139.78 },   // HND
    GeoPoint { lat_deg: -33.94, lng_deg: 151.18 },  // SYD
    GeoPoint { lat_deg: -37.01, lng_deg: 174.79 },  // AKL
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FxConfig {
    pub enabled: bool,
    pub spawn_interval_s: f64,
    pub min_batch: usize,
    pub max_batch: usize,
    pub max_active_arcs: usize,
    /// Upper bound of the random delay before a new arc starts growing.
    pub max_wait_s: f64,
    pub grow_s: f64,
    pub hold_s: f64,
    pub fade_s: f64,
    pub trail_particles: usize,
    /// Scattered sparks per burst, on top of the single core spark.
    pub sparks: usize,
    pub spark_speed_min: f64,
    pub spark_speed_max: f64,
    /// Surface lift of the arc endpoints, in globe radii.
    pub base_lift: f64,
    /// Peak height of an antipodal arc, in globe radii.
    pub arc_height: f64,
    pub segments: usize,
    pub arc_color: [f32; 4],
    pub trail_color: [f32; 4],
    pub spark_color: [f32; 4],
    pub core_color: [f32; 4],
    pub seed: u64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spawn_interval_s: 2.4,
            min_batch: 2,
            max_batch: 4,
            max_active_arcs: 14,
            max_wait_s: 1.2,
            grow_s: 1.6,
            hold_s: 0.9,
            fade_s: 1.1,
            trail_particles: 16,
            sparks: 8,
            spark_speed_min: 0.02,
            spark_speed_max: 0.07,
            base_lift: 0.002,
            arc_height: 0.22,
            segments: 48,
            arc_color: [0.35, 0.8, 1.0, 0.9],
            trail_color: [0.7, 0.95, 1.0, 1.0],
            spark_color: [1.0, 0.85, 0.5, 1.0],
            core_color: [1.0, 1.0, 0.9, 1.0],
            seed: 0x5eed_a1c5,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ArcPhase {
    Waiting { remaining_s: f64 },
    Growing { elapsed_s: f64 },
    Hold { elapsed_s: f64 },
    Fading { elapsed_s: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Spark {
    pub position: Vec3,
    pub velocity: Vec3,
    pub core: bool,
}

#[derive(Debug, Clone)]
pub struct AmbientArc {
    from: Vec3,
    to: Vec3,
    height: f64,
    phase: ArcPhase,
    trail: Vec<Vec3>,
    sparks: Vec<Spark>,
}

impl AmbientArc {
    pub fn new(from: GeoPoint, to: GeoPoint, wait_s: f64, cfg: &FxConfig) -> Self {
        let from = unit_normal(from.lat_deg, from.lng_deg);
        let to = unit_normal(to.lat_deg, to.lng_deg);
        let angle = from.dot(to).clamp(-1.0, 1.0).acos();
        Self {
            from,
            to,
            height: cfg.arc_height * (0.25 + 0.75 * angle / PI),
            phase: ArcPhase::Waiting {
                remaining_s: wait_s.max(0.0),
            },
            trail: Vec::with_capacity(cfg.trail_particles),
            sparks: Vec::new(),
        }
    }

    pub fn phase(&self) -> ArcPhase {
        self.phase
    }

    pub fn sparks(&self) -> &[Spark] {
        &self.sparks
    }

    pub fn trail(&self) -> &[Vec3] {
        &self.trail
    }

    /// Point on the lifted great circle at parameter `t` in [0, 1].
    pub fn point_at(&self, t: f64, base_lift: f64) -> Vec3 {
        let dir = slerp_unit(self.from, self.to, t);
        let lift = base_lift + self.height * (PI * t).sin();
        dir * (GLOBE_RADIUS * (1.0 + lift))
    }

    /// Drawn fraction of the curve.
    pub fn progress(&self, cfg: &FxConfig) -> f64 {
        match self.phase {
            ArcPhase::Waiting { .. } => 0.0,
            ArcPhase::Growing { elapsed_s } if cfg.grow_s > 0.0 => {
                (elapsed_s / cfg.grow_s).clamp(0.0, 1.0)
            }
            _ => 1.0,
        }
    }

    pub fn opacity(&self, cfg: &FxConfig) -> f64 {
        match self.phase {
            ArcPhase::Waiting { .. } => 0.0,
            ArcPhase::Growing { .. } | ArcPhase::Hold { .. } => 1.0,
            ArcPhase::Fading { elapsed_s } if cfg.fade_s > 0.0 => {
                (1.0 - elapsed_s / cfg.fade_s).clamp(0.0, 1.0)
            }
            ArcPhase::Fading { .. } => 0.0,
        }
    }

    /// Advances the lifecycle by `dt_s`; returns `false` once fully faded.
    pub fn advance(&mut self, dt_s: f64, cfg: &FxConfig, rng: &mut SmallRng) -> bool {
        let dt = dt_s.max(0.0);
        let mut left = dt;
        loop {
            match self.phase {
                ArcPhase::Waiting { remaining_s } => {
                    if left < remaining_s {
                        self.phase = ArcPhase::Waiting {
                            remaining_s: remaining_s - left,
                        };
                        break;
                    }
                    left -= remaining_s;
                    self.phase = ArcPhase::Growing { elapsed_s: 0.0 };
                }
                ArcPhase::Growing { elapsed_s } => {
                    let e = elapsed_s + left;
                    if e < cfg.grow_s {
                        self.phase = ArcPhase::Growing { elapsed_s: e };
                        break;
                    }
                    left = e - cfg.grow_s;
                    self.emit_sparks(cfg, rng);
                    self.phase = ArcPhase::Hold { elapsed_s: 0.0 };
                }
                ArcPhase::Hold { elapsed_s } => {
                    let e = elapsed_s + left;
                    if e < cfg.hold_s {
                        self.phase = ArcPhase::Hold { elapsed_s: e };
                        break;
                    }
                    left = e - cfg.hold_s;
                    self.phase = ArcPhase::Fading { elapsed_s: 0.0 };
                }
                ArcPhase::Fading { elapsed_s } => {
                    let e = elapsed_s + left;
                    if e >= cfg.fade_s {
                        self.trail.clear();
                        self.sparks.clear();
                        return false;
                    }
                    self.phase = ArcPhase::Fading { elapsed_s: e };
                    break;
                }
            }
        }

        for spark in &mut self.sparks {
            spark.position += spark.velocity * dt;
        }
        self.sample_trail(cfg);
        true
    }

    fn sample_trail(&mut self, cfg: &FxConfig) {
        self.trail.clear();
        if matches!(self.phase, ArcPhase::Waiting { .. }) || cfg.trail_particles == 0 {
            return;
        }
        let progress = self.progress(cfg);
        let n = cfg.trail_particles;
        for k in 0..n {
            let t = progress * (k + 1) as f64 / n as f64;
            self.trail.push(self.point_at(t, cfg.base_lift));
        }
    }

    fn emit_sparks(&mut self, cfg: &FxConfig, rng: &mut SmallRng) {
        let origin = self.point_at(1.0, cfg.base_lift);
        let normal = self.to;
        let t1 = any_perpendicular(normal);
        let t2 = normal.cross(t1);

        self.sparks.clear();
        self.sparks.push(Spark {
            position: origin,
            velocity: Vec3::ZERO,
            core: true,
        });
        let (lo, hi) = ordered(cfg.spark_speed_min, cfg.spark_speed_max);
        for _ in 0..cfg.sparks {
            let theta = rng.gen_range(0.0..TAU);
            let speed = rng.gen_range(lo..=hi);
            let (s, c) = theta.sin_cos();
            self.sparks.push(Spark {
                position: origin,
                velocity: (t1 * c + t2 * s) * speed,
                core: false,
            });
        }
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FxVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

/// Camera-facing particle, sized in pixels.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FxSprite {
    pub position: [f32; 3],
    pub size_px: f32,
    pub color: [f32; 4],
}

/// Reused output buffers for [`AmbientFx::write_geometry`].
#[derive(Debug, Clone, Default)]
pub struct FxGeometry {
    /// Line list.
    pub lines: Vec<FxVertex>,
    pub sprites: Vec<FxSprite>,
}

pub struct AmbientFx {
    config: FxConfig,
    rng: SmallRng,
    arcs: Vec<AmbientArc>,
    until_spawn_s: f64,
}

impl std::fmt::Debug for AmbientFx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientFx")
            .field("arcs", &self.arcs.len())
            .field("until_spawn_s", &self.until_spawn_s)
            .finish()
    }
}

impl AmbientFx {
    pub fn new(config: FxConfig) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            arcs: Vec::new(),
            until_spawn_s: 0.0,
        }
    }

    pub fn config(&self) -> &FxConfig {
        &self.config
    }

    pub fn arcs(&self) -> &[AmbientArc] {
        &self.arcs
    }

    pub fn advance(&mut self, dt_s: f64) {
        if !self.config.enabled {
            self.arcs.clear();
            return;
        }
        let dt = dt_s.max(0.0);
        let config = &self.config;
        let rng = &mut self.rng;
        self.arcs.retain_mut(|arc| arc.advance(dt, config, rng));

        self.until_spawn_s -= dt;
        if self.until_spawn_s <= 0.0 {
            self.spawn_batch();
            let interval = self.config.spawn_interval_s.max(0.0);
            // Catch up at most one interval; a stalled frame never floods arcs.
            self.until_spawn_s = (self.until_spawn_s + interval).max(0.0).min(interval);
            if self.until_spawn_s <= 0.0 {
                self.until_spawn_s = interval;
            }
        }
    }

    fn spawn_batch(&mut self) {
        let anchors = &HUB_ANCHORS;
        if anchors.len() < 2 {
            return;
        }
        let (lo, hi) = (
            self.config.min_batch.min(self.config.max_batch),
            self.config.max_batch.max(self.config.min_batch),
        );
        let count = self.rng.gen_range(lo..=hi);
        for _ in 0..count {
            if self.arcs.len() >= self.config.max_active_arcs {
                break;
            }
            let a = self.rng.gen_range(0..anchors.len());
            let mut b = self.rng.gen_range(0..anchors.len() - 1);
            if b >= a {
                b += 1;
            }
            let wait = self.rng.gen_range(0.0..=self.config.max_wait_s.max(0.0));
            self.arcs
                .push(AmbientArc::new(anchors[a], anchors[b], wait, &self.config));
        }
    }

    /// Writes arc lines, trail particles, and sparks for the current state.
    pub fn write_geometry(&self, out: &mut FxGeometry) {
        out.lines.clear();
        out.sprites.clear();
        let cfg = &self.config;

        for arc in &self.arcs {
            let opacity = arc.opacity(cfg) as f32;
            if opacity <= 0.0 {
                continue;
            }
            let progress = arc.progress(cfg);
            let steps = ((cfg.segments.max(1) as f64) * progress).ceil() as usize;
            let line_color = with_alpha(cfg.arc_color, opacity);
            let mut prev = arc.point_at(0.0, cfg.base_lift);
            for i in 1..=steps {
                let t = progress * i as f64 / steps as f64;
                let p = arc.point_at(t, cfg.base_lift);
                out.lines.push(FxVertex {
                    position: prev.to_f32(),
                    color: line_color,
                });
                out.lines.push(FxVertex {
                    position: p.to_f32(),
                    color: line_color,
                });
                prev = p;
            }

            let n = arc.trail.len().max(1) as f32;
            for (k, p) in arc.trail.iter().enumerate() {
                // Brighter and larger toward the head.
                let w = (k + 1) as f32 / n;
                out.sprites.push(FxSprite {
                    position: p.to_f32(),
                    size_px: 1.5 + 2.5 * w,
                    color: with_alpha(cfg.trail_color, opacity * w),
                });
            }

            for spark in &arc.sparks {
                let (size_px, color) = if spark.core {
                    (9.0, cfg.core_color)
                } else {
                    (3.0, cfg.spark_color)
                };
                out.sprites.push(FxSprite {
                    position: spark.position.to_f32(),
                    size_px,
                    color: with_alpha(color, opacity),
                });
            }
        }
    }
}

fn with_alpha(c: [f32; 4], opacity: f32) -> [f32; 4] {
    [c[0], c[1], c[2], c[3] * opacity]
}
