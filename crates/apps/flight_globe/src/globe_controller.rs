//! Globe camera: free orbit with drag inertia, or locked onto one entity.
//!
//! The camera itself never moves off the +Z axis; all navigation rotates the
//! globe. `orientation()` is that rotation and `distance()` the eye distance
//! from the globe center, in globe radii.
//!
//! - Free: auto-rotation, decaying drag inertia and pointer parallax.
//! - Dragging: pointer deltas map straight to yaw and pitch.
//! - Tracking: slerps toward the rotation that puts the entity in front.

use foundation::math::{
    EulerXyz, GeoPoint, Mat4, Quat, Vec3, mat4_look_at_rh, mat4_mul, mat4_perspective_rh_z0,
    unit_normal,
};
use scene::picking::CameraView;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    // ── Orbit ────────────────────────────────────────────────
    /// Radians of rotation per dragged pixel.
    pub drag_sensitivity: f64,
    /// Per-frame multiplier applied to residual drag velocity.
    pub inertia_decay: f64,
    /// Residual velocity below this (radians per frame) snaps to zero.
    pub inertia_epsilon: f64,
    /// A drag held still longer than this before release leaves no inertia.
    pub fling_window_s: f64,
    /// Absolute pitch limit in free mode, radians.
    pub pitch_limit_rad: f64,
    pub auto_rotate: bool,
    /// Auto-rotation yaw rate, radians per second.
    pub auto_rotate_rate: f64,
    /// Idle time after the last interaction before auto-rotation resumes.
    pub auto_rotate_resume_delay_s: f64,
    /// Maximum hover parallax offset, radians.
    pub parallax_strength_rad: f64,
    /// Exponential easing rate of the parallax offset, per second.
    pub parallax_ease_rate: f64,

    // ── Tracking ─────────────────────────────────────────────
    /// Slerp rate (per second) right after a selection.
    pub track_fast_rate: f64,
    pub track_slow_rate: f64,
    /// How long the fast rate applies after each new selection.
    pub track_fast_window_s: f64,
    /// Cosmetic roll about the view axis while tracking, degrees.
    pub tracking_tilt_deg: f64,

    // ── Zoom (globe radii from the center) ───────────────────
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub zoom_default: f64,
    pub zoom_tracking: f64,
    pub zoom_ease_rate: f64,
    /// Distance change per wheel delta unit.
    pub wheel_zoom_gain: f64,
    /// Distance change per pixel of pinch spread.
    pub pinch_zoom_gain: f64,

    // ── Input (CSS pixels) ───────────────────────────────────
    /// Movement beyond this turns a press into a drag.
    pub tap_threshold_px: f64,
    pub fov_y_deg: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            drag_sensitivity: 0.005,
            inertia_decay: 0.95,
            inertia_epsilon: 1e-5,
            fling_window_s: 0.08,
            pitch_limit_rad: 1.2,
            auto_rotate: true,
            auto_rotate_rate: 0.05,
            auto_rotate_resume_delay_s: 3.0,
            parallax_strength_rad: 0.03,
            parallax_ease_rate: 3.0,

            track_fast_rate: 6.0,
            track_slow_rate: 2.5,
            track_fast_window_s: 0.6,
            tracking_tilt_deg: 12.0,

            zoom_min: 1.3,
            zoom_max: 6.0,
            zoom_default: 3.0,
            zoom_tracking: 1.9,
            zoom_ease_rate: 6.0,
            wheel_zoom_gain: 0.0015,
            pinch_zoom_gain: 0.01,

            tap_threshold_px: 8.0,
            fov_y_deg: 45.0,
            near: 0.01,
            far: 100.0,
        }
    }
}

/// Free-mode rotation state: Euler XYZ offsets plus residual drag velocity.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct FreeOffsets {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    /// Residual velocity, radians per frame.
    pub vel_pitch: f64,
    pub vel_yaw: f64,
}

impl FreeOffsets {
    /// Decomposes a globe orientation so free mode resumes from it exactly.
    pub fn from_orientation(q: Quat) -> Self {
        let EulerXyz { x, y, z } = q.to_euler_xyz();
        Self {
            pitch: x,
            yaw: y,
            roll: z,
            ..Self::default()
        }
    }

    pub fn orientation(&self, parallax: [f64; 2]) -> Quat {
        Quat::from_euler_xyz(EulerXyz {
            x: self.pitch + parallax[1],
            y: self.yaw + parallax[0],
            z: self.roll,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CameraMode {
    Free(FreeOffsets),
    Dragging {
        offsets: FreeOffsets,
        last_px: [f64; 2],
        /// Time since the pointer last moved.
        still_s: f64,
    },
    Tracking { id: String, orientation: Quat, elapsed_s: f64 },
}

/// Pointer gesture in progress, independent of the camera mode.
#[derive(Debug, Copy, Clone, PartialEq)]
enum Gesture {
    Idle,
    Pressed { start_px: [f64; 2] },
    Dragging,
    Pinch { start_spread_px: f64, start_zoom: f64 },
}

#[derive(Debug, Clone)]
pub struct CameraController {
    config: CameraConfig,
    mode: CameraMode,
    gesture: Gesture,
    distance: f64,
    target_distance: f64,
    /// Zoom target to restore on deselect.
    remembered_zoom: Option<f64>,
    parallax: [f64; 2],
    parallax_target: [f64; 2],
    auto_rotate: bool,
    idle_s: f64,
    viewport_px: [f64; 2],
    /// Device pixels per CSS pixel.
    pixel_ratio: f64,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(CameraConfig::default())
    }
}

impl CameraController {
    pub fn new(config: CameraConfig) -> Self {
        let zoom = config.zoom_default.clamp(config.zoom_min, config.zoom_max);
        Self {
            auto_rotate: config.auto_rotate,
            idle_s: config.auto_rotate_resume_delay_s,
            config,
            mode: CameraMode::Free(FreeOffsets::default()),
            gesture: Gesture::Idle,
            distance: zoom,
            target_distance: zoom,
            remembered_zoom: None,
            parallax: [0.0; 2],
            parallax_target: [0.0; 2],
            viewport_px: [1280.0, 720.0],
            pixel_ratio: 1.0,
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn mode(&self) -> &CameraMode {
        &self.mode
    }

    pub fn tracked_id(&self) -> Option<&str> {
        match &self.mode {
            CameraMode::Tracking { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn orientation(&self) -> Quat {
        match &self.mode {
            CameraMode::Free(offsets) | CameraMode::Dragging { offsets, .. } => {
                offsets.orientation(self.parallax)
            }
            CameraMode::Tracking { orientation, .. } => *orientation,
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn target_distance(&self) -> f64 {
        self.target_distance
    }

    pub fn set_viewport(&mut self, width_px: f64, height_px: f64) {
        self.viewport_px = [width_px.max(1.0), height_px.max(1.0)];
    }

    /// Pointer positions arrive in device pixels; gesture thresholds and
    /// gains are in CSS pixels.
    pub fn set_pixel_ratio(&mut self, ratio: f64) {
        if ratio.is_finite() && ratio > 0.0 {
            self.pixel_ratio = ratio;
        }
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        self.auto_rotate = enabled;
    }

    // ── Selection ────────────────────────────────────────────

    /// Starts tracking `id`, or returns to free mode on `None`.
    pub fn select(&mut self, id: Option<&str>) {
        match (id, &self.mode) {
            (Some(id), CameraMode::Tracking { id: current, .. }) if current == id => {}
            (Some(id), mode) => {
                if !matches!(mode, CameraMode::Tracking { .. }) {
                    self.remembered_zoom = Some(self.target_distance);
                }
                let orientation = self.orientation();
                self.mode = CameraMode::Tracking {
                    id: id.to_string(),
                    orientation,
                    elapsed_s: 0.0,
                };
                self.target_distance = self.clamp_zoom(self.config.zoom_tracking);
                self.parallax = [0.0; 2];
                self.parallax_target = [0.0; 2];
            }
            (None, CameraMode::Tracking { orientation, .. }) => {
                self.mode = CameraMode::Free(FreeOffsets::from_orientation(*orientation));
                if let Some(zoom) = self.remembered_zoom.take() {
                    self.target_distance = self.clamp_zoom(zoom);
                }
                self.idle_s = 0.0;
            }
            (None, _) => {}
        }
    }

    // ── Zoom ─────────────────────────────────────────────────

    fn clamp_zoom(&self, d: f64) -> f64 {
        d.clamp(self.config.zoom_min, self.config.zoom_max)
    }

    /// Moves the zoom target by `delta` globe radii (positive zooms out).
    pub fn zoom_by(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        self.target_distance = self.clamp_zoom(self.target_distance + delta);
        if matches!(self.mode, CameraMode::Tracking { .. }) {
            self.remembered_zoom = None;
        }
        self.idle_s = 0.0;
    }

    pub fn on_wheel(&mut self, delta_y: f64) {
        self.zoom_by(delta_y * self.config.wheel_zoom_gain);
    }

    // ── Pointer ──────────────────────────────────────────────

    pub fn on_pointer_down(&mut self, pos_px: [f64; 2]) {
        self.gesture = Gesture::Pressed { start_px: pos_px };
        self.idle_s = 0.0;
        if let CameraMode::Free(offsets) = &mut self.mode {
            offsets.vel_pitch = 0.0;
            offsets.vel_yaw = 0.0;
        }
    }

    /// Returns `true` while the gesture is a drag, so the host can suppress
    /// default scrolling.
    pub fn on_pointer_move(&mut self, pos_px: [f64; 2]) -> bool {
        match self.gesture {
            Gesture::Pressed { start_px } => {
                let dx = pos_px[0] - start_px[0];
                let dy = pos_px[1] - start_px[1];
                if dx.hypot(dy) <= self.config.tap_threshold_px * self.pixel_ratio {
                    return false;
                }
                self.gesture = Gesture::Dragging;
                if let CameraMode::Free(offsets) = self.mode {
                    self.mode = CameraMode::Dragging {
                        offsets,
                        last_px: start_px,
                        still_s: 0.0,
                    };
                }
                self.drag_to(pos_px);
                true
            }
            Gesture::Dragging => {
                self.drag_to(pos_px);
                true
            }
            Gesture::Idle | Gesture::Pinch { .. } => false,
        }
    }

    fn drag_to(&mut self, pos_px: [f64; 2]) {
        self.idle_s = 0.0;
        let s = self.config.drag_sensitivity / self.pixel_ratio;
        let limit = self.config.pitch_limit_rad;
        if let CameraMode::Dragging {
            offsets,
            last_px,
            still_s,
        } = &mut self.mode
        {
            let d_yaw = (pos_px[0] - last_px[0]) * s;
            let d_pitch = (pos_px[1] - last_px[1]) * s;
            offsets.yaw += d_yaw;
            offsets.pitch = step_pitch(offsets.pitch, d_pitch, limit);
            offsets.vel_yaw = d_yaw;
            offsets.vel_pitch = d_pitch;
            *last_px = pos_px;
            *still_s = 0.0;
        }
    }

    /// Ends the gesture; returns the tap position when it never became a drag.
    pub fn on_pointer_up(&mut self, pos_px: [f64; 2]) -> Option<[f64; 2]> {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        if let CameraMode::Dragging {
            mut offsets,
            still_s,
            ..
        } = self.mode
        {
            if still_s > self.config.fling_window_s {
                offsets.vel_pitch = 0.0;
                offsets.vel_yaw = 0.0;
            }
            self.mode = CameraMode::Free(offsets);
        }
        match gesture {
            Gesture::Pressed { .. } => Some(pos_px),
            _ => None,
        }
    }

    /// Pointer left the canvas or the gesture was cancelled.
    pub fn on_pointer_cancel(&mut self) {
        self.gesture = Gesture::Idle;
        if let CameraMode::Dragging { offsets, .. } = self.mode {
            self.mode = CameraMode::Free(FreeOffsets {
                vel_pitch: 0.0,
                vel_yaw: 0.0,
                ..offsets
            });
        }
    }

    /// Hover position normalized to [-1, 1] on both axes.
    pub fn on_hover(&mut self, ndc: [f64; 2]) {
        if matches!(self.mode, CameraMode::Tracking { .. }) {
            return;
        }
        let s = self.config.parallax_strength_rad;
        self.parallax_target = [ndc[0].clamp(-1.0, 1.0) * s, -ndc[1].clamp(-1.0, 1.0) * s];
    }

    // ── Touch ────────────────────────────────────────────────

    pub fn on_touch_start(&mut self, touches: &[[f64; 2]]) {
        match touches {
            [one] => self.on_pointer_down(*one),
            [a, b, ..] => {
                self.on_pointer_cancel();
                self.gesture = Gesture::Pinch {
                    start_spread_px: spread(*a, *b),
                    start_zoom: self.target_distance,
                };
                self.idle_s = 0.0;
            }
            [] => {}
        }
    }

    /// Returns `true` when the move was consumed as a drag or pinch.
    pub fn on_touch_move(&mut self, touches: &[[f64; 2]]) -> bool {
        match (self.gesture, touches) {
            (
                Gesture::Pinch {
                    start_spread_px,
                    start_zoom,
                },
                [a, b, ..],
            ) => {
                let delta = (spread(*a, *b) - start_spread_px) / self.pixel_ratio;
                self.target_distance =
                    self.clamp_zoom(start_zoom - delta * self.config.pinch_zoom_gain);
                if matches!(self.mode, CameraMode::Tracking { .. }) {
                    self.remembered_zoom = None;
                }
                self.idle_s = 0.0;
                true
            }
            (Gesture::Pinch { .. }, _) => true,
            (_, [one]) => self.on_pointer_move(*one),
            _ => false,
        }
    }

    /// `remaining` are the touches still down, `released` the lifted point.
    pub fn on_touch_end(&mut self, remaining: &[[f64; 2]], released: [f64; 2]) -> Option<[f64; 2]> {
        match self.gesture {
            Gesture::Pinch { .. } => {
                if remaining.len() < 2 {
                    self.gesture = Gesture::Idle;
                }
                None
            }
            _ => self.on_pointer_up(released),
        }
    }

    // ── Frame ────────────────────────────────────────────────

    /// Advances one frame. `locate` resolves an entity id to its position.
    pub fn update(&mut self, dt_s: f64, locate: impl Fn(&str) -> Option<GeoPoint>) {
        let dt = dt_s.max(0.0);
        self.idle_s += dt;
        let cfg = &self.config;

        match &mut self.mode {
            CameraMode::Free(offsets) => {
                if offsets.vel_yaw != 0.0 || offsets.vel_pitch != 0.0 {
                    offsets.yaw += offsets.vel_yaw;
                    offsets.pitch = step_pitch(offsets.pitch, offsets.vel_pitch, cfg.pitch_limit_rad);
                    offsets.vel_yaw *= cfg.inertia_decay;
                    offsets.vel_pitch *= cfg.inertia_decay;
                    if offsets.vel_yaw.hypot(offsets.vel_pitch) < cfg.inertia_epsilon {
                        offsets.vel_yaw = 0.0;
                        offsets.vel_pitch = 0.0;
                    }
                }
                if self.auto_rotate
                    && self.gesture == Gesture::Idle
                    && self.idle_s >= cfg.auto_rotate_resume_delay_s
                {
                    offsets.yaw += cfg.auto_rotate_rate * dt;
                }
                let k = ease(cfg.parallax_ease_rate, dt);
                for i in 0..2 {
                    self.parallax[i] += (self.parallax_target[i] - self.parallax[i]) * k;
                }
            }
            CameraMode::Dragging { still_s, .. } => *still_s += dt,
            CameraMode::Tracking {
                id,
                orientation,
                elapsed_s,
            } => {
                if let Some(geo) = locate(id) {
                    let target = tracking_target(unit_normal(geo.lat_deg, geo.lng_deg), cfg);
                    let rate = if *elapsed_s < cfg.track_fast_window_s {
                        cfg.track_fast_rate
                    } else {
                        cfg.track_slow_rate
                    };
                    *orientation = orientation.slerp(target, ease(rate, dt));
                }
                *elapsed_s += dt;
                self.parallax = [0.0; 2];
                self.parallax_target = [0.0; 2];
            }
        }

        self.distance += (self.target_distance - self.distance) * ease(cfg.zoom_ease_rate, dt);
        self.distance = self.clamp_zoom(self.distance);
    }

    // ── View ─────────────────────────────────────────────────

    pub fn eye(&self) -> Vec3 {
        Vec3::new(0.0, 0.0, self.distance)
    }

    pub fn view(&self) -> CameraView {
        CameraView {
            eye: self.eye(),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_rad: self.config.fov_y_deg.to_radians(),
            width_px: self.viewport_px[0],
            height_px: self.viewport_px[1],
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        let view = self.view();
        let proj = mat4_perspective_rh_z0(
            view.fov_y_rad,
            view.aspect(),
            self.config.near,
            self.config.far.max(self.distance + 4.0),
        );
        mat4_mul(proj, mat4_look_at_rh(view.eye, view.target, view.up))
    }
}

/// Rotation that brings `normal` onto +Z, rolled by the cosmetic tilt.
fn tracking_target(normal: Vec3, cfg: &CameraConfig) -> Quat {
    let tilt = Quat::from_axis_angle(Vec3::Z, cfg.tracking_tilt_deg.to_radians());
    (tilt * Quat::from_unit_vectors(normal, Vec3::Z)).normalize()
}

/// Applies a pitch step unless it would push |pitch| past the limit.
fn step_pitch(pitch: f64, step: f64, limit: f64) -> f64 {
    let next = pitch + step;
    if next.abs() <= limit || next.abs() <= pitch.abs() {
        next
    } else if pitch.abs() < limit {
        limit.copysign(next)
    } else {
        pitch
    }
}

fn ease(rate: f64, dt: f64) -> f64 {
    1.0 - (-rate * dt).exp()
}

fn spread(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f64 = 1.0 / 60.0;

    fn still() -> CameraController {
        CameraController::new(CameraConfig {
            auto_rotate: false,
            ..CameraConfig::default()
        })
    }

    fn offsets(c: &CameraController) -> FreeOffsets {
        match c.mode() {
            CameraMode::Free(o) | CameraMode::Dragging { offsets: o, .. } => *o,
            other => panic!("not free: {other:?}"),
        }
    }

    fn run(c: &mut CameraController, seconds: f64, at: &[(&str, GeoPoint)]) {
        let frames = (seconds / FRAME).round() as usize;
        for _ in 0..frames {
            c.update(FRAME, |id| at.iter().find(|(k, _)| *k == id).map(|(_, g)| *g));
        }
    }

    fn facing(c: &CameraController, geo: GeoPoint) -> f64 {
        c.orientation()
            .rotate(unit_normal(geo.lat_deg, geo.lng_deg))
            .dot(Vec3::Z)
    }

    #[test]
    fn fifty_pixel_drag_rotates_by_sensitivity() {
        let mut c = still();
        let s = c.config().drag_sensitivity;
        c.on_pointer_down([100.0, 100.0]);
        assert!(c.on_pointer_move([150.0, 100.0]));
        assert!((offsets(&c).yaw - 50.0 * s).abs() < 1e-12);
        assert_eq!(c.on_pointer_up([150.0, 100.0]), None);
    }

    #[test]
    fn released_drag_decays_geometrically_to_zero() {
        let mut c = still();
        let decay = c.config().inertia_decay;
        c.on_pointer_down([0.0, 0.0]);
        c.on_pointer_move([20.0, 0.0]);
        c.on_pointer_move([30.0, 0.0]);
        c.on_pointer_up([30.0, 0.0]);

        let mut v = offsets(&c).vel_yaw;
        assert!(v > 0.0);
        for _ in 0..3 {
            c.update(FRAME, |_| None);
            let next = offsets(&c).vel_yaw;
            assert!((next - v * decay).abs() < 1e-15);
            v = next;
        }
        run(&mut c, 10.0, &[]);
        assert_eq!(offsets(&c).vel_yaw, 0.0);
    }

    #[test]
    fn drag_held_still_before_release_does_not_fling() {
        let mut c = still();
        c.on_pointer_down([0.0, 0.0]);
        c.on_pointer_move([40.0, 0.0]);
        run(&mut c, 0.25, &[]);
        c.on_pointer_up([40.0, 0.0]);
        let rest = offsets(&c);
        assert_eq!((rest.vel_yaw, rest.vel_pitch), (0.0, 0.0));
        run(&mut c, 1.0, &[]);
        assert_eq!(offsets(&c).yaw, rest.yaw);
    }

    #[test]
    fn gestures_scale_with_the_pixel_ratio() {
        let mut c = still();
        let s = c.config().drag_sensitivity;
        c.set_pixel_ratio(3.0);
        c.on_pointer_down([0.0, 0.0]);
        assert!(!c.on_pointer_move([20.0, 0.0]));
        assert!(c.on_pointer_move([150.0, 0.0]));
        assert!((offsets(&c).yaw - 50.0 * s).abs() < 1e-12);
        assert_eq!(c.on_pointer_up([150.0, 0.0]), None);

        c.set_pixel_ratio(f64::NAN);
        c.on_pointer_down([0.0, 0.0]);
        assert!(!c.on_pointer_move([20.0, 0.0]));
    }

    #[test]
    fn small_movement_is_a_tap() {
        let mut c = still();
        c.on_pointer_down([10.0, 10.0]);
        assert!(!c.on_pointer_move([15.0, 14.0]));
        assert_eq!(c.on_pointer_up([15.0, 14.0]), Some([15.0, 14.0]));
        assert_eq!(offsets(&c).yaw, 0.0);
    }

    #[test]
    fn pitch_clamp_rejects_only_outward_steps() {
        assert_eq!(step_pitch(1.0, 0.5, 1.2), 1.2);
        assert_eq!(step_pitch(1.5, 0.1, 1.2), 1.5);
        assert!((step_pitch(1.5, -0.1, 1.2) - 1.4).abs() < 1e-12);
        assert!((step_pitch(-0.2, -0.3, 1.2) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn zoom_stays_within_bounds() {
        let mut c = still();
        let (lo, hi) = (c.config().zoom_min, c.config().zoom_max);
        for delta in [1e6, -3.0, -1e9, 0.4, 2.0, f64::NAN, -0.1] {
            c.on_wheel(delta);
            assert!((lo..=hi).contains(&c.target_distance()));
            c.update(FRAME, |_| None);
            assert!((lo..=hi).contains(&c.distance()));
        }
        c.on_touch_start(&[[0.0, 0.0], [100.0, 0.0]]);
        c.on_touch_move(&[[0.0, 0.0], [5000.0, 0.0]]);
        assert_eq!(c.target_distance(), lo);
        c.on_touch_move(&[[0.0, 0.0], [0.0, 1.0]]);
        assert!((lo..=hi).contains(&c.target_distance()));
    }

    #[test]
    fn pinch_is_never_a_tap() {
        let mut c = still();
        c.on_touch_start(&[[0.0, 0.0], [100.0, 0.0]]);
        assert!(c.on_touch_move(&[[0.0, 0.0], [120.0, 0.0]]));
        assert_eq!(c.on_touch_end(&[[0.0, 0.0]], [120.0, 0.0]), None);
    }

    #[test]
    fn tracking_converges_on_the_entity() {
        let mut c = still();
        let geo = GeoPoint::new(48.0, -122.0);
        c.select(Some("a"));
        run(&mut c, 5.0, &[("a", geo)]);
        assert!(facing(&c, geo) > 1.0 - 1e-6);
    }

    #[test]
    fn reselect_within_fast_window_converges_on_the_second() {
        let mut c = still();
        let a = GeoPoint::new(10.0, 20.0);
        let b = GeoPoint::new(-35.0, 150.0);
        let at = [("a", a), ("b", b)];
        c.select(Some("a"));
        run(&mut c, 0.3, &at);
        c.select(Some("b"));
        match c.mode() {
            CameraMode::Tracking { id, elapsed_s, .. } => {
                assert_eq!(id, "b");
                assert_eq!(*elapsed_s, 0.0);
            }
            other => panic!("expected tracking, got {other:?}"),
        }
        run(&mut c, 6.0, &at);
        assert!(facing(&c, b) > 1.0 - 1e-6);
        assert!(facing(&c, a) < 0.9);
    }

    #[test]
    fn reselecting_the_same_id_keeps_the_timer() {
        let mut c = still();
        c.select(Some("a"));
        run(&mut c, 0.5, &[("a", GeoPoint::new(0.0, 0.0))]);
        c.select(Some("a"));
        let CameraMode::Tracking { elapsed_s, .. } = c.mode() else {
            panic!("expected tracking");
        };
        assert!(*elapsed_s > 0.4);
    }

    #[test]
    fn missing_entity_holds_orientation() {
        let mut c = still();
        c.select(Some("ghost"));
        let before = c.orientation();
        run(&mut c, 1.0, &[]);
        assert_eq!(c.orientation(), before);
    }

    #[test]
    fn deselect_resumes_free_mode_from_the_same_orientation() {
        let mut c = still();
        c.select(Some("a"));
        run(&mut c, 0.4, &[("a", GeoPoint::new(33.0, 77.0))]);
        let tracked = c.orientation();
        c.select(None);
        assert!(matches!(c.mode(), CameraMode::Free(_)));
        assert!(c.orientation().angle_to(tracked) < 1e-9);
    }

    #[test]
    fn euler_decomposition_round_trips() {
        for (axis, angle) in [
            (Vec3::new(1.0, 2.0, 3.0), 0.7),
            (Vec3::Y, 2.9),
            (Vec3::new(-0.3, 0.1, 0.9), 1.4),
        ] {
            let q = Quat::from_axis_angle(axis.normalize_or(Vec3::Y), angle);
            let back = FreeOffsets::from_orientation(q).orientation([0.0; 2]);
            assert!(back.angle_to(q) < 1e-9);
        }
    }

    #[test]
    fn selection_remembers_and_restores_zoom() {
        let mut c = still();
        c.zoom_by(1.0);
        let before = c.target_distance();
        c.select(Some("a"));
        assert_eq!(c.target_distance(), c.config().zoom_tracking);
        c.select(None);
        assert_eq!(c.target_distance(), before);

        c.select(Some("a"));
        c.zoom_by(0.2);
        let manual = c.target_distance();
        c.select(None);
        assert_eq!(c.target_distance(), manual);
    }

    #[test]
    fn drags_are_ignored_while_tracking() {
        let mut c = still();
        c.select(Some("a"));
        let before = c.orientation();
        c.on_pointer_down([0.0, 0.0]);
        c.on_pointer_move([80.0, 40.0]);
        assert_eq!(c.on_pointer_up([80.0, 40.0]), None);
        assert_eq!(c.orientation(), before);
    }

    #[test]
    fn auto_rotate_waits_for_idle_delay() {
        let mut c = CameraController::default();
        let delay = c.config().auto_rotate_resume_delay_s;
        c.on_pointer_down([0.0, 0.0]);
        c.on_pointer_up([0.0, 0.0]);
        run(&mut c, delay * 0.5, &[]);
        assert_eq!(offsets(&c).yaw, 0.0);
        run(&mut c, delay, &[]);
        assert!(offsets(&c).yaw > 0.0);

        let yaw = offsets(&c).yaw;
        c.set_auto_rotate(false);
        run(&mut c, 1.0, &[]);
        assert_eq!(offsets(&c).yaw, yaw);
    }

    #[test]
    fn parallax_eases_in_free_mode_and_clears_when_tracking() {
        let mut c = still();
        c.on_hover([1.0, 0.0]);
        run(&mut c, 3.0, &[]);
        let free = c.orientation();
        assert!(free.angle_to(Quat::IDENTITY) > 0.02);

        c.select(Some("a"));
        c.on_hover([1.0, 1.0]);
        run(&mut c, 0.1, &[]);
        c.select(None);
        assert!(c.orientation().angle_to(free) < 1e-9);
    }
}
