//! Frame-loop orchestration, independent of the browser and the GPU.
//!
//! The wasm glue owns one [`Engine`] per `init`, feeds it host events and
//! timestamps, and drains [`EngineEvent`]s after each call so host callbacks
//! run outside any borrow of the engine.

use formats::{OutlineSource, Outlines};
use gpu::{FrameInputs, FramePlan, PlanOptions};
use runtime::{Event, EventBus, FrameClock};
use scene::{
    AmbientFx, EntitySnapshot, FxGeometry, InstancedRenderSet, MotionModel, PickingService,
    motion::SnapshotStats,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, EngineConfig};
use crate::globe_controller::CameraController;

/// After a touch, browsers replay the gesture as mouse events. Pointer input
/// is ignored for this long after the last touch event.
const EMULATED_MOUSE_GUARD_S: f64 = 0.8;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine disposed")]
    Disposed,
    #[error("entity snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("gpu: {0}")]
    Gpu(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Boundary data is installed. Raised once per engine.
    Ready { outlines: OutlineSource },
    /// A tap resolved to an entity, or to nothing.
    EntityPicked(Option<String>),
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    generation: u64,
    disposed: bool,
    clock: FrameClock,
    frame_index: u64,
    elapsed_s: f64,
    motion: MotionModel,
    camera: CameraController,
    instances: InstancedRenderSet,
    picking: PickingService,
    fx: AmbientFx,
    fx_geometry: FxGeometry,
    outlines: Option<(Outlines, OutlineSource)>,
    /// Bumped whenever `outlines` changes so the renderer re-uploads.
    outlines_revision: u64,
    events: EventBus<EngineEvent>,
    ready_fired: bool,
    viewport_px: [u32; 2],
    plan: FramePlan,
    selected: Option<String>,
    touch_guard_s: f64,
}

impl Engine {
    pub fn new(config: EngineConfig, generation: u64) -> Self {
        let plan = FramePlan::build(&PlanOptions {
            bloom: config.render.bloom,
            clear_color: config.render.clear_color,
        });
        Self {
            generation,
            disposed: false,
            clock: FrameClock::default(),
            frame_index: 0,
            elapsed_s: 0.0,
            motion: MotionModel::new(config.motion),
            camera: CameraController::new(config.camera.clone()),
            instances: InstancedRenderSet::new(config.instances.clone()),
            picking: PickingService::new(config.picking),
            fx: AmbientFx::new(config.fx.clone()),
            fx_geometry: FxGeometry::default(),
            outlines: None,
            outlines_revision: 0,
            events: EventBus::new(),
            ready_fired: false,
            viewport_px: [1, 1],
            plan,
            selected: None,
            touch_guard_s: 0.0,
            config,
        }
    }

    // ── Host-facing mutators ─────────────────────────────────

    /// Replaces the live set from a JSON array of snapshots. On a parse error
    /// the live set is left untouched.
    pub fn set_entities_json(&mut self, json: &str) -> Result<SnapshotStats, EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        let snapshot: Vec<EntitySnapshot> = serde_json::from_str(json)?;
        Ok(self.set_entities(snapshot))
    }

    pub fn set_entities(&mut self, snapshot: Vec<EntitySnapshot>) -> SnapshotStats {
        if self.disposed {
            return SnapshotStats::default();
        }
        self.motion.apply_snapshot(snapshot)
    }

    pub fn set_selected(&mut self, id: Option<&str>) {
        if self.disposed {
            return;
        }
        self.selected = id.map(str::to_string);
        self.camera.select(id);
        debug!(selected = ?self.selected, "selection changed");
    }

    pub fn zoom_step(&mut self, delta: f64) {
        if !self.disposed {
            self.camera.zoom_by(delta);
        }
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        if !self.disposed {
            self.camera.set_auto_rotate(enabled);
        }
    }

    pub fn resize(&mut self, width_px: u32, height_px: u32) {
        if self.disposed {
            return;
        }
        self.viewport_px = [width_px.max(1), height_px.max(1)];
        self.camera
            .set_viewport(self.viewport_px[0] as f64, self.viewport_px[1] as f64);
    }

    /// Device pixels per CSS pixel; input coordinates arrive in device pixels.
    pub fn set_pixel_ratio(&mut self, ratio: f64) {
        if !self.disposed {
            self.camera.set_pixel_ratio(ratio);
        }
    }

    /// Hidden pages stop accumulating time; the first visible frame has no
    /// catch-up delta.
    pub fn set_visible(&mut self, visible: bool) {
        if self.disposed {
            return;
        }
        if visible {
            self.clock.resume();
        } else {
            self.clock.suspend();
        }
    }

    // ── Input ────────────────────────────────────────────────

    fn accepts_pointer(&self) -> bool {
        !self.disposed && self.touch_guard_s <= 0.0
    }

    fn touched(&mut self) {
        self.touch_guard_s = EMULATED_MOUSE_GUARD_S;
    }

    pub fn pointer_down(&mut self, x_px: f64, y_px: f64) {
        if self.accepts_pointer() {
            self.camera.on_pointer_down([x_px, y_px]);
        }
    }

    /// Returns `true` when the host should suppress the default action.
    pub fn pointer_move(&mut self, x_px: f64, y_px: f64) -> bool {
        if !self.accepts_pointer() {
            return false;
        }
        let [w, h] = self.viewport_px;
        self.camera
            .on_hover([2.0 * x_px / w as f64 - 1.0, 2.0 * y_px / h as f64 - 1.0]);
        self.camera.on_pointer_move([x_px, y_px])
    }

    pub fn pointer_up(&mut self, x_px: f64, y_px: f64) {
        if !self.accepts_pointer() {
            return;
        }
        if let Some([x, y]) = self.camera.on_pointer_up([x_px, y_px]) {
            self.tap(x, y);
        }
    }

    pub fn pointer_cancel(&mut self) {
        if !self.disposed {
            self.camera.on_pointer_cancel();
        }
    }

    pub fn wheel(&mut self, delta_y: f64) {
        if !self.disposed {
            self.camera.on_wheel(delta_y);
        }
    }

    pub fn touch_start(&mut self, touches: &[[f64; 2]]) {
        if !self.disposed {
            self.touched();
            self.camera.on_touch_start(touches);
        }
    }

    pub fn touch_move(&mut self, touches: &[[f64; 2]]) -> bool {
        if self.disposed {
            return false;
        }
        self.touched();
        self.camera.on_touch_move(touches)
    }

    /// Returns `true` when the touch sequence was handled here, so the host
    /// should suppress the emulated mouse events that would follow.
    pub fn touch_end(&mut self, remaining: &[[f64; 2]], released: [f64; 2]) -> bool {
        if self.disposed {
            return false;
        }
        self.touched();
        if let Some([x, y]) = self.camera.on_touch_end(remaining, released) {
            self.tap(x, y);
        }
        true
    }

    /// Resolves a tap, applies the selection and raises `EntityPicked`.
    fn tap(&mut self, x_px: f64, y_px: f64) {
        let picked = self
            .picking
            .resolve(
                &self.motion,
                &self.camera.view(),
                self.camera.orientation(),
                x_px,
                y_px,
            )
            .map(str::to_string);
        debug!(x_px, y_px, picked = ?picked, "tap resolved");
        self.set_selected(picked.as_deref());
        self.events
            .emit(self.frame_index, EngineEvent::EntityPicked(picked));
    }

    // ── Async results ────────────────────────────────────────

    /// Installs boundary outlines produced by an async load started for
    /// `generation`. Results for a disposed or replaced engine are dropped.
    pub fn install_outlines(
        &mut self,
        generation: u64,
        outlines: Outlines,
        source: OutlineSource,
    ) -> bool {
        if self.disposed || generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale outlines");
            return false;
        }
        let stats = outlines.stats();
        info!(lines = stats.lines, vertices = stats.vertices, ?source, "outlines installed");
        self.outlines = Some((outlines, source));
        self.outlines_revision += 1;
        if !self.ready_fired {
            self.ready_fired = true;
            self.events
                .emit(self.frame_index, EngineEvent::Ready { outlines: source });
        }
        true
    }

    // ── Frame ────────────────────────────────────────────────

    /// Advances the simulation to host time `now_s`. Returns `false` when no
    /// frame was produced (disposed or hidden).
    pub fn frame(&mut self, now_s: f64) -> bool {
        if self.disposed {
            return false;
        }
        let Some(frame) = self.clock.tick(now_s) else {
            return false;
        };
        self.frame_index = frame.index;
        self.elapsed_s = frame.time.seconds();
        let dt = frame.dt_s;
        self.touch_guard_s = (self.touch_guard_s - dt).max(0.0);

        self.motion.integrate(dt);
        let motion = &self.motion;
        self.camera
            .update(dt, |id| motion.get(id).map(|e| e.position));
        self.fx.advance(dt);
        self.instances
            .rebuild(&self.motion, self.selected.as_deref());
        self.fx.write_geometry(&mut self.fx_geometry);
        true
    }

    pub fn frame_inputs(&self) -> FrameInputs {
        FrameInputs {
            view_proj: self.camera.view_proj(),
            orientation: self.camera.orientation(),
            eye: self.camera.eye(),
            width_px: self.viewport_px[0],
            height_px: self.viewport_px[1],
            elapsed_s: self.elapsed_s,
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event<EngineEvent>> {
        self.events.drain()
    }

    /// Returns `true` on the first call only.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        self.motion.clear();
        self.events.clear();
        self.outlines = None;
        self.selected = None;
        info!(generation = self.generation, "engine disposed");
        true
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn motion(&self) -> &MotionModel {
        &self.motion
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn instances(&self) -> &InstancedRenderSet {
        &self.instances
    }

    pub fn fx_geometry(&self) -> &FxGeometry {
        &self.fx_geometry
    }

    pub fn outlines(&self) -> Option<&Outlines> {
        self.outlines.as_ref().map(|(o, _)| o)
    }

    pub fn outlines_revision(&self) -> u64 {
        self.outlines_revision
    }

    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn viewport_px(&self) -> [u32; 2] {
        self.viewport_px
    }

    pub fn rendered_entity_count(&self) -> usize {
        self.instances.rendered_count()
    }

    pub fn max_rendered_entities(&self) -> usize {
        self.instances.render_cap()
    }
}
