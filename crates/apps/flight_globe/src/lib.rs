//! Real-time 3D globe of live aircraft positions, rendered with wgpu in the
//! browser.
//!
//! The host calls [`init`] with a canvas id, optional JSON config and two
//! callbacks, then feeds entity snapshots through [`set_entities`]. One
//! [`Engine`] exists per `init`; [`dispose`] tears it down and is safe to call
//! any number of times.

mod config;
mod engine;
mod globe_controller;
mod input;
mod logging;
mod wgpu;

pub use config::{ConfigError, EngineConfig, RenderConfig};
pub use engine::{Engine, EngineError, EngineEvent};
pub use globe_controller::{CameraConfig, CameraController, CameraMode, FreeOffsets};
pub use input::{HostInput, dispatch};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use formats::{OutlineSource, Outlines};
use gloo_net::http::Request;
use gpu::FramePlan;
use tracing::{debug, error, info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlCanvasElement;

use crate::input::{Dispatcher, FrameLoop, Listeners};
use crate::wgpu::Renderer;

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// A host callback; receives the event that triggered it.
type HostCallback = Rc<dyn Fn(&EngineEvent)>;

struct AppState {
    engine: Engine,
    renderer: Option<Renderer>,
    listeners: Listeners,
    frame_loop: FrameLoop,
    on_ready: Option<HostCallback>,
    on_entity_picked: Option<HostCallback>,
}

thread_local! {
    static STATE: RefCell<Option<AppState>> = const { RefCell::new(None) };
}

fn with_state<F, R>(f: F) -> R
where
    F: FnOnce(&RefCell<Option<AppState>>) -> R,
    R: Default,
{
    STATE.try_with(f).unwrap_or_default()
}

/// Runs `f` against the live engine, then delivers any events it raised.
/// `None` when there is no engine or the state is already borrowed.
fn with_engine<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut Engine) -> R,
{
    let out = with_state(|state| {
        let mut s = state.try_borrow_mut().ok()?;
        s.as_mut().map(|app| f(&mut app.engine))
    });
    flush_events();
    out
}

/// Hands drained engine events to the host callbacks. Runs with the state
/// borrow released so callbacks may re-enter the API.
fn flush_events() {
    let pending = with_state(|state| {
        let Ok(mut s) = state.try_borrow_mut() else {
            return Vec::new();
        };
        let Some(app) = s.as_mut() else {
            return Vec::new();
        };
        app.engine
            .drain_events()
            .into_iter()
            .map(|event| {
                let callback = match event.payload {
                    EngineEvent::Ready { .. } => app.on_ready.clone(),
                    EngineEvent::EntityPicked(_) => app.on_entity_picked.clone(),
                };
                (callback, event.payload)
            })
            .collect::<Vec<_>>()
    });

    for (callback, event) in pending {
        if let Some(callback) = callback {
            callback(&event);
        }
    }
}

fn js_callback(function: js_sys::Function) -> HostCallback {
    Rc::new(move |event: &EngineEvent| {
        let result = match event {
            EngineEvent::Ready { .. } => function.call0(&JsValue::NULL),
            EngineEvent::EntityPicked(id) => {
                let arg = id
                    .as_deref()
                    .map_or(JsValue::NULL, JsValue::from_str);
                function.call1(&JsValue::NULL, &arg)
            }
        };
        if let Err(err) = result {
            warn!(?err, "host callback threw");
        }
    })
}

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn canvas_by_id(canvas_id: &str) -> Result<HtmlCanvasElement, JsValue> {
    web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(canvas_id))
        .ok_or_else(|| JsValue::from_str(&format!("canvas #{canvas_id} not found")))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| JsValue::from_str(&format!("#{canvas_id} is not a canvas")))
}

fn on_frame(now_s: f64) {
    with_state(|state| {
        let Ok(mut s) = state.try_borrow_mut() else {
            return;
        };
        let Some(app) = s.as_mut() else {
            return;
        };
        if !app.engine.frame(now_s) {
            return;
        }
        if let Some(renderer) = app.renderer.as_mut() {
            if let Err(err) = renderer.render(&app.engine) {
                debug!(%err, "frame skipped");
            }
        }
    });
    flush_events();
}

fn on_input(generation: u64, input: HostInput) -> bool {
    let prevent = with_state(|state| {
        let Ok(mut s) = state.try_borrow_mut() else {
            return false;
        };
        let Some(app) = s.as_mut() else {
            return false;
        };
        if app.engine.generation() != generation {
            return false;
        }
        if let HostInput::Resize {
            width_px,
            height_px,
            ..
        } = input
        {
            if let Some(renderer) = app.renderer.as_mut() {
                renderer.resize(width_px, height_px);
            }
        }
        dispatch(&mut app.engine, input)
    });
    flush_events();
    prevent
}

async fn fetch_text(url: &str) -> Result<String, JsValue> {
    let resp = Request::get(url).send().await.map_err(js_err)?;
    if !resp.ok() {
        return Err(JsValue::from_str(&format!("HTTP {} for {url}", resp.status())));
    }
    resp.text().await.map_err(js_err)
}

async fn load_outlines(generation: u64, url: String) {
    let (outlines, source) = if url.trim().is_empty() {
        (Outlines::fallback(), OutlineSource::Fallback)
    } else {
        match fetch_text(&url).await {
            Ok(text) => Outlines::from_geojson_or_fallback(&text),
            Err(err) => {
                warn!(url, ?err, "outline fetch failed, using built-in outlines");
                (Outlines::fallback(), OutlineSource::Fallback)
            }
        }
    };
    with_state(|state| {
        if let Some(app) = state.borrow_mut().as_mut() {
            app.engine.install_outlines(generation, outlines, source);
        }
    });
    flush_events();
}

async fn init_renderer(
    generation: u64,
    canvas: HtmlCanvasElement,
    config: EngineConfig,
    plan: FramePlan,
) {
    let renderer = match Renderer::new(&canvas, &config, &plan).await {
        Ok(r) => r,
        Err(err) => {
            error!(%err, "gpu init failed, continuing without rendering");
            return;
        }
    };
    // The engine may have been disposed or replaced while the device was
    // being requested.
    let installed = with_state(|state| {
        let mut s = state.borrow_mut();
        match s.as_mut() {
            Some(app) if app.engine.generation() == generation && !app.engine.is_disposed() => {
                app.renderer = Some(renderer);
                true
            }
            _ => false,
        }
    });
    if !installed {
        debug!(generation, "renderer finished after teardown, dropped");
    }
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    logging::init_panic_hook();
    Ok(())
}

/// Builds a fresh engine on `canvas_id`, replacing any previous one.
#[wasm_bindgen]
pub fn init(
    canvas_id: &str,
    config_json: Option<String>,
    on_ready: Option<js_sys::Function>,
    on_entity_picked: Option<js_sys::Function>,
) -> Result<(), JsValue> {
    logging::init_panic_hook();
    let config = EngineConfig::from_json(config_json.as_deref()).map_err(js_err)?;
    logging::init_logging(&config.log_level);

    dispose();

    let canvas = canvas_by_id(canvas_id)?;
    let generation = GENERATION.fetch_add(1, Ordering::SeqCst) + 1;
    let mut engine = Engine::new(config.clone(), generation);
    let (width, height) = input::sync_canvas_size(&canvas);
    engine.resize(width, height);
    engine.set_pixel_ratio(input::device_pixel_ratio());
    let plan = engine.plan().clone();

    let dispatcher: Dispatcher = Rc::new(move |input| on_input(generation, input));
    let listeners = Listeners::attach(&canvas, dispatcher)?;
    let frame_loop = FrameLoop::start(Rc::new(on_frame));

    with_state(|state| {
        *state.borrow_mut() = Some(AppState {
            engine,
            renderer: None,
            listeners,
            frame_loop,
            on_ready: on_ready.map(js_callback),
            on_entity_picked: on_entity_picked.map(js_callback),
        });
    });

    let outlines_url = config.outlines_url.clone();
    spawn_local(init_renderer(generation, canvas, config, plan));
    spawn_local(load_outlines(generation, outlines_url));

    info!(generation, canvas_id, width, height, "flight globe initialized");
    Ok(())
}

/// Replaces the live entity set from a JSON array of snapshots.
#[wasm_bindgen]
pub fn set_entities(json: &str) -> Result<(), JsValue> {
    match with_engine(|engine| engine.set_entities_json(json)) {
        None | Some(Err(EngineError::Disposed)) => Ok(()),
        Some(Ok(stats)) => {
            debug!(
                inserted = stats.inserted,
                updated = stats.updated,
                removed = stats.removed,
                duplicates = stats.duplicates,
                "snapshot applied"
            );
            Ok(())
        }
        Some(Err(err)) => Err(js_err(err)),
    }
}

#[wasm_bindgen]
pub fn set_selected(id: Option<String>) {
    with_engine(|engine| engine.set_selected(id.as_deref()));
}

#[wasm_bindgen]
pub fn zoom_step(delta: f64) {
    with_engine(|engine| engine.zoom_step(delta));
}

#[wasm_bindgen]
pub fn set_auto_rotate(enabled: bool) {
    with_engine(|engine| engine.set_auto_rotate(enabled));
}

#[wasm_bindgen]
pub fn rendered_entity_count() -> u32 {
    with_engine(|engine| engine.rendered_entity_count() as u32).unwrap_or(0)
}

/// The cap shared with hosts that trim their own lists before `set_entities`.
#[wasm_bindgen]
pub fn max_rendered_entities() -> u32 {
    with_engine(|engine| engine.max_rendered_entities())
        .unwrap_or(scene::MAX_RENDERED_ENTITIES) as u32
}

/// Detaches listeners, stops the frame loop and releases GPU resources.
#[wasm_bindgen]
pub fn dispose() {
    let taken = with_state(|state| state.borrow_mut().take());
    let Some(mut app) = taken else {
        return;
    };
    app.listeners.detach();
    app.frame_loop.stop();
    app.engine.dispose();
    app.renderer = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn install(
        generation: u64,
        on_ready: Option<HostCallback>,
        on_entity_picked: Option<HostCallback>,
    ) {
        let mut engine = Engine::new(EngineConfig::default(), generation);
        engine.resize(800, 600);
        with_state(|state| {
            *state.borrow_mut() = Some(AppState {
                engine,
                renderer: None,
                listeners: Listeners::default(),
                frame_loop: FrameLoop::default(),
                on_ready,
                on_entity_picked,
            });
        });
    }

    fn installed() -> bool {
        with_state(|state| state.borrow().is_some())
    }

    #[test]
    fn pick_callback_may_dispose_the_engine() {
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        install(
            3,
            None,
            Some(Rc::new(move |event: &EngineEvent| {
                assert_eq!(event, &EngineEvent::EntityPicked(None));
                seen.set(seen.get() + 1);
                dispose();
            })),
        );

        on_input(3, HostInput::PointerDown { x: 2.0, y: 2.0 });
        on_input(3, HostInput::PointerUp { x: 2.0, y: 2.0 });
        assert_eq!(calls.get(), 1);
        assert!(!installed());

        assert!(set_entities(r#"[{"id":"a","lat":0,"lng":0}]"#).is_ok());
        assert_eq!(rendered_entity_count(), 0);
        assert!(!on_input(3, HostInput::Wheel { delta_y: 1.0 }));
        dispose();
    }

    #[test]
    fn ready_callback_may_feed_entities() {
        let ready = Rc::new(Cell::new(0));
        let seen = ready.clone();
        install(
            4,
            Some(Rc::new(move |_event: &EngineEvent| {
                seen.set(seen.get() + 1);
                assert!(set_entities(r#"[{"id":"a","lat":10,"lng":20}]"#).is_ok());
            })),
            None,
        );

        with_engine(|engine| {
            engine.install_outlines(4, Outlines::fallback(), OutlineSource::Fallback)
        });
        assert_eq!(ready.get(), 1);
        assert_eq!(with_engine(|engine| engine.motion().len()), Some(1));
        dispose();
        assert!(!installed());
    }

    #[test]
    fn calls_before_init_are_noops() {
        assert!(set_entities("[]").is_ok());
        assert!(set_entities("not json").is_ok());
        set_selected(Some("abc".to_string()));
        zoom_step(0.5);
        assert_eq!(rendered_entity_count(), 0);
        dispose();
        dispose();
    }

    #[test]
    fn shared_cap_is_reported_without_an_engine() {
        assert_eq!(max_rendered_entities() as usize, scene::MAX_RENDERED_ENTITIES);
    }
}
