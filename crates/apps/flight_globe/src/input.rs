//! DOM input and the animation-frame loop.
//!
//! Browser events are translated into [`HostInput`] values in canvas pixel
//! coordinates and handed to a dispatcher; [`dispatch`] applies them to an
//! [`Engine`]. Listener closures and the frame closure are dropped on a later
//! task so teardown from inside a handler never frees a running closure.

use crate::engine::Engine;

#[derive(Debug, Clone, PartialEq)]
pub enum HostInput {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    PointerCancel,
    Wheel { delta_y: f64 },
    TouchStart(Vec<[f64; 2]>),
    TouchMove(Vec<[f64; 2]>),
    TouchEnd { remaining: Vec<[f64; 2]>, released: [f64; 2] },
    Resize { width_px: u32, height_px: u32, pixel_ratio: f64 },
    Visibility { visible: bool },
}

/// Applies one input; returns `true` when the browser default should be
/// suppressed.
pub fn dispatch(engine: &mut Engine, input: HostInput) -> bool {
    match input {
        HostInput::PointerDown { x, y } => {
            engine.pointer_down(x, y);
            false
        }
        HostInput::PointerMove { x, y } => engine.pointer_move(x, y),
        HostInput::PointerUp { x, y } => {
            engine.pointer_up(x, y);
            false
        }
        HostInput::PointerCancel => {
            engine.pointer_cancel();
            false
        }
        HostInput::Wheel { delta_y } => {
            engine.wheel(delta_y);
            true
        }
        HostInput::TouchStart(touches) => {
            engine.touch_start(&touches);
            touches.len() > 1
        }
        HostInput::TouchMove(touches) => engine.touch_move(&touches),
        HostInput::TouchEnd {
            remaining,
            released,
        } => engine.touch_end(&remaining, released),
        HostInput::Resize {
            width_px,
            height_px,
            pixel_ratio,
        } => {
            engine.resize(width_px, height_px);
            engine.set_pixel_ratio(pixel_ratio);
            false
        }
        HostInput::Visibility { visible } => {
            engine.set_visible(visible);
            false
        }
    }
}

pub type Dispatcher = std::rc::Rc<dyn Fn(HostInput) -> bool>;
pub type FrameCallback = std::rc::Rc<dyn Fn(f64)>;

#[cfg(target_arch = "wasm32")]
mod imp {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::spawn_local;
    use web_sys::{
        AddEventListenerOptions, Event, EventTarget, HtmlCanvasElement, MouseEvent, TouchEvent,
        TouchList, VisibilityState, WheelEvent,
    };

    use super::{Dispatcher, FrameCallback, HostInput};

    type Handler = Closure<dyn FnMut(Event)>;

    /// Registered DOM listeners; removed exactly once by [`Listeners::detach`].
    pub struct Listeners {
        registered: Vec<(EventTarget, &'static str, Handler)>,
    }

    impl std::fmt::Debug for Listeners {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Listeners")
                .field("count", &self.registered.len())
                .finish()
        }
    }

    /// Client coordinates to drawing-buffer pixels, the engine's viewport space.
    fn local_point(canvas: &HtmlCanvasElement, client_x: f64, client_y: f64) -> [f64; 2] {
        let rect = canvas.get_bounding_client_rect();
        let scale_x = if rect.width() > 0.0 {
            canvas.width() as f64 / rect.width()
        } else {
            1.0
        };
        let scale_y = if rect.height() > 0.0 {
            canvas.height() as f64 / rect.height()
        } else {
            1.0
        };
        [
            (client_x - rect.left()) * scale_x,
            (client_y - rect.top()) * scale_y,
        ]
    }

    fn touch_points(canvas: &HtmlCanvasElement, list: &TouchList) -> Vec<[f64; 2]> {
        (0..list.length())
            .filter_map(|i| list.item(i))
            .map(|t| local_point(canvas, t.client_x() as f64, t.client_y() as f64))
            .collect()
    }

    pub fn device_pixel_ratio() -> f64 {
        web_sys::window()
            .map(|w| w.device_pixel_ratio())
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(1.0)
    }

    /// Canvas size in device pixels; also syncs the drawing buffer size.
    pub fn sync_canvas_size(canvas: &HtmlCanvasElement) -> (u32, u32) {
        let dpr = device_pixel_ratio();
        let w = ((canvas.client_width() as f64) * dpr).round().max(1.0) as u32;
        let h = ((canvas.client_height() as f64) * dpr).round().max(1.0) as u32;
        if canvas.width() != w || canvas.height() != h {
            canvas.set_width(w);
            canvas.set_height(h);
        }
        (w, h)
    }

    impl Listeners {
        pub fn attach(canvas: &HtmlCanvasElement, dispatch: Dispatcher) -> Result<Self, JsValue> {
            let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
            let document = window
                .document()
                .ok_or_else(|| JsValue::from_str("no document"))?;
            let mut listeners = Self {
                registered: Vec::new(),
            };
            let canvas_target: EventTarget = canvas.clone().into();
            let window_target: EventTarget = window.clone().into();
            let document_target: EventTarget = document.clone().into();

            // Mouse. Move and up are tracked on the window so drags survive
            // leaving the canvas.
            let mouse = |map: fn(f64, f64) -> HostInput| {
                let canvas = canvas.clone();
                let dispatch = dispatch.clone();
                move |event: Event| {
                    if let Some(e) = event.dyn_ref::<MouseEvent>() {
                        let [x, y] = local_point(&canvas, e.client_x() as f64, e.client_y() as f64);
                        if dispatch(map(x, y)) {
                            event.prevent_default();
                        }
                    }
                }
            };
            listeners.add(&canvas_target, "mousedown", false, mouse(|x, y| HostInput::PointerDown { x, y }))?;
            listeners.add(&window_target, "mousemove", false, mouse(|x, y| HostInput::PointerMove { x, y }))?;
            listeners.add(&window_target, "mouseup", false, mouse(|x, y| HostInput::PointerUp { x, y }))?;

            let cancel = dispatch.clone();
            listeners.add(&window_target, "blur", false, move |_event: Event| {
                cancel(HostInput::PointerCancel);
            })?;

            let wheel = dispatch.clone();
            listeners.add(&canvas_target, "wheel", true, move |event: Event| {
                if let Some(e) = event.dyn_ref::<WheelEvent>() {
                    if wheel(HostInput::Wheel { delta_y: e.delta_y() }) {
                        event.prevent_default();
                    }
                }
            })?;

            // Touch listeners are non-passive so drags and pinches can block
            // page scrolling.
            let touch = |map: fn(Vec<[f64; 2]>) -> HostInput| {
                let canvas = canvas.clone();
                let dispatch = dispatch.clone();
                move |event: Event| {
                    if let Some(e) = event.dyn_ref::<TouchEvent>() {
                        if dispatch(map(touch_points(&canvas, &e.touches()))) {
                            event.prevent_default();
                        }
                    }
                }
            };
            listeners.add(&canvas_target, "touchstart", true, touch(HostInput::TouchStart))?;
            listeners.add(&canvas_target, "touchmove", true, touch(HostInput::TouchMove))?;

            for name in ["touchend", "touchcancel"] {
                let canvas = canvas.clone();
                let dispatch = dispatch.clone();
                listeners.add(&canvas_target, name, true, move |event: Event| {
                    if let Some(e) = event.dyn_ref::<TouchEvent>() {
                        let remaining = touch_points(&canvas, &e.touches());
                        let released = touch_points(&canvas, &e.changed_touches())
                            .first()
                            .copied()
                            .unwrap_or([f64::NAN, f64::NAN]);
                        if name == "touchcancel" {
                            dispatch(HostInput::PointerCancel);
                        } else if dispatch(HostInput::TouchEnd {
                            remaining,
                            released,
                        }) {
                            // Keeps the browser from replaying the tap as mouse events.
                            event.prevent_default();
                        }
                    }
                })?;
            }

            let resize_canvas = canvas.clone();
            let resize = dispatch.clone();
            listeners.add(&window_target, "resize", false, move |_event: Event| {
                let (width_px, height_px) = sync_canvas_size(&resize_canvas);
                resize(HostInput::Resize {
                    width_px,
                    height_px,
                    pixel_ratio: device_pixel_ratio(),
                });
            })?;

            let visibility = dispatch.clone();
            listeners.add(&document_target, "visibilitychange", false, move |_event: Event| {
                let visible = web_sys::window()
                    .and_then(|w| w.document())
                    .map(|d| d.visibility_state() == VisibilityState::Visible)
                    .unwrap_or(true);
                visibility(HostInput::Visibility { visible });
            })?;

            tracing::debug!(count = listeners.registered.len(), "input listeners registered");
            Ok(listeners)
        }

        fn add(
            &mut self,
            target: &EventTarget,
            name: &'static str,
            non_passive: bool,
            handler: impl FnMut(Event) + 'static,
        ) -> Result<(), JsValue> {
            let closure = Handler::new(handler);
            if non_passive {
                let options = AddEventListenerOptions::new();
                options.set_passive(false);
                target.add_event_listener_with_callback_and_add_event_listener_options(
                    name,
                    closure.as_ref().unchecked_ref(),
                    &options,
                )?;
            } else {
                target.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
            }
            self.registered.push((target.clone(), name, closure));
            Ok(())
        }

        pub fn detach(&mut self) {
            let registered = std::mem::take(&mut self.registered);
            for (target, name, closure) in &registered {
                let _ = target
                    .remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
            }
            tracing::debug!(count = registered.len(), "input listeners removed");
            spawn_local(async move { drop(registered) });
        }
    }

    /// `requestAnimationFrame` loop handing host time in seconds to a callback.
    pub struct FrameLoop {
        running: Rc<Cell<bool>>,
        pending: Rc<Cell<Option<i32>>>,
        closure: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>,
    }

    impl std::fmt::Debug for FrameLoop {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FrameLoop")
                .field("running", &self.running.get())
                .finish()
        }
    }

    fn request_frame(closure: &Closure<dyn FnMut(f64)>) -> Option<i32> {
        web_sys::window()?
            .request_animation_frame(closure.as_ref().unchecked_ref())
            .ok()
    }

    impl FrameLoop {
        pub fn start(on_frame: FrameCallback) -> Self {
            let running = Rc::new(Cell::new(true));
            let pending = Rc::new(Cell::new(None));
            let closure: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> =
                Rc::new(RefCell::new(None));

            let (r, p, c) = (running.clone(), pending.clone(), closure.clone());
            *closure.borrow_mut() = Some(Closure::new(move |timestamp_ms: f64| {
                p.set(None);
                if !r.get() {
                    return;
                }
                on_frame(timestamp_ms / 1000.0);
                // The callback may have stopped the loop.
                if r.get() {
                    if let Some(next) = c.borrow().as_ref() {
                        p.set(request_frame(next));
                    }
                }
            }));
            if let Some(first) = closure.borrow().as_ref() {
                pending.set(request_frame(first));
            }

            Self {
                running,
                pending,
                closure,
            }
        }

        pub fn stop(&mut self) {
            if !self.running.replace(false) {
                return;
            }
            if let (Some(handle), Some(window)) = (self.pending.take(), web_sys::window()) {
                let _ = window.cancel_animation_frame(handle);
            }
            let closure = self.closure.borrow_mut().take();
            spawn_local(async move { drop(closure) });
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use wasm_bindgen::prelude::JsValue;
    use web_sys::HtmlCanvasElement;

    use super::{Dispatcher, FrameCallback};

    #[derive(Debug, Default)]
    pub struct Listeners;

    impl Listeners {
        pub fn attach(_canvas: &HtmlCanvasElement, _dispatch: Dispatcher) -> Result<Self, JsValue> {
            Err(JsValue::from_str(
                "DOM input is only available on wasm32 targets",
            ))
        }

        pub fn detach(&mut self) {}
    }

    pub fn device_pixel_ratio() -> f64 {
        1.0
    }

    pub fn sync_canvas_size(_canvas: &HtmlCanvasElement) -> (u32, u32) {
        (1, 1)
    }

    #[derive(Debug, Default)]
    pub struct FrameLoop;

    impl FrameLoop {
        pub fn start(_on_frame: FrameCallback) -> Self {
            Self
        }

        pub fn stop(&mut self) {}
    }
}

pub use imp::{FrameLoop, Listeners, device_pixel_ratio, sync_canvas_size};

#[cfg(test)]
mod tests {
    use super::{HostInput, dispatch};
    use crate::config::EngineConfig;
    use crate::engine::{Engine, EngineEvent};

    fn engine_at(pixel_ratio: f64) -> Engine {
        let mut e = Engine::new(EngineConfig::default(), 7);
        assert!(!dispatch(
            &mut e,
            HostInput::Resize {
                width_px: 800,
                height_px: 600,
                pixel_ratio,
            }
        ));
        e
    }

    fn engine() -> Engine {
        engine_at(1.0)
    }

    fn picks(e: &mut Engine) -> Vec<EngineEvent> {
        e.drain_events().into_iter().map(|ev| ev.payload).collect()
    }

    #[test]
    fn wheel_always_suppresses_scrolling() {
        let mut e = engine();
        let before = e.camera().target_distance();
        assert!(dispatch(&mut e, HostInput::Wheel { delta_y: 200.0 }));
        assert!(e.camera().target_distance() > before);
    }

    #[test]
    fn touch_tap_becomes_a_pick() {
        let mut e = engine();
        dispatch(&mut e, HostInput::TouchStart(vec![[400.0, 300.0]]));
        assert!(!dispatch(&mut e, HostInput::TouchMove(vec![[403.0, 302.0]])));
        assert!(dispatch(
            &mut e,
            HostInput::TouchEnd {
                remaining: vec![],
                released: [403.0, 302.0],
            },
        ));
        assert_eq!(picks(&mut e), vec![EngineEvent::EntityPicked(None)]);
    }

    #[test]
    fn replayed_mouse_events_after_a_tap_do_not_pick_again() {
        let mut e = engine();
        dispatch(&mut e, HostInput::TouchStart(vec![[400.0, 300.0]]));
        assert!(dispatch(
            &mut e,
            HostInput::TouchEnd {
                remaining: vec![],
                released: [400.0, 300.0],
            },
        ));
        assert!(!dispatch(&mut e, HostInput::PointerMove { x: 400.0, y: 300.0 }));
        dispatch(&mut e, HostInput::PointerDown { x: 400.0, y: 300.0 });
        dispatch(&mut e, HostInput::PointerUp { x: 400.0, y: 300.0 });
        assert_eq!(picks(&mut e), vec![EngineEvent::EntityPicked(None)]);
    }

    #[test]
    fn tap_threshold_is_measured_in_css_pixels() {
        // 15 device pixels on a 3x screen is a 5 px wobble, still a tap.
        let mut e = engine_at(3.0);
        dispatch(&mut e, HostInput::PointerDown { x: 2.0, y: 2.0 });
        assert!(!dispatch(&mut e, HostInput::PointerMove { x: 17.0, y: 2.0 }));
        dispatch(&mut e, HostInput::PointerUp { x: 17.0, y: 2.0 });
        assert_eq!(picks(&mut e), vec![EngineEvent::EntityPicked(None)]);
    }

    #[test]
    fn touch_drag_blocks_scrolling_and_does_not_pick() {
        let mut e = engine();
        dispatch(&mut e, HostInput::TouchStart(vec![[100.0, 100.0]]));
        assert!(dispatch(&mut e, HostInput::TouchMove(vec![[140.0, 100.0]])));
        dispatch(
            &mut e,
            HostInput::TouchEnd {
                remaining: vec![],
                released: [140.0, 100.0],
            },
        );
        assert!(e.drain_events().is_empty());
    }

    #[test]
    fn pinch_start_suppresses_default_zoom() {
        let mut e = engine();
        assert!(dispatch(
            &mut e,
            HostInput::TouchStart(vec![[0.0, 0.0], [50.0, 0.0]])
        ));
    }

    #[test]
    fn visibility_toggles_frame_production() {
        let mut e = engine();
        dispatch(&mut e, HostInput::Visibility { visible: false });
        assert!(!e.frame(1.0));
        dispatch(&mut e, HostInput::Visibility { visible: true });
        assert!(e.frame(2.0));
    }
}
