//! crownview: an interactive viewer for dental crown restoration cases.
//!
//! Three mesh slots (upper jaw, lower jaw, restoration) are loaded from
//! user-supplied URLs, parsed from STL or OBJ, and rendered with an orbit
//! camera. Loading failures fall back to bundled reference meshes or
//! procedural placeholders; the viewport always ends up renderable.

pub mod camera;
pub mod mesh;
pub mod renderer;
pub mod scene;

use camera::OrbitCamera;
use eframe::egui;
use glam::Mat4;
use renderer::{FrameParams, SceneRenderer, SlotDraw};
use scene::{LoadAttempt, LoadInbox, MeshSlot, SLOT_KINDS, SlotKind};
use std::sync::{Arc, Mutex};

/// Source locators for the three slots; any may be absent, in which case
/// that slot stays empty.
#[derive(Debug, Clone, Default)]
pub struct SlotSources {
    pub upper_jaw: Option<String>,
    pub lower_jaw: Option<String>,
    pub restoration: Option<String>,
}

impl SlotSources {
    fn get(&self, kind: SlotKind) -> Option<&str> {
        match kind {
            SlotKind::UpperJaw => self.upper_jaw.as_deref(),
            SlotKind::LowerJaw => self.lower_jaw.as_deref(),
            SlotKind::Restoration => self.restoration.as_deref(),
        }
    }
}

/// Coarse viewer state for the host page: spinner, normal operation, or the
/// terminal no-GL error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerStatus {
    Loading,
    Ready,
    Fatal,
}

/// Pointer-drag state machine over the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragMode {
    Idle,
    Rotating,
    Panning,
}

pub struct ViewerApp {
    slots: [MeshSlot; 3],
    camera: OrbitCamera,
    drag: DragMode,
    /// Terminal error: the GL context could not be created.
    fatal: Option<String>,
    /// Slot loads still in flight.
    pending: usize,
    inbox: LoadInbox,
    /// Bumped whenever sources change; stale completions are dropped.
    generation: u64,
    gl: Option<Arc<glow::Context>>,
    gpu: Option<Arc<SceneRenderer>>,
}

impl ViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, sources: SlotSources) -> Self {
        let mut app = Self {
            slots: SLOT_KINDS.map(MeshSlot::new),
            camera: OrbitCamera::new(),
            drag: DragMode::Idle,
            fatal: None,
            pending: 0,
            inbox: Arc::new(Mutex::new(Vec::new())),
            generation: 0,
            gl: cc.gl.clone(),
            gpu: None,
        };
        if app.gl.is_none() {
            log::error!("render context unavailable, viewer cannot start");
            app.fatal = Some("3D rendering is not available in this browser.".to_string());
        } else {
            app.load_sources(&sources);
        }
        app
    }

    pub fn status(&self) -> ViewerStatus {
        if self.fatal.is_some() {
            ViewerStatus::Fatal
        } else if self.pending > 0 {
            ViewerStatus::Loading
        } else {
            ViewerStatus::Ready
        }
    }

    /// Per-slot load records, for debug surfaces.
    pub fn diagnostics(&self) -> impl Iterator<Item = &LoadAttempt> {
        self.slots.iter().filter_map(|s| s.attempt.as_ref())
    }

    /// Replace the slot sources and reload. Results from the previous
    /// generation that are still in flight will be discarded on arrival.
    pub fn load_sources(&mut self, sources: &SlotSources) {
        self.generation += 1;
        self.pending = 0;
        for slot in &mut self.slots {
            slot.clear();
        }
        for kind in SLOT_KINDS {
            if let Some(url) = sources.get(kind) {
                scene::spawn_slot_load(kind, url.to_string(), self.generation, self.inbox.clone());
                self.pending += 1;
            }
        }
    }

    fn drain_inbox(&mut self) {
        let loaded: Vec<scene::LoadedSlot> = self.inbox.lock().unwrap().drain(..).collect();
        for load in loaded {
            if load.generation != self.generation {
                log::debug!("dropping stale load for {:?}", load.resolved.kind);
                continue;
            }
            if let Ok(json) = serde_json::to_string(&load.resolved.attempt) {
                log::info!("slot load: {json}");
            }
            self.slots[load.resolved.kind.index()].install(load.resolved);
            self.pending = self.pending.saturating_sub(1);
        }
    }

    fn frame_params(&self, rect: egui::Rect) -> FrameParams {
        let aspect = rect.width() / rect.height().max(1.0);
        FrameParams {
            view_proj: self.camera.view_projection(aspect),
            draws: self.slots.each_ref().map(|slot| SlotDraw {
                visible: slot.renderable(),
                model: Mat4::from_translation(slot.kind.offset()),
                color: slot.kind.color(),
            }),
        }
    }

    fn controls_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("controls")
            .resizable(false)
            .min_width(150.0)
            .show(ctx, |ui| {
                ui.heading("Restoration case");

                ui.separator();
                ui.label("Visibility");
                for slot in &mut self.slots {
                    ui.horizontal(|ui| {
                        let c = slot.kind.color();
                        let swatch = egui::Color32::from_rgb(
                            (c[0] * 255.0) as u8,
                            (c[1] * 255.0) as u8,
                            (c[2] * 255.0) as u8,
                        );
                        ui.label(egui::RichText::new("■").color(swatch));
                        ui.checkbox(&mut slot.visible, slot.kind.label());
                    });
                }

                ui.separator();
                ui.label("Camera");
                ui.horizontal_wrapped(|ui| {
                    if ui.button("Zoom in").clicked() {
                        self.camera.zoom_in();
                    }
                    if ui.button("Zoom out").clicked() {
                        self.camera.zoom_out();
                    }
                    if ui.button("Reset view").clicked() {
                        self.camera.reset();
                    }
                });
                ui.label("Left-drag rotate · right-drag pan · wheel zoom");

                ui.separator();
                match self.status() {
                    ViewerStatus::Loading => {
                        ui.label(format!("Loading {} model(s)…", self.pending));
                    }
                    ViewerStatus::Ready => {
                        ui.label("Ready");
                    }
                    ViewerStatus::Fatal => {}
                }

                ui.collapsing("Diagnostics", |ui| {
                    for slot in &self.slots {
                        match &slot.attempt {
                            Some(a) => {
                                ui.monospace(format!(
                                    "{}: {:?} via {:?}",
                                    slot.kind.label(),
                                    a.outcome,
                                    a.tier
                                ));
                            }
                            None => {
                                ui.monospace(format!("{}: —", slot.kind.label()));
                            }
                        }
                    }
                });
            });
    }

    fn viewport(&mut self, ui: &mut egui::Ui) {
        ui.set_min_size(ui.available_size());
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());

        // ───── pointer state machine ─────
        if response.drag_started_by(egui::PointerButton::Primary) {
            self.drag = DragMode::Rotating;
        } else if response.drag_started_by(egui::PointerButton::Secondary) {
            self.drag = DragMode::Panning;
        }
        if response.drag_stopped() {
            self.drag = DragMode::Idle;
        }
        let delta = response.drag_delta();
        match self.drag {
            DragMode::Rotating if response.dragged() => self.camera.rotate(delta.x, delta.y),
            DragMode::Panning if response.dragged() => self.camera.pan(delta.x, delta.y),
            _ => {}
        }

        // Wheel zoom is independent of the drag state.
        if response.hovered() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                self.camera.handle_scroll(scroll);
            }
        }

        // ───── GL paint ─────
        if let Some(gl) = self.gl.clone() {
            if self.gpu.is_none() {
                match SceneRenderer::new(&gl) {
                    Ok(renderer) => self.gpu = Some(Arc::new(renderer)),
                    Err(e) => {
                        log::error!("renderer setup failed: {e}");
                        self.fatal = Some("3D rendering is not available in this browser.".into());
                        return;
                    }
                }
            }

            // Upload freshly resolved geometry while we hold the only
            // strong reference (last frame's paint callback is gone).
            if let Some(gpu_arc) = &mut self.gpu {
                if let Some(gpu) = Arc::get_mut(gpu_arc) {
                    for slot in &mut self.slots {
                        if slot.needs_upload {
                            if let Some(geometry) = &slot.geometry {
                                gpu.upload_slot(&gl, slot.kind.index(), geometry);
                            }
                            slot.needs_upload = false;
                        }
                    }
                }
            }

            if let Some(gpu_arc) = &self.gpu {
                let gpu_for_cb = gpu_arc.clone();
                let frame_params = self.frame_params(rect);
                let callback = egui_glow::CallbackFn::new(move |_info, painter| {
                    gpu_for_cb.paint(painter.gl(), &frame_params);
                });
                ui.painter().add(egui::PaintCallback {
                    rect,
                    callback: Arc::new(callback),
                });
            }
        }

        if self.pending > 0 {
            let spinner_rect =
                egui::Rect::from_center_size(rect.center(), egui::vec2(32.0, 32.0));
            ui.put(spinner_rect, egui::Spinner::new().size(32.0));
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_inbox();

        if let Some(message) = self.fatal.clone() {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(80.0);
                    ui.heading("Viewer unavailable");
                    ui.label(message);
                });
            });
            return;
        }

        self.controls_panel(ctx);
        egui::CentralPanel::default().show(ctx, |ui| self.viewport(ui));

        // Continuous render loop: visibility toggles, camera motion and
        // finished loads are picked up on the next frame.
        ctx.request_repaint();
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        if let (Some(gl), Some(gpu)) = (gl, &self.gpu) {
            gpu.destroy(gl);
        }
    }
}

// ── Web entry-point ──
#[cfg(target_arch = "wasm32")]
pub mod web {
    use super::*;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::prelude::*;

    fn sources_from_query() -> SlotSources {
        let Some(window) = web_sys::window() else {
            return SlotSources::default();
        };
        let Ok(search) = window.location().search() else {
            return SlotSources::default();
        };
        let Ok(params) = web_sys::UrlSearchParams::new_with_str(&search) else {
            return SlotSources::default();
        };
        SlotSources {
            upper_jaw: params.get("upper"),
            lower_jaw: params.get("lower"),
            restoration: params.get("restoration"),
        }
    }

    #[wasm_bindgen(start)]
    pub async fn start() -> Result<(), JsValue> {
        // Redirect `log` macros & panic messages to the browser console.
        eframe::WebLogger::init(log::LevelFilter::Debug).ok();
        console_error_panic_hook::set_once();

        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| JsValue::from_str("no document"))?;
        let canvas = document
            .get_element_by_id("crownview_canvas")
            .ok_or_else(|| JsValue::from_str("missing canvas #crownview_canvas"))?
            .dyn_into::<web_sys::HtmlCanvasElement>()?;

        // Right-drag pans; keep the browser context menu off the render
        // surface.
        let suppress =
            Closure::<dyn FnMut(web_sys::Event)>::new(|event: web_sys::Event| {
                event.prevent_default();
            });
        canvas.set_oncontextmenu(Some(suppress.as_ref().unchecked_ref()));
        suppress.forget();

        let sources = sources_from_query();
        let mut web_options = eframe::WebOptions::default();
        web_options.depth_buffer = 24;

        eframe::WebRunner::new()
            .start(
                canvas,
                web_options,
                Box::new(move |cc| Ok(Box::new(ViewerApp::new(cc, sources)))),
            )
            .await?;

        Ok(())
    }
}
