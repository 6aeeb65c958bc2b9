// main.rs: window, input and egui overlay around the tour viewer

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod i18n;
mod mesh;
mod renderer;

use renderer::Renderer;

use glam::{EulerRot, Vec2};
use panorama_tour::camera::DEFAULT_FOV;
use panorama_tour::config::{LabelStyle, RichContent, Tour, ViewerSettings};
use panorama_tour::texture::TextureLoader;
use panorama_tour::{HitTarget, LabelBoard, LabelKind, LabelContent, LabelSurface, ViewerManager, ON_LABELS_CHANGE};

use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pointer travel (physical pixels) below which a press/release is a click.
const CLICK_SLOP: f32 = 5.0;

struct Args {
    lang: Option<String>,
    tour: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args { lang: None, tour: None };
    while let Some(arg) = args.next() {
        if arg == "--lang" {
            parsed.lang = args.next();
        } else if let Some(lang) = arg.strip_prefix("--lang=") {
            parsed.lang = Some(lang.to_string());
        } else {
            parsed.tour = Some(PathBuf::from(arg));
        }
    }
    parsed
}

/// Things the overlay asks for; applied once the frame is rendered.
enum UiAction {
    OpenTour(PathBuf),
    GoTo(usize),
    ResetView,
    ToggleFullscreen,
    SetAutoRotate(bool),
    SetLanguage(String),
    Exit,
}

#[derive(Default)]
struct UiState {
    lang: String,
    show_labels: bool,
    show_fps: bool,
    fps: f32,
    error: Option<String>,
    is_fullscreen: bool,
}

struct App {
    viewer: ViewerManager<LabelBoard>,
    settings: ViewerSettings,
    loader: TextureLoader,
    labels_dirty: Rc<Cell<bool>>,
    ui: UiState,
}

impl App {
    fn new(tour: Tour, size: winit::dpi::PhysicalSize<u32>, ui: UiState) -> Self {
        let mut viewer = ViewerManager::new(LabelBoard::new(), Instant::now());

        let labels_dirty = Rc::new(Cell::new(true));
        let flag = labels_dirty.clone();
        viewer.events_mut().add_listener(
            ON_LABELS_CHANGE,
            Rc::new(move |change: &panorama_tour::LabelsChanged| {
                log::debug!("{} marker labels", change.labels.len());
                flag.set(true);
                anyhow::Ok(())
            }),
        );

        viewer.set_size(size.width as f32, size.height as f32);
        viewer.apply_settings(&tour.settings);
        viewer.set_points(tour.stops());
        viewer.start_drawing();

        Self {
            viewer,
            settings: tour.settings,
            loader: TextureLoader::new(),
            labels_dirty,
            ui,
        }
    }

    fn transition(&self) -> Duration {
        Duration::from_millis(self.settings.transition_ms)
    }

    fn go_to(&mut self, index: usize) {
        let duration = self.transition();
        if !self.viewer.move_to_point_by_index(index, duration) {
            log::debug!("navigation to {index} ignored");
        }
    }

    fn step(&mut self, forward: bool) {
        let len = self.viewer.len();
        if len == 0 {
            return;
        }
        let current = self.viewer.active_index();
        let next = if forward { (current + 1) % len } else { (current + len - 1) % len };
        self.go_to(next);
    }

    fn reset_view(&mut self) {
        let rotation = self.settings.initial_camera_rotation.unwrap_or([0.0; 3]);
        self.viewer.set_initial_rotation(rotation);
        self.viewer.set_fov_delta(DEFAULT_FOV - self.viewer.fov());
    }

    /// Mounts a label slot for every label the viewer has and places the new
    /// ones right away.
    fn sync_labels(&mut self) {
        let ids: Vec<String> = self.viewer.labels().map(|l| l.id.clone()).collect();
        let board = self.viewer.surface();
        let changed = board.len() != ids.len() || ids.iter().any(|id| !board.is_mounted(id));

        let dirty = self.labels_dirty.replace(false);
        if changed || dirty {
            self.viewer.surface_mut().sync(ids.iter().map(String::as_str));
            self.viewer.update_point_marker_label_positions();
            self.viewer.update_marker_label_positions();
        }
    }

    fn pump_textures(&mut self, renderer: &mut Renderer) {
        for (src, img) in self.loader.poll() {
            renderer.upload_texture(&src, img);
        }
        for src in self.viewer.scene().texture_sources() {
            if !renderer.has_texture(src) {
                self.loader.request(src);
            }
        }
    }
}

fn load_tour(path: Option<&PathBuf>) -> Result<Tour, panorama_tour::TourError> {
    match path {
        Some(path) => Tour::load(path),
        None => {
            log::info!("no tour given, showing the demo tour");
            Ok(Tour::demo())
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = parse_args();
    let lang = i18n::resolve_lang(args.lang.as_deref());
    i18n::init(&lang);

    let (tour, error) = match load_tour(args.tour.as_ref()) {
        Ok(tour) => (tour, None),
        Err(err) => {
            log::error!("{err}");
            (Tour::demo(), Some(i18n::tr_with("error.open_tour", &[("err", err.to_string())])))
        }
    };

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(i18n::tr("app.title"))
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)?,
    );

    let mut renderer = pollster::block_on(Renderer::new(window.clone()))?;
    let mut app = App::new(
        tour,
        renderer.size,
        UiState {
            lang,
            show_labels: true,
            show_fps: false,
            fps: 0.0,
            error,
            is_fullscreen: false,
        },
    );

    // pointer state
    let mut pressed_at: Option<PhysicalPosition<f64>> = None;
    let mut last_pos: Option<PhysicalPosition<f64>> = None;
    let mut travelled = 0.0f32;
    let mut cursor = PhysicalPosition::new(0.0, 0.0);

    // FPS
    let mut last_fps_time = Instant::now();
    let mut frame_count = 0;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => {
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        app.viewer.set_size(new_size.width as f32, new_size.height as f32);
                    }

                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        renderer.resize(*new_inner_size);
                        app.viewer
                            .set_size(new_inner_size.width as f32, new_inner_size.height as f32);
                    }

                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        match input.virtual_keycode {
                            Some(VirtualKeyCode::Left) => app.step(false),
                            Some(VirtualKeyCode::Right) => app.step(true),
                            Some(VirtualKeyCode::O) => {
                                if let Some(path) = pick_tour_file() {
                                    apply(UiAction::OpenTour(path), &mut app, &renderer, &window, control_flow);
                                }
                            }
                            Some(VirtualKeyCode::F11) => {
                                apply(UiAction::ToggleFullscreen, &mut app, &renderer, &window, control_flow)
                            }
                            _ => {}
                        }
                    }

                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => match state {
                        ElementState::Pressed => pointer_down(&mut app, cursor, &mut pressed_at, &mut last_pos, &mut travelled),
                        ElementState::Released => pointer_up(&mut app, cursor, &mut pressed_at, &mut last_pos, travelled),
                    },

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position;
                        pointer_move(&mut app, position, &mut last_pos, &mut travelled);
                    }

                    WindowEvent::Touch(touch) => {
                        cursor = touch.location;
                        match touch.phase {
                            TouchPhase::Started => {
                                pointer_down(&mut app, touch.location, &mut pressed_at, &mut last_pos, &mut travelled)
                            }
                            TouchPhase::Moved => pointer_move(&mut app, touch.location, &mut last_pos, &mut travelled),
                            TouchPhase::Ended | TouchPhase::Cancelled => {
                                pointer_up(&mut app, touch.location, &mut pressed_at, &mut last_pos, travelled)
                            }
                        }
                    }

                    WindowEvent::MouseWheel { delta, .. } if app.settings.enable_zoom => {
                        // lines are scaled to roughly the pixel distance of one notch
                        let pixels = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y * 100.0,
                            MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                        };
                        app.viewer.set_fov_delta(-pixels * 0.05);
                    }

                    WindowEvent::DroppedFile(path) => {
                        apply(UiAction::OpenTour(path), &mut app, &renderer, &window, control_flow);
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                frame_count += 1;
                let now = Instant::now();
                let elapsed = now.duration_since(last_fps_time).as_secs_f32();
                if elapsed >= 1.0 {
                    app.ui.fps = frame_count as f32 / elapsed;
                    frame_count = 0;
                    last_fps_time = now;
                }

                app.pump_textures(&mut renderer);
                app.sync_labels();
                if !app.viewer.frame(now) {
                    *control_flow = ControlFlow::Wait;
                }

                let mut actions = Vec::new();
                let mut widths = Vec::new();
                let pending = app.loader.pending();
                let render_result = renderer.render_with_ui(&window, app.viewer.scene(), app.viewer.camera(), |ctx| {
                    draw_ui(ctx, &app.viewer, &app.settings, &mut app.ui, pending, &mut actions);
                    if app.ui.show_labels && !app.settings.hide_labels {
                        draw_labels(
                            ctx,
                            &app.viewer,
                            &app.settings.label_style,
                            window.scale_factor() as f32,
                            &mut widths,
                            &mut actions,
                        );
                    }
                });

                for (id, width) in widths {
                    app.viewer.surface_mut().record_width(&id, width);
                }
                for action in actions {
                    apply(action, &mut app, &renderer, &window, control_flow);
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::error!("render error: {e:?}"),
                }
            }

            Event::MainEventsCleared => window.request_redraw(),

            _ => {}
        }
    })
}

fn pointer_down(
    app: &mut App,
    position: PhysicalPosition<f64>,
    pressed_at: &mut Option<PhysicalPosition<f64>>,
    last_pos: &mut Option<PhysicalPosition<f64>>,
    travelled: &mut f32,
) {
    app.viewer.advance(Instant::now());
    app.viewer.pause_auto_rotate();
    *pressed_at = Some(position);
    *last_pos = Some(position);
    *travelled = 0.0;
}

fn pointer_move(
    app: &mut App,
    position: PhysicalPosition<f64>,
    last_pos: &mut Option<PhysicalPosition<f64>>,
    travelled: &mut f32,
) {
    let Some(last) = *last_pos else {
        return;
    };
    let delta = Vec2::new((position.x - last.x) as f32, (position.y - last.y) as f32);
    *travelled += delta.length();
    app.viewer
        .move_camera_2d_delta(delta * app.settings.drag_speed, 1.0);
    *last_pos = Some(position);
}

fn pointer_up(
    app: &mut App,
    position: PhysicalPosition<f64>,
    pressed_at: &mut Option<PhysicalPosition<f64>>,
    last_pos: &mut Option<PhysicalPosition<f64>>,
    travelled: f32,
) {
    *last_pos = None;
    if pressed_at.take().is_none() {
        return;
    }
    app.viewer.advance(Instant::now());
    app.viewer.resume_auto_rotate_later();

    if travelled > CLICK_SLOP {
        return;
    }
    let pointer = Vec2::new(position.x as f32, position.y as f32);
    match app.viewer.hit_test(pointer) {
        Some(HitTarget::PointMarker(index)) => app.go_to(index),
        Some(HitTarget::Marker(index)) => log::debug!("marker {index} clicked"),
        None => {}
    }
}

fn pick_tour_file() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter(&i18n::tr("file.filter.tours"), &["json"])
        .pick_file()
}

fn apply(action: UiAction, app: &mut App, renderer: &Renderer, window: &Window, control_flow: &mut ControlFlow) {
    match action {
        UiAction::OpenTour(path) => match Tour::load(&path) {
            Ok(tour) => {
                let ui = std::mem::take(&mut app.ui);
                *app = App::new(tour, renderer.size, UiState { error: None, ..ui });
            }
            Err(err) => {
                log::error!("{err}");
                app.ui.error = Some(i18n::tr_with("error.open_tour", &[("err", err.to_string())]));
            }
        },
        UiAction::GoTo(index) => app.go_to(index),
        UiAction::ResetView => app.reset_view(),
        UiAction::ToggleFullscreen => {
            app.ui.is_fullscreen = !app.ui.is_fullscreen;
            window.set_fullscreen(app.ui.is_fullscreen.then(|| Fullscreen::Borderless(None)));
        }
        UiAction::SetAutoRotate(enabled) => {
            app.settings.auto_rotate = enabled;
            app.viewer.set_auto_rotate(enabled, app.settings.auto_rotate_speed);
        }
        UiAction::SetLanguage(lang) => {
            i18n::init(&lang);
            window.set_title(&i18n::tr("app.title"));
            app.ui.lang = lang;
        }
        UiAction::Exit => *control_flow = ControlFlow::Exit,
    }
}

fn stop_name(viewer: &ViewerManager<LabelBoard>, index: usize) -> String {
    let label = viewer.stop(index).and_then(|s| s.label.as_ref());
    match label {
        Some(LabelContent::Text(text)) => text.clone(),
        Some(LabelContent::Rich(RichContent { title: Some(title), .. })) => title.clone(),
        _ => i18n::tr_with("position.unnamed", &[("index", (index + 1).to_string())]),
    }
}

fn draw_ui(
    ctx: &egui::Context,
    viewer: &ViewerManager<LabelBoard>,
    settings: &ViewerSettings,
    ui_state: &mut UiState,
    pending_images: usize,
    actions: &mut Vec<UiAction>,
) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button(i18n::tr("menu.file"), |ui| {
                if ui.button(i18n::tr("menu.open_tour")).clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_tour_file() {
                        actions.push(UiAction::OpenTour(path));
                    }
                }
                if ui.button(i18n::tr("menu.exit")).clicked() {
                    actions.push(UiAction::Exit);
                }
            });

            ui.menu_button(i18n::tr("menu.view"), |ui| {
                if ui.button(i18n::tr("view.reset")).clicked() {
                    actions.push(UiAction::ResetView);
                    ui.close_menu();
                }

                let fullscreen = if ui_state.is_fullscreen {
                    i18n::tr("view.fullscreen.exit")
                } else {
                    i18n::tr("view.fullscreen.enter")
                };
                if ui.button(fullscreen).clicked() {
                    actions.push(UiAction::ToggleFullscreen);
                    ui.close_menu();
                }

                ui.separator();
                let mut auto_rotate = settings.auto_rotate;
                if ui.checkbox(&mut auto_rotate, i18n::tr("view.auto_rotate")).clicked() {
                    actions.push(UiAction::SetAutoRotate(auto_rotate));
                }
                ui.checkbox(&mut ui_state.show_labels, i18n::tr("view.show_labels"));
                ui.checkbox(&mut ui_state.show_fps, i18n::tr("view.show_fps"));
            });

            ui.menu_button(i18n::tr("menu.positions"), |ui| {
                for index in 0..viewer.len() {
                    let active = index == viewer.active_index();
                    if ui.radio(active, stop_name(viewer, index)).clicked() && !active {
                        actions.push(UiAction::GoTo(index));
                        ui.close_menu();
                    }
                }
            });

            ui.menu_button(i18n::tr("menu.language"), |ui| {
                for (code, name) in i18n::LANGUAGES {
                    if ui.radio(ui_state.lang == code, name).clicked() {
                        actions.push(UiAction::SetLanguage(code.to_string()));
                        ui.close_menu();
                    }
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if let Some(err) = &ui_state.error {
                ui.label(egui::RichText::new(err).color(egui::Color32::RED));
                ui.label("|");
            }
            if pending_images > 0 {
                ui.label(
                    egui::RichText::new(i18n::tr_with(
                        "status.loading_images",
                        &[("count", pending_images.to_string())],
                    ))
                    .color(egui::Color32::YELLOW),
                );
                ui.label("|");
            }

            if !viewer.is_empty() {
                ui.label(i18n::tr_with(
                    "status.position",
                    &[
                        ("index", (viewer.active_index() + 1).to_string()),
                        ("count", viewer.len().to_string()),
                    ],
                ));
                ui.label(stop_name(viewer, viewer.active_index()));
                ui.label("|");
            }
            if viewer.is_navigating() {
                ui.label(i18n::tr("status.navigating"));
                ui.label("|");
            }
            ui.label(format!("FOV: {:.1}°", viewer.fov()));
            let (yaw, pitch, _) = viewer.camera().orientation.to_euler(EulerRot::YXZ);
            ui.label("|");
            ui.label(format!("Yaw: {:.1}°", yaw.to_degrees()));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", pitch.to_degrees()));

            if ui_state.show_fps {
                ui.label("|");
                ui.label(egui::RichText::new(format!("FPS: {:.1}", ui_state.fps)).color(egui::Color32::GREEN));
            }
        });
    });
}

/// Draws every displayed label at the offset the viewer gave it and reports
/// the laid-out widths back, in physical pixels. Clicking a position label
/// travels there.
fn draw_labels(
    ctx: &egui::Context,
    viewer: &ViewerManager<LabelBoard>,
    style: &LabelStyle,
    pixels_per_point: f32,
    widths: &mut Vec<(String, f32)>,
    actions: &mut Vec<UiAction>,
) {
    let board = viewer.surface();
    for label in viewer.labels() {
        let Some(slot) = board.slot(&label.id).filter(|s| s.displayed) else {
            continue;
        };
        let Some(content) = &label.content else {
            continue;
        };

        let pos = egui::pos2(slot.offset.x / pixels_per_point, slot.offset.y / pixels_per_point);
        let area = egui::Area::new(egui::Id::new(label.id.as_str()))
            .fixed_pos(pos)
            .show(ctx, |ui| label_frame(ui, content, style));

        if let (true, LabelKind::Point { index }) = (area.inner, label.kind) {
            actions.push(UiAction::GoTo(index));
        }
        widths.push((label.id.clone(), area.response.rect.width() * pixels_per_point));
    }
}

/// Returns whether the label was clicked.
fn label_frame(ui: &mut egui::Ui, content: &LabelContent, style: &LabelStyle) -> bool {
    let [r, g, b, a] = style.background;
    let [tr, tg, tb, ta] = style.text_color;
    let text_color = egui::Color32::from_rgba_unmultiplied(tr, tg, tb, ta);

    let frame = egui::Frame::none()
        .fill(egui::Color32::from_rgba_unmultiplied(r, g, b, a))
        .rounding(style.rounding)
        .inner_margin(style.padding)
        .show(ui, |ui| {
            ui.set_max_width(320.0);
            match content {
                LabelContent::Text(text) => {
                    ui.label(egui::RichText::new(text).color(text_color));
                }
                LabelContent::Rich(rich) => {
                    ui.vertical(|ui| {
                        if let Some(title) = &rich.title {
                            ui.label(egui::RichText::new(title).color(text_color).strong());
                        }
                        for line in &rich.lines {
                            ui.label(egui::RichText::new(line).color(text_color));
                        }
                        if let Some(link) = &rich.link {
                            ui.hyperlink_to(link.text.as_str(), &link.href);
                        }
                    });
                }
            }
        });
    frame.response.interact(egui::Sense::click()).clicked()
}
