/// Viewer entry point
/// Window, input and present loop around the pipeline, or a single
/// headless frame exported as PPM with `--ppm <path>`.
use clap::Parser;
use glam::{Mat4, Vec2, Vec3};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use std::error::Error;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tile_raster::rendering::rasterizer::ndc_to_screen;
use tile_raster::{
    BackendKind, Camera, CameraController, Color, Framebuffer, Pipeline, RenderConfig, Triangle,
};
use winit::{
    event::*,
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

/// Software rasterizer viewer
#[derive(Parser)]
struct Args {
    /// JSON render config; defaults are used when omitted
    config: Option<PathBuf>,

    /// Render one frame without a window and write it as PPM
    #[arg(long)]
    ppm: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };
    log::info!(
        "{}x{}, tile {}, {:?} backend",
        config.width,
        config.height,
        config.tile_size,
        config.backend
    );

    let scene = demo_scene();
    match args.ppm {
        Some(path) => render_headless(config, &scene, &path),
        None => run_viewer(config, scene),
    }
}

fn start_camera(config: &RenderConfig) -> Camera {
    let mut camera = Camera::from_config(Vec3::new(3.0, 2.5, 5.0), config);
    camera.look_at(Vec3::new(0.0, 0.5, 0.0));
    camera
}

fn render_headless(
    config: RenderConfig,
    scene: &[Triangle],
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let camera = start_camera(&config);
    let mut framebuffer = Framebuffer::new(config.width, config.height);
    let mut pipeline = Pipeline::new(config);
    let mut backend = pipeline.create_backend()?;

    let view = camera.view_matrix();
    let projection = camera.projection_matrix();
    let stats = pipeline.render(scene, &view, &projection, &mut framebuffer, backend.as_mut())?;
    draw_ground_grid(&mut framebuffer, &camera);
    log::info!(
        "{} triangles -> {} rasterized, {} fragments",
        stats.triangles_submitted,
        stats.primitives_rasterized,
        stats.fragments_written
    );

    #[cfg(feature = "profiling")]
    tile_raster::FUNCTION_COUNTERS.snapshot().print_report();

    framebuffer.save_ppm(path)?;
    Ok(())
}

fn run_viewer(config: RenderConfig, scene: Vec<Triangle>) -> Result<(), Box<dyn Error>> {
    println!("=== tile_raster viewer ===");
    println!("Controls:");
    println!("  WASD - Move camera");
    println!("  Space/Shift - Up/Down");
    println!("  Mouse - Look around (click to capture)");
    println!("  B - Switch serial/tiled backend");
    println!("  P - Save frame.ppm");
    println!("  ESC - Exit");
    println!();

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("tile_raster")
            .with_inner_size(winit::dpi::LogicalSize::new(
                config.width as u32,
                config.height as u32,
            ))
            .build(&event_loop)?,
    );

    let context = softbuffer::Context::new(window.clone())?;
    let mut surface = softbuffer::Surface::new(&context, window.clone())?;

    let size = window.inner_size();
    let mut pipeline = Pipeline::new(config);
    pipeline.set_viewport(size.width.max(1) as usize, size.height.max(1) as usize);
    let mut framebuffer = Framebuffer::new(pipeline.config().width, pipeline.config().height);
    let mut backend = pipeline.create_backend()?;

    let mut camera = start_camera(pipeline.config());
    camera.set_aspect_ratio(pipeline.config().aspect_ratio());
    let mut camera_controller = CameraController::new();

    let mut last_frame = Instant::now();
    let mut frame_count = 0u32;
    let mut fps_timer = Instant::now();

    let mut mouse_captured = false;
    let mut last_mouse_pos: Option<(f64, f64)> = None;
    let mut save_requested = false;

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(new_size) => {
                    if new_size.width == 0 || new_size.height == 0 {
                        return;
                    }
                    let (w, h) = (new_size.width as usize, new_size.height as usize);
                    framebuffer.resize(w, h);
                    pipeline.set_viewport(w, h);
                    camera.set_aspect_ratio(pipeline.config().aspect_ratio());
                    match pipeline.create_backend() {
                        Ok(b) => backend = b,
                        Err(e) => {
                            log::error!("failed to recreate backend: {e}");
                            elwt.exit();
                        }
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    let pressed = event.state == ElementState::Pressed;

                    if let PhysicalKey::Code(keycode) = event.physical_key {
                        match keycode {
                            KeyCode::KeyW => camera_controller.forward_pressed = pressed,
                            KeyCode::KeyS => camera_controller.backward_pressed = pressed,
                            KeyCode::KeyA => camera_controller.left_pressed = pressed,
                            KeyCode::KeyD => camera_controller.right_pressed = pressed,
                            KeyCode::Space => camera_controller.up_pressed = pressed,
                            KeyCode::ShiftLeft => camera_controller.down_pressed = pressed,
                            KeyCode::KeyB if pressed && !event.repeat => {
                                let mut config = pipeline.config().clone();
                                config.backend = match config.backend {
                                    BackendKind::Serial => BackendKind::Tiled,
                                    BackendKind::Tiled => BackendKind::Serial,
                                };
                                pipeline = Pipeline::new(config);
                                match pipeline.create_backend() {
                                    Ok(b) => {
                                        backend = b;
                                        log::info!("backend: {}", backend.name());
                                    }
                                    Err(e) => {
                                        log::error!("failed to switch backend: {e}");
                                        elwt.exit();
                                    }
                                }
                            }
                            KeyCode::KeyP if pressed && !event.repeat => save_requested = true,
                            KeyCode::Escape if pressed => {
                                if mouse_captured {
                                    mouse_captured = false;
                                    last_mouse_pos = None;
                                    window.set_cursor_visible(true);
                                } else {
                                    elwt.exit();
                                }
                            }
                            _ => {}
                        }
                    }
                }
                WindowEvent::MouseInput { state, button, .. } => {
                    if button == MouseButton::Left && state == ElementState::Pressed {
                        mouse_captured = true;
                        window.set_cursor_visible(false);
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    if mouse_captured {
                        if let Some(last_pos) = last_mouse_pos {
                            let delta_x = position.x - last_pos.0;
                            let delta_y = position.y - last_pos.1;
                            camera.rotate(delta_x as f32, delta_y as f32);
                        }
                        last_mouse_pos = Some((position.x, position.y));
                    }
                }
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let dt = (now - last_frame).as_secs_f32();
                    last_frame = now;
                    camera_controller.update_camera(&mut camera, dt);

                    let view = camera.view_matrix();
                    let projection = camera.projection_matrix();
                    if let Err(e) = pipeline.render(
                        &scene,
                        &view,
                        &projection,
                        &mut framebuffer,
                        backend.as_mut(),
                    ) {
                        log::error!("frame dropped: {e}");
                        return;
                    }
                    draw_ground_grid(&mut framebuffer, &camera);

                    if save_requested {
                        save_requested = false;
                        if let Err(e) = framebuffer.save_ppm("frame.ppm") {
                            log::error!("{e}");
                        }
                    }

                    if let Err(e) = present(&mut surface, &framebuffer) {
                        log::error!("present failed: {e}");
                        elwt.exit();
                        return;
                    }

                    frame_count += 1;
                    if fps_timer.elapsed().as_secs() >= 1 {
                        println!("FPS: {} | Backend: {}", frame_count, backend.name());
                        frame_count = 0;
                        fps_timer = Instant::now();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        }
    })?;
    Ok(())
}

fn present(
    surface: &mut softbuffer::Surface<Arc<winit::window::Window>, Arc<winit::window::Window>>,
    framebuffer: &Framebuffer,
) -> Result<(), softbuffer::SoftBufferError> {
    let (Some(w), Some(h)) = (
        NonZeroU32::new(framebuffer.width as u32),
        NonZeroU32::new(framebuffer.height as u32),
    ) else {
        return Ok(());
    };
    surface.resize(w, h)?;
    let mut buffer = surface.buffer_mut()?;
    buffer.copy_from_slice(framebuffer.color_buffer_slice());
    buffer.present()
}

/// Depth-tested grid lines on y = 0. Segments with an endpoint behind the
/// near plane are skipped.
fn draw_ground_grid(framebuffer: &mut Framebuffer, camera: &Camera) {
    const HALF_EXTENT: i32 = 6;
    let view_proj: Mat4 = camera.view_projection_matrix();
    let (width, height) = (framebuffer.width as f32, framebuffer.height as f32);
    let project = |p: Vec3| {
        let clip = view_proj * p.extend(1.0);
        (clip.w > camera.near).then(|| ndc_to_screen(clip.truncate() / clip.w, width, height))
    };

    let mut segments = Vec::new();
    for i in -HALF_EXTENT..=HALF_EXTENT {
        let t = i as f32;
        let e = HALF_EXTENT as f32;
        segments.push((Vec3::new(t, 0.0, -e), Vec3::new(t, 0.0, e)));
        segments.push((Vec3::new(-e, 0.0, t), Vec3::new(e, 0.0, t)));
    }

    let color = Color::new(60, 60, 60);
    for (a, b) in segments {
        let (Some(pa), Some(pb)) = (project(a), project(b)) else {
            continue;
        };
        let (sa, sb) = (pa.truncate(), pb.truncate());
        if both_outside_screen(sa, sb, width, height) {
            continue;
        }
        framebuffer.draw_line(sa, sb, pa.z, pb.z, color);
    }
}

/// Both endpoints beyond the same screen edge: nothing of the segment shows.
fn both_outside_screen(a: Vec2, b: Vec2, width: f32, height: f32) -> bool {
    (a.x < 0.0 && b.x < 0.0)
        || (a.x > width && b.x > width)
        || (a.y < 0.0 && b.y < 0.0)
        || (a.y > height && b.y > height)
}

/// Vertex-colored cube resting on a ground quad, plus a large backdrop
/// triangle that crosses the view volume boundaries.
fn demo_scene() -> Vec<Triangle> {
    let mut tris = Vec::new();

    let corners = [
        Vec3::new(-0.5, 0.0, -0.5),
        Vec3::new(0.5, 0.0, -0.5),
        Vec3::new(0.5, 1.0, -0.5),
        Vec3::new(-0.5, 1.0, -0.5),
        Vec3::new(-0.5, 0.0, 0.5),
        Vec3::new(0.5, 0.0, 0.5),
        Vec3::new(0.5, 1.0, 0.5),
        Vec3::new(-0.5, 1.0, 0.5),
    ];
    let colors = [
        Color::new(255, 0, 0),
        Color::new(0, 255, 0),
        Color::new(0, 0, 255),
        Color::new(255, 255, 0),
        Color::new(255, 0, 255),
        Color::new(0, 255, 255),
        Color::new(255, 255, 255),
        Color::new(40, 40, 40),
    ];
    // Counter-clockwise seen from outside
    let faces: [[usize; 4]; 6] = [
        [4, 5, 6, 7], // +z
        [1, 0, 3, 2], // -z
        [5, 1, 2, 6], // +x
        [0, 4, 7, 3], // -x
        [7, 6, 2, 3], // +y
        [0, 1, 5, 4], // -y
    ];
    for [a, b, c, d] in faces {
        tris.push(Triangle::new(
            [corners[a], corners[b], corners[c]],
            [colors[a], colors[b], colors[c]],
        ));
        tris.push(Triangle::new(
            [corners[a], corners[c], corners[d]],
            [colors[a], colors[c], colors[d]],
        ));
    }

    let g = 6.0;
    let ground = Color::new(110, 130, 90);
    let ground_far = Color::new(70, 90, 60);
    tris.push(Triangle::new(
        [Vec3::new(-g, -0.01, g), Vec3::new(g, -0.01, g), Vec3::new(g, -0.01, -g)],
        [ground, ground, ground_far],
    ));
    tris.push(Triangle::new(
        [Vec3::new(-g, -0.01, g), Vec3::new(g, -0.01, -g), Vec3::new(-g, -0.01, -g)],
        [ground, ground_far, ground_far],
    ));

    tris.push(Triangle::new(
        [
            Vec3::new(-40.0, -1.0, -12.0),
            Vec3::new(40.0, -1.0, -12.0),
            Vec3::new(0.0, 30.0, -12.0),
        ],
        [Color::new(200, 80, 40), Color::new(40, 80, 200), Color::new(240, 240, 200)],
    ));
    tris
}
