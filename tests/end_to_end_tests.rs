// End-to-end rendering scenarios through the public API.
use glam::{Mat4, Vec2, Vec3, Vec4};
use tile_raster::rendering::clipper::{ClipPlane, CLIP_EPSILON};
use tile_raster::*;

const SIZE: usize = 512;
const BACKGROUND: Color = Color::new(150, 150, 150);

/// Clip-space vertex (w = 1) that lands on screen pixel position `p`.
fn at_screen(p: Vec2, z: f32, color: Color) -> Vertex {
    let half = SIZE as f32 * 0.5;
    Vertex::new(
        Vec4::new(p.x / half - 1.0, 1.0 - p.y / half, z, 1.0),
        color.to_vec3(),
    )
}

fn edge(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    ((c.x - a.x) as f64) * ((b.y - a.y) as f64) - ((c.y - a.y) as f64) * ((b.x - a.x) as f64)
}

fn backends() -> Vec<Box<dyn RasterBackend>> {
    vec![
        Box::new(SerialBackend::new(BACKGROUND)),
        Box::new(TiledBackend::new(SIZE, SIZE, 16, 64, BACKGROUND).unwrap()),
    ]
}

#[test]
fn single_red_triangle_fills_exactly_its_interior() {
    let p = [
        Vec2::new(100.0, 50.0),
        Vec2::new(400.0, 150.0),
        Vec2::new(250.0, 400.0),
    ];
    let z = [0.1f32, 0.5, 0.9];
    let prim = Primitive::new(
        at_screen(p[0], z[0], Color::RED),
        at_screen(p[1], z[1], Color::RED),
        at_screen(p[2], z[2], Color::RED),
    );
    let area = edge(p[0], p[1], p[2]);

    for mut backend in backends() {
        let mut fb = Framebuffer::new(SIZE, SIZE);
        backend.render(&[prim], &mut fb).unwrap();

        let mut inside = 0;
        for y in 0..SIZE {
            for x in 0..SIZE {
                let c = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let l0 = edge(p[1], p[2], c) / area;
                let l1 = edge(p[2], p[0], c) / area;
                let l2 = edge(p[0], p[1], c) / area;
                let min = l0.min(l1).min(l2);

                // Keep clear of the edges, where float rounding decides.
                if min > 1e-3 {
                    inside += 1;
                    assert_eq!(fb.color_at(x, y), Color::RED, "{} at ({x},{y})", backend.name());
                    let expected = l0 * z[0] as f64 + l1 * z[1] as f64 + l2 * z[2] as f64;
                    assert!(
                        (fb.depth_at(x, y) as f64 - expected).abs() < 1e-4,
                        "depth at ({x},{y})"
                    );
                } else if min < -1e-3 {
                    assert_eq!(fb.color_at(x, y), BACKGROUND, "{} at ({x},{y})", backend.name());
                    assert_eq!(fb.depth_at(x, y), f32::INFINITY);
                }
            }
        }
        // Area is 45000 px
        assert!(inside > 40_000);
        assert_eq!(fb.rgb_at(250, 200), [255, 0, 0]);
    }
}

#[test]
fn nearer_triangle_visible_regardless_of_submission_order() {
    let near = Primitive::new(
        at_screen(Vec2::new(50.0, 50.0), -0.2, Color::GREEN),
        at_screen(Vec2::new(450.0, 80.0), -0.2, Color::GREEN),
        at_screen(Vec2::new(200.0, 450.0), -0.2, Color::GREEN),
    );
    let far = Primitive::new(
        at_screen(Vec2::new(60.0, 400.0), 0.7, Color::BLUE),
        at_screen(Vec2::new(300.0, 30.0), 0.7, Color::BLUE),
        at_screen(Vec2::new(480.0, 480.0), 0.7, Color::BLUE),
    );
    // (250, 200) is inside both
    for mut backend in backends() {
        for order in [[near, far], [far, near]] {
            let mut fb = Framebuffer::new(SIZE, SIZE);
            backend.render(&order, &mut fb).unwrap();
            assert_eq!(fb.color_at(250, 200), Color::GREEN, "{}", backend.name());
            assert_eq!(fb.color_at(450, 420), Color::BLUE, "{}", backend.name());
        }
    }
}

#[test]
fn triangle_straddling_near_plane_is_cut_not_passed_through() {
    let config = RenderConfig {
        width: 256,
        height: 256,
        ..RenderConfig::default()
    };
    let view = Mat4::IDENTITY;
    let projection = Mat4::perspective_rh_gl(
        config.fov_y_degrees.to_radians(),
        1.0,
        config.near,
        config.far,
    );
    // One vertex well in front, two between the camera and the near plane
    // and inside every side plane.
    let scene = [Triangle::uniform(
        [
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::new(-0.01, -0.01, -0.02),
            Vec3::new(0.01, -0.01, -0.02),
        ],
        Color::WHITE,
    )];
    let mut pipeline = Pipeline::new(config);
    let (prims, stats) = pipeline.prepare_primitives(&scene, &view, &projection);

    assert_eq!(stats.triangles_near_rejected, 0);
    assert!(prims.len() == 1 || prims.len() == 2, "got {}", prims.len());
    let original = [0, 1, 2].map(|i| {
        Vertex::new(
            projection * scene[0].positions[i].extend(1.0),
            scene[0].colors[i].to_vec3(),
        )
    });
    for prim in &prims {
        assert_ne!(prim.vertices, original);
        for v in &prim.vertices {
            assert!(ClipPlane::Near.distance(v.clip) >= -CLIP_EPSILON);
            assert!(v.clip.w > 0.0);
        }
    }

    let mut fb = Framebuffer::new(256, 256);
    let mut backend = SerialBackend::new(Color::BLACK);
    let frame = pipeline
        .render(&scene, &view, &projection, &mut fb, &mut backend)
        .unwrap();
    assert!(frame.fragments_written > 0);
}

#[test]
fn ppm_export_matches_color_buffer() {
    let prim = Primitive::new(
        at_screen(Vec2::new(0.0, 0.0), 0.0, Color::BLUE),
        at_screen(Vec2::new(512.0, 0.0), 0.0, Color::BLUE),
        at_screen(Vec2::new(0.0, 512.0), 0.0, Color::BLUE),
    );
    let mut fb = Framebuffer::new(SIZE, SIZE);
    SerialBackend::new(BACKGROUND).render(&[prim], &mut fb).unwrap();

    let mut bytes = Vec::new();
    fb.write_ppm(&mut bytes).unwrap();
    let header = format!("P6\n{SIZE} {SIZE}\n255\n");
    assert!(bytes.starts_with(header.as_bytes()));
    assert_eq!(&bytes[header.len()..], fb.to_rgb_bytes().as_slice());
    assert_eq!(fb.rgb_at(10, 10), [0, 0, 255]);
    assert_eq!(fb.rgb_at(500, 500), [150, 150, 150]);
}
