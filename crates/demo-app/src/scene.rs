//! Demo geometry: an opaque backdrop with a stack of overlapping
//! translucent quads.
//!
//! The translucent quads are emitted in an order deliberately unrelated to
//! their depths. A correct resolve sorts them per pixel, so the image must
//! not depend on emission order.

use prism_core::Vertex;

fn quad(x: f32, y: f32, w: f32, h: f32, z: f32, color: [f32; 4], out: &mut Vec<Vertex>) {
    let (x0, y0, x1, y1) = (x, y, x + w, y + h);
    let v = |px, py| Vertex {
        pos: [px, py, z],
        color,
    };
    out.extend_from_slice(&[
        v(x0, y0),
        v(x1, y0),
        v(x1, y1),
        v(x0, y0),
        v(x1, y1),
        v(x0, y1),
    ]);
}

/// Opaque scene: a dark backdrop plane plus two solid pillars that the
/// translucent stack overlaps, exercising the depth test during
/// accumulation.
pub fn opaque_vertices(width: u32, height: u32) -> Vec<Vertex> {
    let (w, h) = (width as f32, height as f32);
    let mut out = Vec::new();
    quad(0.0, 0.0, w, h, 0.95, [0.05, 0.07, 0.12, 1.0], &mut out);
    quad(
        w * 0.12,
        h * 0.10,
        w * 0.08,
        h * 0.75,
        0.40,
        [0.85, 0.80, 0.70, 1.0],
        &mut out,
    );
    quad(
        w * 0.70,
        h * 0.20,
        w * 0.10,
        h * 0.65,
        0.55,
        [0.55, 0.60, 0.65, 1.0],
        &mut out,
    );
    out
}

/// Translucent scene, emitted in scrambled depth order.
pub fn transparent_vertices(width: u32, height: u32) -> Vec<Vertex> {
    let (w, h) = (width as f32, height as f32);
    // (x, y, depth, rgba) as fractions of the window; the depth column is
    // intentionally out of order.
    let quads: [(f32, f32, f32, [f32; 4]); 5] = [
        (0.30, 0.30, 0.50, [0.9, 0.2, 0.2, 0.55]),
        (0.42, 0.22, 0.20, [0.2, 0.8, 0.3, 0.45]),
        (0.24, 0.40, 0.70, [0.2, 0.4, 0.9, 0.50]),
        (0.50, 0.42, 0.35, [0.9, 0.8, 0.2, 0.40]),
        (0.36, 0.50, 0.60, [0.8, 0.3, 0.8, 0.35]),
    ];
    let mut out = Vec::new();
    for (fx, fy, z, color) in quads {
        quad(fx * w, fy * h, w * 0.28, h * 0.28, z, color, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_stays_in_bounds_and_depth_range() {
        for v in opaque_vertices(1920, 1280)
            .iter()
            .chain(transparent_vertices(1920, 1280).iter())
        {
            assert!(v.pos[0] >= 0.0 && v.pos[0] <= 1920.0);
            assert!(v.pos[1] >= 0.0 && v.pos[1] <= 1280.0);
            assert!(v.pos[2] > 0.0 && v.pos[2] < 1.0);
        }
    }

    #[test]
    fn translucent_quads_overlap_in_the_center() {
        let verts = transparent_vertices(1000, 1000);
        assert_eq!(verts.len() % 6, 0);
        let covers_center = |quad: &[Vertex]| {
            let xs: Vec<f32> = quad.iter().map(|v| v.pos[0]).collect();
            let ys: Vec<f32> = quad.iter().map(|v| v.pos[1]).collect();
            let min = |s: &[f32]| s.iter().copied().fold(f32::MAX, f32::min);
            let max = |s: &[f32]| s.iter().copied().fold(f32::MIN, f32::max);
            min(&xs) < 500.0 && max(&xs) > 500.0 && min(&ys) < 500.0 && max(&ys) > 500.0
        };
        let overlapping = verts.chunks(6).filter(|q| covers_center(q)).count();
        assert!(overlapping >= 2, "expected overlap at the window center");
    }
}
