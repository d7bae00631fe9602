//! Small vector helpers for world positions.
//!
//! Positions are plain `[f32; 3]` arrays with Z pointing up, so "horizontal"
//! always means the X/Y plane.

/// A world position or offset
pub type Vec3 = [f32; 3];

/// Squared 3D distance between two points
pub fn distance_sqr(a: Vec3, b: Vec3) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    dx * dx + dy * dy + dz * dz
}

/// 3D distance between two points
pub fn distance(a: Vec3, b: Vec3) -> f32 {
    distance_sqr(a, b).sqrt()
}

/// Squared distance on the horizontal (X/Y) plane
pub fn distance_2d_sqr(a: Vec3, b: Vec3) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    dx * dx + dy * dy
}

/// Horizontal (X/Y) distance between two points
pub fn distance_2d(a: Vec3, b: Vec3) -> f32 {
    distance_2d_sqr(a, b).sqrt()
}

/// True if every component is a finite number
pub fn is_finite(v: Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Wrap a heading in degrees into [0, 360]
pub fn normalize_heading(mut heading: f32) -> f32 {
    if heading < 0.0 {
        heading += 360.0;
    } else if heading > 360.0 {
        heading -= 360.0;
    }
    heading.clamp(0.0, 360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_distance_ignores_height() {
        let a = [0.0, 0.0, -65.0];
        let b = [3.0, 4.0, 100.0];
        assert!((distance_2d(a, b) - 5.0).abs() < 0.0001);
        assert!(distance(a, b) > 100.0);
    }

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading(-90.0), 270.0);
        assert_eq!(normalize_heading(450.0), 90.0);
        assert_eq!(normalize_heading(180.0), 180.0);
        // Only one wrap is applied, the result is clamped
        assert_eq!(normalize_heading(-1000.0), 0.0);
    }
}
