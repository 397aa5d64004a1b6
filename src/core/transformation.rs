use crate::core::geo::Point;

/// Per-axis affine transform `(scale * (a*x + b), scale * (c*y + d))`.
///
/// Every CRS builds exactly one of these to map its projected plane onto
/// pixel space; the `scale` argument carries the zoom dependency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl Transformation {
    pub const fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self { a, b, c, d }
    }

    pub fn transform(&self, point: Point, scale: f64) -> Point {
        Point::new(
            scale * (self.a * point.x + self.b),
            scale * (self.c * point.y + self.d),
        )
    }

    pub fn untransform(&self, point: Point, scale: f64) -> Point {
        Point::new(
            (point.x / scale - self.b) / self.a,
            (point.y / scale - self.d) / self.c,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform() {
        let t = Transformation::new(1.0, 2.0, 3.0, 4.0);
        let p = t.transform(Point::new(10.0, 20.0), 1.0);
        assert_eq!(p, Point::new(12.0, 64.0));

        let scaled = t.transform(Point::new(10.0, 20.0), 2.0);
        assert_eq!(scaled, Point::new(24.0, 128.0));
    }

    #[test]
    fn test_untransform_inverts() {
        let t = Transformation::new(0.5, 0.5, -0.5, 0.5);
        let original = Point::new(-0.25, 0.75);
        let back = t.untransform(t.transform(original, 512.0), 512.0);
        assert!((back.x - original.x).abs() < 1e-12);
        assert!((back.y - original.y).abs() < 1e-12);
    }
}
