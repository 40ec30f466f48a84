//! Rectangle and rotation algebra for page coordinates
//!
//! A [`PageRect`] keeps two free-form corner points plus a derived
//! integer form (x, y, width, height) that is recomputed on every
//! mutation. Rotation works about the center of a pivot box and
//! re-anchors the result to an upper-left origin, so a rotated view of
//! a page always starts at (0, 0).

use log::warn;

/// Rectangle defined by two corner points with a derived normalized form.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageRect {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,

    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl PageRect {
    /// Create a rectangle from two corner points.
    #[must_use]
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let mut rect = Self::default();
        rect.set_points(x0, y0, x1, y1);
        rect
    }

    /// Create a rectangle from an origin and dimensions.
    #[must_use]
    pub fn from_size(x: i32, y: i32, w: i32, h: i32) -> Self {
        let mut rect = Self::default();
        rect.set_size(x, y, w, h);
        rect
    }

    /// Replace both corner points, recomputing the normalized form.
    pub fn set_points(&mut self, x0: f32, y0: f32, x1: f32, y1: f32) {
        self.x0 = sanitize(x0);
        self.y0 = sanitize(y0);
        self.x1 = sanitize(x1);
        self.y1 = sanitize(y1);
        self.normalize();
    }

    /// Replace the rectangle with an origin plus dimensions.
    pub fn set_size(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.set_points(x as f32, y as f32, (x + w) as f32, (y + h) as f32);
    }

    #[must_use]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[must_use]
    pub fn y(&self) -> i32 {
        self.y
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.w
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.h
    }

    #[must_use]
    pub fn x0(&self) -> f32 {
        self.x0
    }

    #[must_use]
    pub fn y0(&self) -> f32 {
        self.y0
    }

    #[must_use]
    pub fn x1(&self) -> f32 {
        self.x1
    }

    #[must_use]
    pub fn y1(&self) -> f32 {
        self.y1
    }

    /// Scale all four corner coordinates by `zoom`.
    ///
    /// Callers normalize non-positive zoom to 1 before scaling; the
    /// options layer already enforces that.
    #[must_use]
    pub fn scale(&self, zoom: f32) -> Self {
        Self::new(
            self.x0 * zoom,
            self.y0 * zoom,
            self.x1 * zoom,
            self.y1 * zoom,
        )
    }

    /// Rotate this rectangle about the center of `pivot`, re-anchored to
    /// an upper-left origin.
    ///
    /// The rotation is normalized to [0, 360); 0 is an identity copy.
    /// Raw rotated coordinates are not upper-left anchored, so the
    /// result is re-anchored with case formulas keyed on the quarter
    /// turn. A degenerate pivot still yields a valid center point.
    #[must_use]
    pub fn rotate_to_view(&self, pivot: &PageRect, rotation: i32) -> Self {
        let rotation = normalize_angle(rotation);

        if rotation == 0 {
            return Self::new(self.x0, self.y0, self.x1, self.y1);
        }

        let rad = f64::from(rotation).to_radians();

        // Center of rotation, truncating like the normalized form does.
        let cx = ((pivot.x + pivot.w) / 2) as f64;
        let cy = ((pivot.y + pivot.h) / 2) as f64;

        // Rotated pivot-box corner points
        let [p_mbx1, p_mby1, p_mbx2, p_mby2] = rotate_corners(pivot, rad, cx, cy);

        // Rotated region corner points
        let [p_x1, p_y1, p_x2, p_y2] = rotate_corners(self, rad, cx, cy);
        let p_w = (p_x2 - p_x1).abs();
        let p_h = (p_y2 - p_y1).abs();

        let mut x0 = 0.0f32;
        let mut y0 = 0.0f32;

        // Re-anchor the rotated points to an upper-left origin. The
        // anchor of the rotated pivot differs per quarter turn.
        match rotation {
            90 => {
                let mbx1 = p_mbx2.max(p_mby2) + p_mbx1.min(p_mby1);
                x0 = mbx1 - (p_mbx1 - p_x1).abs() - p_w;
                y0 = (p_mby1 - p_y1).abs();
            }
            180 => {
                let mbx1 = p_mbx1;
                let mby1 = p_mby1;
                x0 = mbx1 - (p_mbx1 - p_x1).abs() - p_w;
                y0 = mby1 - (p_mby1 - p_y1).abs() - p_h;
            }
            270 => {
                let mby1 = p_mbx2.max(p_mby2) + p_mbx1.min(p_mby1);
                x0 = (p_mbx1 - p_x1).abs();
                y0 = mby1 - (p_mby1 - p_y1).abs() - p_h;
            }
            _ => {}
        }

        Self::new(x0, y0, x0 + p_w, y0 + p_h)
    }

    /// Map coordinates expressed in one rotated view into another.
    ///
    /// Rotates `pivot` to `from`, then rotates this rectangle by the
    /// difference relative to that rotated pivot. `to = 0` converts
    /// view coordinates back into canonical page space.
    #[must_use]
    pub fn rotate_between(&self, pivot: &PageRect, from: i32, to: i32) -> Self {
        let rotated_pivot = pivot.rotate_to_view(pivot, from);
        self.rotate_to_view(&rotated_pivot, -(from - to))
    }

    fn normalize(&mut self) {
        self.x = self.x0 as i32;
        self.y = self.y0 as i32;
        self.w = (self.x1 - self.x0).abs() as i32;
        self.h = (self.y1 - self.y0).abs() as i32;
    }
}

/// Reduce any angle, including negative ones, to [0, 360).
#[must_use]
pub fn normalize_angle(rotation: i32) -> i32 {
    let mut rotation = rotation % 360;
    if rotation < 0 {
        rotation += 360;
    }
    rotation
}

/// Rotate both corner points of `rect` around (cx, cy).
///
/// Trig runs in f64 and collapses to f32 once at the end, so quarter
/// turns of page-sized rectangles land back on exact coordinates.
fn rotate_corners(rect: &PageRect, rad: f64, cx: f64, cy: f64) -> [f32; 4] {
    let cos = rad.cos();
    let sin = rad.sin();

    let x0 = f64::from(rect.x0);
    let y0 = f64::from(rect.y0);
    let x1 = f64::from(rect.x1);
    let y1 = f64::from(rect.y1);

    [
        ((x0 - cx) * cos - (y0 - cy) * sin + cx) as f32,
        ((x0 - cx) * sin + (y0 - cy) * cos + cy) as f32,
        ((x1 - cx) * cos - (y1 - cy) * sin + cx) as f32,
        ((x1 - cx) * sin + (y1 - cy) * cos + cy) as f32,
    ]
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        warn!("non-finite rectangle coordinate {v}, using 0");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: (f32, f32) = (612.0, 792.0);

    fn letter_box() -> PageRect {
        PageRect::new(0.0, 0.0, LETTER.0, LETTER.1)
    }

    fn assert_rect_close(a: &PageRect, b: &PageRect) {
        let eps = 0.01;
        assert!(
            (a.x0() - b.x0()).abs() < eps
                && (a.y0() - b.y0()).abs() < eps
                && (a.x1() - b.x1()).abs() < eps
                && (a.y1() - b.y1()).abs() < eps,
            "rectangles differ: {a:?} vs {b:?}"
        );
    }

    #[test]
    fn normalized_form_tracks_corner_points() {
        let mut r = PageRect::new(10.5, 20.5, 110.5, 220.5);
        assert_eq!((r.x(), r.y(), r.width(), r.height()), (10, 20, 100, 200));

        r.set_points(0.0, 0.0, 50.0, 60.0);
        assert_eq!((r.x(), r.y(), r.width(), r.height()), (0, 0, 50, 60));
    }

    #[test]
    fn inverted_corners_still_produce_positive_dimensions() {
        let r = PageRect::new(100.0, 200.0, 0.0, 0.0);
        assert_eq!(r.width(), 100);
        assert_eq!(r.height(), 200);
    }

    #[test]
    fn normalize_angle_is_periodic() {
        for k in -3i32..=3 {
            assert_eq!(normalize_angle(90 + 360 * k), 90);
            assert_eq!(normalize_angle(-90 + 360 * k), 270);
            assert_eq!(normalize_angle(360 * k), 0);
        }
    }

    #[test]
    fn scaling_composes_multiplicatively() {
        let r = PageRect::new(3.0, 5.0, 103.0, 205.0);
        let once = r.scale(1.5 * 2.0);
        let twice = r.scale(1.5).scale(2.0);
        assert_rect_close(&once, &twice);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let b = letter_box();
        let r = PageRect::new(10.0, 20.0, 110.0, 220.0);
        assert_rect_close(&r.rotate_to_view(&b, 0), &r);
        assert_rect_close(&r.rotate_to_view(&b, 360), &r);
        assert_rect_close(&r.rotate_to_view(&b, -720), &r);
    }

    #[test]
    fn quarter_turn_swaps_page_dimensions() {
        let b = letter_box();
        let r = b.rotate_to_view(&b, 90);
        assert_eq!((r.x(), r.y(), r.width(), r.height()), (0, 0, 792, 612));
    }

    #[test]
    fn quarter_turn_maps_region_to_expected_view_position() {
        // For a clockwise quarter turn of a 612x792 page the view
        // coordinates are (H - y, x) with H = 792.
        let b = letter_box();
        let r = PageRect::new(100.0, 50.0, 200.0, 150.0);
        let v = r.rotate_to_view(&b, 90);
        assert_rect_close(&v, &PageRect::new(642.0, 100.0, 742.0, 200.0));
    }

    #[test]
    fn half_turn_mirrors_both_axes() {
        let b = letter_box();
        let r = PageRect::new(100.0, 50.0, 200.0, 150.0);
        let v = r.rotate_to_view(&b, 180);
        assert_rect_close(&v, &PageRect::new(412.0, 642.0, 512.0, 742.0));
    }

    #[test]
    fn rotation_round_trips_through_inverse() {
        let b = letter_box();
        let r = PageRect::new(100.0, 50.0, 200.0, 150.0);
        for angle in [0, 90, 180, 270] {
            let rotated_box = b.rotate_to_view(&b, angle);
            let there = r.rotate_to_view(&b, angle);
            let back = there.rotate_to_view(&rotated_box, -angle);
            assert_rect_close(&back, &r);
        }
    }

    #[test]
    fn half_turn_inverse_is_exact() {
        // sin(180) must collapse to an exact 0 in the f64 trig; any
        // residual shifts the truncated pivot center and skews the
        // inverse by whole pixels.
        let b = letter_box();
        let r = PageRect::new(100.0, 50.0, 200.0, 150.0);
        let rotated_box = b.rotate_to_view(&b, 180);
        let back = r.rotate_to_view(&b, 180).rotate_to_view(&rotated_box, -180);
        assert_eq!(
            (back.x0(), back.y0(), back.x1(), back.y1()),
            (100.0, 50.0, 200.0, 150.0)
        );
    }

    #[test]
    fn rotate_between_converts_view_coordinates_to_page_space() {
        let b = letter_box();
        let r = PageRect::new(100.0, 50.0, 200.0, 150.0);
        let view = r.rotate_to_view(&b, 90);
        let back = view.rotate_between(&b, 90, 0);
        assert_rect_close(&back, &r);
    }

    #[test]
    fn rotate_between_same_angles_is_identity() {
        let b = letter_box();
        let r = PageRect::new(10.0, 20.0, 60.0, 90.0);
        assert_rect_close(&r.rotate_between(&b, 90, 90), &r);
    }

    #[test]
    fn degenerate_pivot_box_is_harmless() {
        let pivot = PageRect::new(50.0, 50.0, 50.0, 50.0);
        let r = PageRect::new(40.0, 40.0, 60.0, 60.0);
        let v = r.rotate_to_view(&pivot, 90);
        assert_eq!(v.width(), 20);
        assert_eq!(v.height(), 20);
    }

    #[test]
    fn non_finite_coordinates_are_sanitized() {
        let r = PageRect::new(f32::NAN, 0.0, f32::INFINITY, 10.0);
        assert_eq!(r.x0(), 0.0);
        assert_eq!(r.x1(), 0.0);
        assert_eq!(r.height(), 10);
    }
}
