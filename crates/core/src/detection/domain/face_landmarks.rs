//! Ordered facial landmark points in frame coordinates.
//!
//! The point count is fixed per locator model. Five-point layouts follow the
//! `[left_eye, right_eye, nose, left_mouth, right_mouth]` order; 68-point
//! layouts follow the iBUG ordering (eyes at 36..42 and 42..48).

const FIVE_POINT_LEFT_EYE: usize = 0;
const FIVE_POINT_RIGHT_EYE: usize = 1;
const IBUG_LEFT_EYE: std::ops::Range<usize> = 36..42;
const IBUG_RIGHT_EYE: std::ops::Range<usize> = 42..48;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<(f64, f64)>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn landmark_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Unweighted mean of all points.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        Some((sx / n, sy / n))
    }

    /// Axis-aligned `(min_x, min_y, max_x, max_y)` of the points.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let (&(x0, y0), rest) = self.points.split_first()?;
        Some(rest.iter().fold(
            (x0, y0, x0, y0),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        ))
    }

    /// Convex hull in counter-clockwise order (Andrew's monotone chain).
    ///
    /// Collinear points are dropped. Fewer than three distinct points yield
    /// the distinct points themselves.
    pub fn convex_hull(&self) -> Vec<(f64, f64)> {
        convex_hull(&self.points)
    }

    /// Distance between the eye centres, or `None` for an unknown layout.
    pub fn eye_distance(&self) -> Option<f64> {
        let (left, right) = match self.points.len() {
            5 => (
                self.points[FIVE_POINT_LEFT_EYE],
                self.points[FIVE_POINT_RIGHT_EYE],
            ),
            68 => (
                mean(&self.points[IBUG_LEFT_EYE]),
                mean(&self.points[IBUG_RIGHT_EYE]),
            ),
            _ => return None,
        };
        Some(((right.0 - left.0).powi(2) + (right.1 - left.1).powi(2)).sqrt())
    }

    /// Returns the landmarks shifted by `(-dx, -dy)`.
    pub fn translated(&self, dx: f64, dy: f64) -> FaceLandmarks {
        FaceLandmarks::new(self.points.iter().map(|&(x, y)| (x - dx, y - dy)).collect())
    }
}

fn mean(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points.to_vec();
    pts.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn five_point() -> FaceLandmarks {
        FaceLandmarks::new(vec![
            (40.0, 50.0),
            (80.0, 50.0),
            (60.0, 70.0),
            (45.0, 90.0),
            (75.0, 90.0),
        ])
    }

    #[test]
    fn test_landmark_count() {
        assert_eq!(five_point().landmark_count(), 5);
        assert!(FaceLandmarks::new(vec![]).is_empty());
    }

    #[test]
    fn test_centroid() {
        let (cx, cy) = five_point().centroid().unwrap();
        assert_relative_eq!(cx, 60.0);
        assert_relative_eq!(cy, 70.0);
    }

    #[test]
    fn test_centroid_empty_is_none() {
        assert!(FaceLandmarks::new(vec![]).centroid().is_none());
    }

    #[test]
    fn test_bounds() {
        assert_eq!(five_point().bounds(), Some((40.0, 50.0, 80.0, 90.0)));
    }

    #[test]
    fn test_convex_hull_drops_interior_point() {
        let hull = five_point().convex_hull();
        // The nose lies inside the eye/mouth quadrilateral.
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&(60.0, 70.0)));
    }

    #[test]
    fn test_convex_hull_is_counter_clockwise() {
        let hull = five_point().convex_hull();
        let area: f64 = (0..hull.len())
            .map(|i| {
                let (x1, y1) = hull[i];
                let (x2, y2) = hull[(i + 1) % hull.len()];
                x1 * y2 - x2 * y1
            })
            .sum();
        assert!(area > 0.0);
    }

    #[test]
    fn test_convex_hull_collinear() {
        let hull = convex_hull(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(hull, vec![(0.0, 0.0), (2.0, 2.0)]);
    }

    #[test]
    fn test_eye_distance_five_points() {
        assert_relative_eq!(five_point().eye_distance().unwrap(), 40.0);
    }

    #[test]
    fn test_eye_distance_68_points() {
        let mut points = vec![(0.0, 0.0); 68];
        for p in &mut points[36..42] {
            *p = (10.0, 20.0);
        }
        for p in &mut points[42..48] {
            *p = (40.0, 60.0);
        }
        let lm = FaceLandmarks::new(points);
        assert_relative_eq!(lm.eye_distance().unwrap(), 50.0);
    }

    #[test]
    fn test_eye_distance_unknown_layout() {
        let lm = FaceLandmarks::new(vec![(0.0, 0.0); 3]);
        assert!(lm.eye_distance().is_none());
    }

    #[test]
    fn test_translated() {
        let lm = five_point().translated(40.0, 50.0);
        assert_eq!(lm.points()[0], (0.0, 0.0));
        assert_eq!(lm.points()[4], (35.0, 40.0));
    }
}
