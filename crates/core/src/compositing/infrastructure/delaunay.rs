//! Bowyer-Watson Delaunay triangulation for small point sets.

const EPSILON: f64 = 1e-9;

/// Signed double area of `abc`; positive when counter-clockwise.
pub fn orient(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

/// Positive when `d` lies strictly inside the circumcircle of the
/// counter-clockwise triangle `abc`.
fn in_circle(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> f64 {
    let (adx, ady) = (a.0 - d.0, a.1 - d.1);
    let (bdx, bdy) = (b.0 - d.0, b.1 - d.1);
    let (cdx, cdy) = (c.0 - d.0, c.1 - d.1);
    let ad = adx * adx + ady * ady;
    let bd = bdx * bdx + bdy * bdy;
    let cd = cdx * cdx + cdy * cdy;
    adx * (bdy * cd - bd * cdy) - ady * (bdx * cd - bd * cdx) + ad * (bdx * cdy - bdy * cdx)
}

/// Whether `p` lies inside or on the edge of triangle `t`, in either winding.
pub fn triangle_contains(t: &[(f64, f64); 3], p: (f64, f64)) -> bool {
    let d0 = orient(t[0], t[1], p);
    let d1 = orient(t[1], t[2], p);
    let d2 = orient(t[2], t[0], p);
    let has_neg = d0 < -EPSILON || d1 < -EPSILON || d2 < -EPSILON;
    let has_pos = d0 > EPSILON || d1 > EPSILON || d2 > EPSILON;
    !(has_neg && has_pos)
}

/// Triangulates `points`, returning counter-clockwise index triples.
///
/// Duplicate points are ignored. Collinear input yields no triangles.
pub fn triangulate(points: &[(f64, f64)]) -> Vec<[usize; 3]> {
    let mut unique: Vec<usize> = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let duplicate = unique.iter().any(|&j| {
            let q = points[j];
            (p.0 - q.0).abs() < EPSILON && (p.1 - q.1).abs() < EPSILON
        });
        if !duplicate {
            unique.push(i);
        }
    }
    if unique.len() < 3 {
        return Vec::new();
    }

    let (min_x, min_y, max_x, max_y) = unique.iter().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(ax, ay, bx, by), &i| {
            let (x, y) = points[i];
            (ax.min(x), ay.min(y), bx.max(x), by.max(y))
        },
    );
    let span = (max_x - min_x).max(max_y - min_y).max(1.0) * 10.0;
    let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    // Super-triangle vertices live past the end of `points`.
    let mut verts: Vec<(f64, f64)> = points.to_vec();
    let s0 = verts.len();
    verts.push((mid_x - 20.0 * span, mid_y - span));
    verts.push((mid_x + 20.0 * span, mid_y - span));
    verts.push((mid_x, mid_y + 20.0 * span));

    let mut triangles: Vec<[usize; 3]> = vec![ccw(&verts, [s0, s0 + 1, s0 + 2])];

    for &pi in &unique {
        let p = verts[pi];
        let (bad, good): (Vec<[usize; 3]>, Vec<[usize; 3]>) = triangles
            .into_iter()
            .partition(|t| in_circle(verts[t[0]], verts[t[1]], verts[t[2]], p) > EPSILON);

        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for t in &bad {
            for edge in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                let shared = bad.iter().any(|o| o != t && has_edge(o, edge));
                if !shared {
                    boundary.push(edge);
                }
            }
        }

        triangles = good;
        for (a, b) in boundary {
            let t = ccw(&verts, [a, b, pi]);
            if orient(verts[t[0]], verts[t[1]], verts[t[2]]).abs() > EPSILON {
                triangles.push(t);
            }
        }
    }

    triangles.retain(|t| t.iter().all(|&i| i < s0));
    triangles
}

fn has_edge(t: &[usize; 3], (a, b): (usize, usize)) -> bool {
    t.contains(&a) && t.contains(&b)
}

fn ccw(verts: &[(f64, f64)], t: [usize; 3]) -> [usize; 3] {
    if orient(verts[t[0]], verts[t[1]], verts[t[2]]) < 0.0 {
        [t[0], t[2], t[1]]
    } else {
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn area(points: &[(f64, f64)], t: &[usize; 3]) -> f64 {
        orient(points[t[0]], points[t[1]], points[t[2]]) / 2.0
    }

    #[test]
    fn test_square_gives_two_triangles_covering_area() {
        let pts = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        let tris = triangulate(&pts);
        assert_eq!(tris.len(), 2);
        let total: f64 = tris.iter().map(|t| area(&pts, t)).sum();
        assert!((total - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_square_with_center_gives_four_triangles() {
        let pts = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (5.0, 5.0)];
        let tris = triangulate(&pts);
        assert_eq!(tris.len(), 4);
        assert!(tris.iter().all(|t| t.contains(&4)));
    }

    #[rstest]
    #[case(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)])]
    #[case(vec![(0.0, 0.0), (1.0, 1.0)])]
    #[case(vec![(3.0, 3.0), (3.0, 3.0), (3.0, 3.0)])]
    fn test_degenerate_input_has_no_triangles(#[case] pts: Vec<(f64, f64)>) {
        assert!(triangulate(&pts).is_empty());
    }

    #[test]
    fn test_triangles_are_counter_clockwise() {
        let pts = [
            (40.0, 50.0),
            (80.0, 50.0),
            (60.0, 70.0),
            (45.0, 90.0),
            (75.0, 90.0),
            (20.0, 20.0),
            (100.0, 20.0),
            (100.0, 110.0),
            (20.0, 110.0),
        ];
        let tris = triangulate(&pts);
        assert!(!tris.is_empty());
        assert!(tris.iter().all(|t| area(&pts, t) > 0.0));

        // Hull is the outer box, so the triangles tile its area.
        let total: f64 = tris.iter().map(|t| area(&pts, t)).sum();
        assert!((total - 80.0 * 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_circumcircle_property() {
        let pts = [(0.0, 0.0), (7.0, 1.0), (3.0, 6.0), (9.0, 8.0), (1.0, 9.0), (5.0, 3.0)];
        for t in triangulate(&pts) {
            for (i, &p) in pts.iter().enumerate() {
                if t.contains(&i) {
                    continue;
                }
                assert!(in_circle(pts[t[0]], pts[t[1]], pts[t[2]], p) <= 1e-6);
            }
        }
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let pts = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 0.0)];
        let tris = triangulate(&pts);
        assert_eq!(tris.len(), 1);
        assert!(!tris[0].contains(&3));
    }

    #[test]
    fn test_triangle_contains() {
        let t = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        assert!(triangle_contains(&t, (2.0, 2.0)));
        assert!(triangle_contains(&t, (5.0, 0.0)));
        assert!(!triangle_contains(&t, (8.0, 8.0)));
        let reversed = [t[0], t[2], t[1]];
        assert!(triangle_contains(&reversed, (2.0, 2.0)));
    }
}
