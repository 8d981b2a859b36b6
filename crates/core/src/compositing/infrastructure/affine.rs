//! 2x3 affine transforms in row-major form `[a, b, c, d, e, f]`:
//! `x' = a*x + b*y + c`, `y' = d*x + e*y + f`.

const EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    m: [f64; 6],
}

impl Affine {
    pub fn new(m: [f64; 6]) -> Self {
        Self { m }
    }

    pub fn identity() -> Self {
        Self::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.m
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.m;
        (a * x + b * y + c, d * x + e * y + f)
    }

    pub fn inverse(&self) -> Option<Affine> {
        let [a, b, c, d, e, f] = self.m;
        let det = a * e - b * d;
        if det.abs() < EPSILON {
            return None;
        }
        let ia = e / det;
        let ib = -b / det;
        let id = -d / det;
        let ie = a / det;
        Some(Affine::new([
            ia,
            ib,
            -(ia * c + ib * f),
            id,
            ie,
            -(id * c + ie * f),
        ]))
    }

    /// Least-squares similarity (rotation, uniform scale, translation)
    /// mapping `from` onto `to`. Reflections are not allowed.
    pub fn similarity(from: &[(f64, f64)], to: &[(f64, f64)]) -> Option<Affine> {
        if from.len() != to.len() || from.len() < 2 {
            return None;
        }
        let n = from.len() as f64;
        let mean = |pts: &[(f64, f64)]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (fx, fy) = mean(from);
        let (tx, ty) = mean(to);

        let mut dot = 0.0;
        let mut crs = 0.0;
        let mut norm = 0.0;
        for (&(px, py), &(qx, qy)) in from.iter().zip(to) {
            let (px, py) = (px - fx, py - fy);
            let (qx, qy) = (qx - tx, qy - ty);
            dot += px * qx + py * qy;
            crs += px * qy - py * qx;
            norm += px * px + py * py;
        }
        if norm < EPSILON {
            return None;
        }

        let a = dot / norm;
        let b = crs / norm;
        if (a * a + b * b) < EPSILON {
            return None;
        }
        Some(Affine::new([
            a,
            -b,
            tx - (a * fx - b * fy),
            b,
            a,
            ty - (b * fx + a * fy),
        ]))
    }

    /// The exact affine taking triangle `from` onto triangle `to`.
    pub fn from_triangles(from: [(f64, f64); 3], to: [(f64, f64); 3]) -> Option<Affine> {
        let rows = [
            [from[0].0, from[0].1, 1.0],
            [from[1].0, from[1].1, 1.0],
            [from[2].0, from[2].1, 1.0],
        ];
        let [a, b, c] = solve3(rows, [to[0].0, to[1].0, to[2].0])?;
        let [d, e, f] = solve3(rows, [to[0].1, to[1].1, to[2].1])?;
        Some(Affine::new([a, b, c, d, e, f]))
    }
}

fn det3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Cramer's rule for `m * x = r`.
fn solve3(m: [[f64; 3]; 3], r: [f64; 3]) -> Option<[f64; 3]> {
    let det = det3(m);
    if det.abs() < EPSILON {
        return None;
    }
    let mut out = [0.0; 3];
    for (col, value) in out.iter_mut().enumerate() {
        let mut replaced = m;
        for row in 0..3 {
            replaced[row][col] = r[row];
        }
        *value = det3(replaced) / det;
    }
    Some(out)
}
