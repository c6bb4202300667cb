use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};

/// Planar projective transform `dst ~ H * src`, scaled so `H[(2,2)] = 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Map a point. Points on the line at infinity map to non-finite values.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v.x / v.z, v.y / v.z)
    }

    pub fn inverse(&self) -> Option<Self> {
        let inv = self.h.try_inverse()?;
        rescale(inv).map(Self::new)
    }

    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }
}

/// Similarity moving a point set to its centroid with mean radius sqrt(2).
struct Conditioner {
    t: Matrix3<f64>,
}

impl Conditioner {
    fn fit(pts: &[Point2<f64>]) -> Self {
        let n = pts.len() as f64;
        let c = pts.iter().fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p.x, p.y, 0.0)) / n;
        let radius = pts
            .iter()
            .map(|p| (p.x - c.x).hypot(p.y - c.y))
            .sum::<f64>()
            / n;
        let s = if radius > 1e-12 {
            std::f64::consts::SQRT_2 / radius
        } else {
            1.0
        };
        Self {
            t: Matrix3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0),
        }
    }

    fn apply(&self, p: &Point2<f64>) -> Point2<f64> {
        let s = self.t[(0, 0)];
        Point2::new(s * p.x + self.t[(0, 2)], s * p.y + self.t[(1, 2)])
    }
}

fn rescale(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let w = h[(2, 2)];
    (w.abs() >= 1e-12).then(|| h / w)
}

/// Undo conditioning: `H = T_dst^-1 * Hn * T_src`.
fn uncondition(hn: Matrix3<f64>, src: &Conditioner, dst: &Conditioner) -> Option<Homography> {
    let h = dst.t.try_inverse()? * hn * src.t;
    rescale(h).map(Homography::new)
}

/// Estimate `H` from `N >= 4` correspondences.
///
/// Four points go through the exact solve in [`homography_from_4pt`]; more
/// points use the conditioned DLT, taking the right singular vector of the
/// smallest singular value.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if let (Ok(s), Ok(d)) = (<&[_; 4]>::try_from(src), <&[_; 4]>::try_from(dst)) {
        return homography_from_4pt(s, d);
    }

    let cs = Conditioner::fit(src);
    let cd = Conditioner::fit(dst);

    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (k, (p, q)) in src.iter().zip(dst).enumerate() {
        let p = cs.apply(p);
        let q = cd.apply(q);
        let row_u = [p.x, p.y, 1.0, 0.0, 0.0, 0.0, -q.x * p.x, -q.x * p.y, -q.x];
        let row_v = [0.0, 0.0, 0.0, p.x, p.y, 1.0, -q.y * p.x, -q.y * p.y, -q.y];
        for c in 0..9 {
            a[(2 * k, c)] = row_u[c];
            a[(2 * k + 1, c)] = row_v[c];
        }
    }

    // At least 10 rows, so V^T is the full 9x9 basis.
    let vt = a.svd(false, true).v_t?;
    let null = vt.row(8);
    let hn = Matrix3::from_iterator(null.iter().copied()).transpose();
    uncondition(hn, &cs, &cd)
}

/// Exact `H` mapping each `src[k]` onto `dst[k]`.
///
/// Fixes `h33 = 1` and solves the remaining 8 unknowns from the conditioned
/// points with LU. Returns `None` when three points on either side are
/// collinear.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let cs = Conditioner::fit(src);
    let cd = Conditioner::fit(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (p, q)) in src.iter().zip(dst).enumerate() {
        let p = cs.apply(p);
        let q = cd.apply(q);
        let (ru, rv) = (2 * k, 2 * k + 1);
        a.fixed_view_mut::<1, 8>(ru, 0).copy_from_slice(&[
            p.x,
            p.y,
            1.0,
            0.0,
            0.0,
            0.0,
            -q.x * p.x,
            -q.x * p.y,
        ]);
        a.fixed_view_mut::<1, 8>(rv, 0).copy_from_slice(&[
            0.0,
            0.0,
            0.0,
            p.x,
            p.y,
            1.0,
            -q.y * p.x,
            -q.y * p.y,
        ]);
        b[ru] = q.x;
        b[rv] = q.y;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);
    let h = uncondition(hn, &cs, &cd)?;

    // Near-singular systems come back from LU with huge, meaningless entries.
    if !h.is_finite() || h.h.determinant().abs() < 1e-12 {
        return None;
    }
    Some(h)
}
