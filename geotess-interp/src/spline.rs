//! Natural cubic spline basis over profile radii
//!
//! Radial interpolation must produce explicit per-node coefficients, not
//! just values, because path weights are linear functionals of the node
//! values. A natural cubic spline is linear in its node values, so its
//! evaluation at any radius is a weight vector over all N nodes: the
//! bracket weights plus the curvature terms propagated through the
//! tridiagonal second-derivative solve. The curvature operator
//! annihilates constants, so the weights always sum to 1.
//!
//! The basis depends only on the radii, and is built once per profile and
//! cached by the position that uses it.

/// Spline basis over one profile's radii.
#[derive(Debug, Clone)]
pub struct SplineBasis {
    radii: Vec<f64>,
    /// Interval widths, `radii[i+1] - radii[i]`.
    h: Vec<f64>,
}

impl SplineBasis {
    /// Build the basis. Returns `None` when a spline is not defined:
    /// fewer than three nodes, or a repeated radius (zero-width
    /// interval); callers fall back to linear interpolation.
    pub fn new(radii: &[f64]) -> Option<Self> {
        if radii.len() < 3 {
            return None;
        }
        let h: Vec<f64> = radii.windows(2).map(|w| w[1] - w[0]).collect();
        if h.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
            return None;
        }
        Some(Self {
            radii: radii.to_vec(),
            h,
        })
    }

    pub fn nnodes(&self) -> usize {
        self.radii.len()
    }

    /// Index `j` of the interval [radii[j], radii[j+1]] bracketing `r`.
    /// `r` must already be clamped into the radius range.
    fn bracket(&self, r: f64) -> usize {
        let n = self.radii.len();
        self.radii[1..n - 1].partition_point(|&x| x <= r)
    }

    /// Weight vector `w` over the nodes such that the spline value at
    /// `r` is `sum w[i] * y[i]` for any node values `y`.
    pub fn coefficients(&self, r: f64) -> Vec<f64> {
        let j = self.bracket(r);
        let h = self.h[j];
        let a = (self.radii[j + 1] - r) / h;
        let b = (r - self.radii[j]) / h;
        let c = (a * a * a - a) * h * h / 6.0;
        let d = (b * b * b - b) * h * h / 6.0;
        self.weights_from_terms_base(j, a, b, c, d)
    }

    /// Weight vector for the radial derivative ds/dr at `r`; weights sum
    /// to 0.
    pub fn derivative_coefficients(&self, r: f64) -> Vec<f64> {
        let j = self.bracket(r);
        let h = self.h[j];
        let a = (self.radii[j + 1] - r) / h;
        let b = (r - self.radii[j]) / h;
        let c = -(3.0 * a * a - 1.0) * h / 6.0;
        let d = (3.0 * b * b - 1.0) * h / 6.0;
        self.weights_from_terms_base(j, -1.0 / h, 1.0 / h, c, d)
    }

    /// Spline value at `r` for node values `y`.
    pub fn value(&self, r: f64, y: &[f64]) -> f64 {
        self.coefficients(r)
            .iter()
            .zip(y)
            .map(|(w, v)| w * v)
            .sum()
    }

    /// Assemble `base_j e_j + base_j1 e_{j+1} + c m_j + d m_{j+1}` as a
    /// weight vector over node values, where m is the natural-spline
    /// second-derivative solve.
    fn weights_from_terms_base(
        &self,
        j: usize,
        base_j: f64,
        base_j1: f64,
        c: f64,
        d: f64,
    ) -> Vec<f64> {
        let n = self.radii.len();
        let mut w = vec![0.0; n];
        w[j] += base_j;
        w[j + 1] += base_j1;

        // Natural conditions pin m_0 = m_{n-1} = 0; interior curvature
        // comes from the symmetric tridiagonal system T m = R y.
        let k = n - 2;
        if k == 0 || (c == 0.0 && d == 0.0) {
            return w;
        }
        // g picks the two curvature terms the bracket touches.
        let mut g = vec![0.0; k];
        if j >= 1 {
            g[j - 1] += c;
        }
        if j + 1 <= k {
            g[j] += d;
        }
        // Solve T z = g (Thomas algorithm); T is symmetric positive
        // definite for strictly increasing radii.
        let diag: Vec<f64> = (1..=k).map(|i| 2.0 * (self.h[i - 1] + self.h[i])).collect();
        let off: Vec<f64> = (1..k).map(|i| self.h[i]).collect();
        let mut cp = vec![0.0; k];
        let mut gp = vec![0.0; k];
        cp[0] = if k > 1 { off[0] / diag[0] } else { 0.0 };
        gp[0] = g[0] / diag[0];
        for i in 1..k {
            let denom = diag[i] - off[i - 1] * cp[i - 1];
            if i < k - 1 {
                cp[i] = off[i] / denom;
            }
            gp[i] = (g[i] - off[i - 1] * gp[i - 1]) / denom;
        }
        let mut z = vec![0.0; k];
        z[k - 1] = gp[k - 1];
        for i in (0..k - 1).rev() {
            z[i] = gp[i] - cp[i] * z[i + 1];
        }
        // z^T (R y): row i of R is
        //   6/h_{i-1} y_{i-1} - 6 (1/h_{i-1} + 1/h_i) y_i + 6/h_i y_{i+1}
        // with i the node index of interior unknown i-1.
        for (zi, i) in z.iter().zip(1..=k) {
            if *zi == 0.0 {
                continue;
            }
            let hl = self.h[i - 1];
            let hr = self.h[i];
            w[i - 1] += zi * 6.0 / hl;
            w[i] -= zi * 6.0 * (1.0 / hl + 1.0 / hr);
            w[i + 1] += zi * 6.0 / hr;
        }
        w
    }
}
