/// Savitzky–Golay smoothing with polynomial-fit edges.
///
/// Every output point is the value at that point of a least-squares
/// polynomial of degree `order` fitted over `window` consecutive inputs. The
/// window is centred where it fits and pinned to the first or last `window`
/// inputs near the edges. When the series is shorter than `window`, the
/// window shrinks to the largest odd length that fits and the order is capped
/// at `window - 1`; fewer than three points come back unchanged.
pub fn savgol_filter(values: &[f64], window: usize, order: usize) -> Vec<f64> {
    let n = values.len();
    let mut window = window.min(n);
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    if window < 3 {
        return values.to_vec();
    }
    let order = order.min(window - 1);
    let half = window / 2;

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - window);
            fit_and_eval(&values[start..start + window], order, i - start)
        })
        .collect()
}

/// Least-squares polynomial through `segment` evaluated at index `at`.
fn fit_and_eval(segment: &[f64], order: usize, at: usize) -> f64 {
    let terms = order + 1;
    let centre = (segment.len() - 1) as f64 / 2.0;

    // normal equations: (XᵀX) c = Xᵀy, with x centred for conditioning
    let mut lhs = vec![vec![0.0; terms]; terms];
    let mut rhs = vec![0.0; terms];
    for (j, y) in segment.iter().enumerate() {
        let x = j as f64 - centre;
        let powers: Vec<f64> = (0..2 * terms - 1).map(|p| x.powi(p as i32)).collect();
        for r in 0..terms {
            rhs[r] += y * powers[r];
            for c in 0..terms {
                lhs[r][c] += powers[r + c];
            }
        }
    }
    let coeffs = solve(lhs, rhs);

    let x = at as f64 - centre;
    coeffs
        .iter()
        .rev()
        .fold(0.0, |acc, coeff| acc * x + coeff)
}

/// Gaussian elimination with partial pivoting. The systems built here are
/// small and symmetric positive definite.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x
}
