//! Band curvature along straight lines in k-space.
//!
//! The effective mass is `1 / (2 * a * EV_TO_HARTREE)` where `a` is the quadratic coefficient
//! of `E(k)` with `E` in eV. With `a = 1` this gives 13.605698 in units of the electron mass.

use anyhow::{
    anyhow,
    bail,
    ensure,
};
use nalgebra::{
    DMatrix,
    DVector,
    Vector3,
};

use crate::types::Result;


pub const EV_TO_HARTREE: f64 = 0.036749309;

/// Area threshold used to decide whether k-points lie on one line.
pub const COLLINEAR_TOLERANCE: f64 = 1E-7;

/// Energy changes below this fraction of the eigenvalue scale count as a flat band.
pub const FLAT_BAND_TOLERANCE: f64 = 1E-8;


fn vec3(p: &[f64; 3]) -> Vector3<f64> {
    Vector3::from(*p)
}


// Largest of the eigenvalue spread and magnitude, reference of "flat".
fn energy_scale(eigenvalues: &[f64]) -> f64 {
    let (emin, emax) = eigenvalues.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &e| (lo.min(e), hi.max(e)));
    let magnitude = eigenvalues.iter().fold(0.0f64, |acc, e| acc.max(e.abs()));
    (emax - emin).max(magnitude)
}


pub fn area_of_a_triangle_in_cartesian_space(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3]) -> f64 {
    let (a, b, c) = (vec3(a), vec3(b), vec3(c));
    0.5 * (b - a).cross(&(c - a)).norm()
}


/// Test if all the points lie on the line through the first point and the first one
/// differing from it. Fewer than three points always form a line.
pub fn points_are_in_a_straight_line(points: &[[f64; 3]], tolerance: f64) -> bool {
    if points.len() < 3 {
        return true;
    }

    let a = &points[0];
    let (ib, b) = match points.iter()
        .enumerate()
        .skip(1)
        .find(|(_, p)| (vec3(p) - vec3(a)).norm() > tolerance) {
            Some(x) => x,
            None => return true,    // all points coincide
        };

    points[ib + 1 ..].iter()
        .all(|c| area_of_a_triangle_in_cartesian_space(a, b, c) < tolerance)
}


/// Least squares fit of `y = a*x^2 + b*x + c`, returns `[a, b, c]`.
///
/// The design matrix `[x^2, x, 1]` is solved by SVD directly, rank deficiency means there
/// are less than 3 distinct x values.
pub fn quadratic_fit(x: &[f64], y: &[f64]) -> Result<[f64; 3]> {
    ensure!(x.len() == y.len(), "Length of x ({}) and y ({}) mismatch.", x.len(), y.len());
    ensure!(x.len() >= 3, "At least 3 points are needed for quadratic fit, got {}.", x.len());

    let design = DMatrix::from_fn(x.len(), 3, |i, j| x[i].powi(2 - j as i32));
    let rhs = DVector::from_column_slice(y);

    let svd = design.svd(true, true);
    let eps = svd.singular_values.max() * 1E-12;
    if svd.rank(eps) < 3 {
        bail!("Singular system in quadratic fit, at least 3 distinct x values are needed.");
    }

    let coeffs = svd.solve(&rhs, eps)
        .map_err(|e| anyhow!("Quadratic fit failed: {}", e))?;
    Ok([coeffs[0], coeffs[1], coeffs[2]])
}


/// Effective mass from a quadratic fit of `eigenvalues` against the signed distance of
/// `k_points` from the first one. The k-points must be collinear.
pub fn least_squares_effective_mass(k_points: &[[f64; 3]], eigenvalues: &[f64]) -> Result<f64> {
    ensure!(k_points.len() == eigenvalues.len(),
        "Number of k-points ({}) and eigenvalues ({}) mismatch.", k_points.len(), eigenvalues.len());
    ensure!(k_points.len() >= 3,
        "At least 3 k-points are needed for least squares fitting, got {}.", k_points.len());
    if !points_are_in_a_straight_line(k_points, COLLINEAR_TOLERANCE) {
        bail!("K-points are not collinear.");
    }

    let origin = vec3(&k_points[0]);
    let dir = k_points.iter()
        .map(|k| vec3(k) - origin)
        .fold(Vector3::zeros(), |acc, d| if d.norm() > acc.norm() { d } else { acc });
    let len = dir.norm();
    ensure!(len > 0.0, "All k-points coincide.");

    let dk = k_points.iter()
        .map(|k| (vec3(k) - origin).dot(&dir) / len)
        .collect::<Vec<f64>>();

    let [a, _, _] = quadratic_fit(&dk, eigenvalues)?;
    ensure!(a.abs() * len * len > FLAT_BAND_TOLERANCE * energy_scale(eigenvalues),
        "Band is flat along the selected k-points, effective mass diverges.");

    Ok(1.0 / (a * EV_TO_HARTREE * 2.0))
}


/// Effective mass from exactly two points, the first of which is taken as the band extremum.
pub fn two_point_effective_mass(k_points: &[[f64; 3]], eigenvalues: &[f64]) -> Result<f64> {
    ensure!(k_points.len() == 2, "Exactly 2 k-points are needed, got {}.", k_points.len());
    ensure!(eigenvalues.len() == 2, "Exactly 2 eigenvalues are needed, got {}.", eigenvalues.len());

    let dk = (vec3(&k_points[1]) - vec3(&k_points[0])).norm();
    let de = eigenvalues[1] - eigenvalues[0];
    ensure!(de.abs() > FLAT_BAND_TOLERANCE * energy_scale(eigenvalues),
        "Eigenvalues are degenerate, effective mass diverges.");

    Ok(dk * dk / (de * EV_TO_HARTREE * 2.0))
}
