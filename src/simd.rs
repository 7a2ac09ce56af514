//! Vector kernels shared by the dense and quantized paths.
//!
//! Written as plain iterator chains so the compiler can auto-vectorize them.
//! Callers are responsible for passing equal-length slices.

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// L2 distance squared (faster when only comparing distances).
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// `y += alpha * x`, element-wise.
#[inline]
pub fn axpy(alpha: f32, x: &[f32], y: &mut [f32]) {
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// `v *= alpha`, element-wise.
#[inline]
pub fn scale(alpha: f32, v: &mut [f32]) {
    for x in v {
        *x *= alpha;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_basic() {
        let a = [1.0_f32, 2.0, 3.0];
        let b = [4.0_f32, 5.0, 6.0];
        let result = dot(&a, &b);
        assert!((result - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_norm() {
        let v = [3.0_f32, 4.0];
        assert!((norm(&v) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_distance_squared() {
        let a = [0.0_f32, 0.0];
        let b = [3.0_f32, 4.0];
        assert!((l2_distance_squared(&a, &b) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_axpy() {
        let x = [1.0_f32, -2.0, 0.5];
        let mut y = [1.0_f32, 1.0, 1.0];
        axpy(2.0, &x, &mut y);
        assert_eq!(y, [3.0, -3.0, 2.0]);
    }

    #[test]
    fn test_scale() {
        let mut v = [1.0_f32, -2.0];
        scale(-0.5, &mut v);
        assert_eq!(v, [-0.5, 1.0]);
    }
}
