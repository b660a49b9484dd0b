use ndarray::{arr1, arr2, Array2, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Multiply two 2D arrays.
    pub fn multiply(lhs: ArrayView2<f64>, rhs: ArrayView2<f64>) -> Array2<f64> {
        lhs.dot(&rhs)
    }

    /// Coordinate rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Array2<f64> {
        let (s, c) = angle.sin_cos();
        arr2(&[[1.0, 0.0, 0.0], [0.0, c, s], [0.0, -s, c]])
    }

    /// Coordinate rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f64) -> Array2<f64> {
        let (s, c) = angle.sin_cos();
        arr2(&[[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn apply(matrix: ArrayView2<f64>, vector: [f64; 3]) -> [f64; 3] {
        let out = matrix.dot(&arr1(&vector));
        [out[0], out[1], out[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_rotations_cancel() {
        let forward = MatrixHelper::rotation_z(0.7);
        let back = MatrixHelper::rotation_z(-0.7);
        let product = MatrixHelper::multiply(forward.view(), back.view());
        let v = MatrixHelper::apply(product.view(), [0.3, -0.4, 0.5]);
        assert!((v[0] - 0.3).abs() < 1e-12);
        assert!((v[1] + 0.4).abs() < 1e-12);
        assert!((v[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn quarter_turn_about_x_moves_y_onto_negative_z() {
        let v = MatrixHelper::apply(
            MatrixHelper::rotation_x(std::f64::consts::FRAC_PI_2).view(),
            [0.0, 1.0, 0.0],
        );
        assert!(v[1].abs() < 1e-12);
        assert!((v[2] + 1.0).abs() < 1e-12);
    }
}
