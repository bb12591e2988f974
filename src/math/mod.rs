pub mod interp;

pub use interp::GridInterpolator;

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Slack used when rounding angular step counts so that an exact multiple
/// of the average spacing does not round up to an extra step.
const STEP_SNAP: f64 = 1e-9;

/// Returns `count` evenly spaced values from `start` to `end` inclusive.
#[must_use]
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let step = (end - start) / (count - 1) as f64;
            #[allow(clippy::cast_precision_loss)]
            (0..count)
                .map(|i| if i == count - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Densifies an increasing angle sequence towards `count` entries.
///
/// Every input angle is kept exactly. Between each pair of neighbours,
/// evenly spaced angles are inserted so that the spacing approximates the
/// average spacing of `count` samples over the full range. When `count`
/// does not exceed the input length the input is returned unchanged.
#[must_use]
pub fn expand_angles(angles: &[f64], count: usize) -> Vec<f64> {
    if angles.len() < 2 || count <= angles.len() {
        return angles.to_vec();
    }
    let first = angles[0];
    let last = angles[angles.len() - 1];
    #[allow(clippy::cast_precision_loss)]
    let average = (last - first) / (count - 1) as f64;

    let mut expanded = Vec::with_capacity(count);
    for pair in angles.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = ((b - a) / average - STEP_SNAP).ceil().max(1.0) as usize;
        for k in 0..steps {
            #[allow(clippy::cast_precision_loss)]
            expanded.push(a + (b - a) * k as f64 / steps as f64);
        }
    }
    expanded.push(last);
    expanded
}

/// Wraps an angle in radians into `[0, 2π)`.
#[must_use]
pub fn wrap_angle(angle: f64) -> f64 {
    angle.rem_euclid(std::f64::consts::TAU)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_hits_both_ends() {
        let v = linspace(0.0, 90.0, 4);
        assert_eq!(v, vec![0.0, 30.0, 60.0, 90.0]);
        assert!(linspace(1.0, 2.0, 0).is_empty());
        assert_eq!(linspace(5.0, 9.0, 1), vec![5.0]);
    }

    #[test]
    fn expansion_is_identity_at_input_density() {
        let angles = [0.0, 11.25, 22.5, 45.0, 90.0];
        assert_eq!(expand_angles(&angles, angles.len()), angles.to_vec());
        assert_eq!(expand_angles(&angles, 2), angles.to_vec());
    }

    #[test]
    fn expansion_keeps_inputs_and_fills_evenly() {
        let angles = [0.0, 30.0, 60.0];
        let expanded = expand_angles(&angles, 7);
        assert_eq!(expanded, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
    }

    #[test]
    fn expansion_of_uneven_grid_preserves_every_input_angle() {
        let angles = [0.0, 5.0, 60.0, 90.0];
        let expanded = expand_angles(&angles, 10);
        for a in angles {
            assert!(expanded.iter().any(|&e| (e - a).abs() < TOLERANCE), "{a} missing");
        }
        assert!(expanded.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn wrap_angle_is_positive() {
        let wrapped = wrap_angle(-std::f64::consts::FRAC_PI_2);
        assert!((wrapped - 1.5 * std::f64::consts::PI).abs() < 1e-12);
    }
}
