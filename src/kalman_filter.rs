// Constant velocity Kalman filter for a 2D point, state (x, y, vx, vy) with a
// time step of one frame. The filter holds only the constant model matrices,
// the mutable part lives in `KalmanState` and each step returns a new state.

use crate::all::*;

#[derive(Clone, Debug, PartialEq)]
#[allow(non_snake_case)]
pub struct KalmanState {
  pub mean: Vector4d,
  pub P: Matrix4d,
}

impl KalmanState {
  pub fn position(&self) -> Vector2d {
    Vector2d::new(self.mean[0], self.mean[1])
  }

  pub fn velocity(&self) -> Vector2d {
    Vector2d::new(self.mean[2], self.mean[3])
  }
}

#[allow(non_snake_case)]
#[derive(Clone, Debug)]
pub struct KalmanFilter {
  F: Matrix4d,
  H: Matrix24d,
  Q: Matrix4d,
  R: Matrix2d,
}

#[allow(non_snake_case)]
impl KalmanFilter {
  pub fn new(
    position_noise: f64,
    velocity_noise: f64,
    measurement_noise: f64,
  ) -> KalmanFilter {
    let mut F = Matrix4d::identity();
    F[(0, 2)] = 1.;
    F[(1, 3)] = 1.;
    let mut H = Matrix24d::zeros();
    H[(0, 0)] = 1.;
    H[(1, 1)] = 1.;
    KalmanFilter {
      F,
      H,
      Q: Matrix4d::from_diagonal(&Vector4d::new(
        position_noise, position_noise, velocity_noise, velocity_noise,
      )),
      R: Matrix2d::identity() * measurement_noise,
    }
  }

  pub fn from_parameters(p: &ParameterSet) -> KalmanFilter {
    KalmanFilter::new(p.kalman_position_noise, p.kalman_velocity_noise, p.kalman_measurement_noise)
  }

  // At rest and fully trusted, like a freshly constructed OpenCV filter
  // with `statePost` set to the point.
  pub fn initiate(&self, point: Vector2d) -> KalmanState {
    KalmanState {
      mean: Vector4d::new(point[0], point[1], 0., 0.),
      P: Matrix4d::zeros(),
    }
  }

  pub fn predict(&self, state: &KalmanState) -> KalmanState {
    KalmanState {
      mean: self.F * state.mean,
      P: self.F * state.P * self.F.transpose() + self.Q,
    }
  }

  pub fn correct(&self, state: &KalmanState, measurement: Vector2d) -> KalmanState {
    let S = self.H * state.P * self.H.transpose() + self.R;
    let invS = match S.try_inverse() {
      Some(invS) => invS,
      None => return state.clone(),
    };
    let K: Matrix42d = state.P * self.H.transpose() * invS;
    let innovation = measurement - self.H * state.mean;
    KalmanState {
      mean: state.mean + K * innovation,
      P: (Matrix4d::identity() - K * self.H) * state.P,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn filter() -> KalmanFilter {
    KalmanFilter::from_parameters(&ParameterSet::default())
  }

  #[test]
  fn test_static_point_stays() {
    let kf = filter();
    let p = Vector2d::new(100., 50.);
    let mut state = kf.initiate(p);
    for _ in 0..20 {
      state = kf.predict(&state);
      state = kf.correct(&state, p);
    }
    assert!((state.position() - p).norm() < 1e-9);
    assert!(state.velocity().norm() < 1e-9);
  }

  #[test]
  fn test_predict_uses_velocity() {
    let kf = filter();
    let mut state = kf.initiate(Vector2d::new(1., 2.));
    state.mean[2] = 3.;
    state.mean[3] = -1.;
    let predicted = kf.predict(&state);
    assert_eq!(predicted.position(), Vector2d::new(4., 1.));
    assert_eq!(predicted.velocity(), Vector2d::new(3., -1.));
    // Uncertainty grows without measurements.
    assert!(predicted.P[(0, 0)] > state.P[(0, 0)]);
  }

  #[test]
  fn test_correct_moves_towards_measurement() {
    let kf = filter();
    let state = kf.predict(&kf.initiate(Vector2d::new(0., 0.)));
    let corrected = kf.correct(&state, Vector2d::new(10., 0.));
    let x = corrected.position()[0];
    assert!(x > 0. && x < 10.);
    assert_eq!(corrected.position()[1], 0.);
    assert!(corrected.P[(0, 0)] < state.P[(0, 0)]);
  }

  #[test]
  fn test_converges_to_constant_velocity() {
    let kf = filter();
    let mut state = kf.initiate(Vector2d::new(0., 0.));
    for t in 1..400 {
      state = kf.predict(&state);
      state = kf.correct(&state, Vector2d::new(2. * t as f64, 0.));
    }
    assert!((state.velocity()[0] - 2.).abs() < 0.05, "{}", state.velocity());
    assert!((state.position()[0] - 2. * 399.).abs() < 1.);
  }
}
