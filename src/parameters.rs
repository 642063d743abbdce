use crate::all::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMethod {
  Average,
  Consensus,
}

impl Default for FilterMethod {
  fn default() -> FilterMethod {
    FilterMethod::Consensus
  }
}

#[derive(Clone, Debug, PartialEq)]
#[derive(clap::Args, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
  // Vertex tracker.
  /// Disable the four shifted samples around each vertex.
  #[clap(long = "no-shifted-points", parse(from_flag = std::ops::Not::not))]
  pub use_shifted_points: bool,
  /// Distance in pixels of the shifted samples from the vertex.
  #[clap(long, default_value = "5")]
  pub shift_value: f64,
  /// Comma separated optical flow window sizes, each odd.
  #[clap(long = "window-sizes", value_delimiter = ',', default_value = "21")]
  pub window_sizes: Vec<usize>,
  #[clap(long, value_enum, default_value = "consensus")]
  pub filter_method: FilterMethod,

  // Pyramidal Lucas-Kanade feature tracker.
  #[clap(long, default_value = "3")]
  pub lk_levels: usize,
  #[clap(long, default_value = "30")]
  pub lk_iters: usize,
  #[clap(long, default_value = "0.01")]
  pub lk_epsilon: f64,

  // Per-sample Kalman filters.
  #[clap(long, default_value = "1e-4")]
  pub kalman_position_noise: f64,
  #[clap(long, default_value = "1e-3")]
  pub kalman_velocity_noise: f64,
  #[clap(long, default_value = "1e-3")]
  pub kalman_measurement_noise: f64,
}

impl Default for ParameterSet {
  fn default() -> ParameterSet {
    ParameterSet {
      use_shifted_points: true,
      shift_value: 5.,
      window_sizes: vec![DEFAULT_WINDOW_SIZE],
      filter_method: FilterMethod::Consensus,
      lk_levels: 3,
      lk_iters: 30,
      lk_epsilon: 0.01,
      kalman_position_noise: 1e-4,
      kalman_velocity_noise: 1e-3,
      kalman_measurement_noise: 1e-3,
    }
  }
}

pub const DEFAULT_WINDOW_SIZE: usize = 21;

impl ParameterSet {
  pub fn from_json(s: &str) -> Result<ParameterSet> {
    serde_json::from_str(s).context("Failed to parse tracking parameters.")
  }

  // Window sizes with the default substituted for an empty list.
  pub fn effective_window_sizes(&self) -> Vec<usize> {
    if self.window_sizes.is_empty() {
      vec![DEFAULT_WINDOW_SIZE]
    }
    else {
      self.window_sizes.clone()
    }
  }

  // Caller-side checks, the tracker itself does not re-validate.
  pub fn validate(&self) -> Result<()> {
    for w in self.effective_window_sizes() {
      if w % 2 != 1 || w < 3 {
        bail!("Window size {} is not an odd number of at least 3.", w);
      }
    }
    if self.use_shifted_points && !(self.shift_value > 0.) {
      bail!("Shift value must be positive, got {}.", self.shift_value);
    }
    if !(self.lk_epsilon > 0.) {
      bail!("Lucas-Kanade epsilon must be positive, got {}.", self.lk_epsilon);
    }
    if self.lk_iters == 0 {
      bail!("Lucas-Kanade iteration count must be positive.");
    }
    Ok(())
  }
}
