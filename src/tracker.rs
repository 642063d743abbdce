use crate::all::*;

// Positions of every vertex for every frame of a run, index 0 being the
// frame the initial points were given on.
pub type Trajectory = Vec<VertexPositions>;

// Shared between a tracking run and the thread waiting for it.
#[derive(Debug, Default)]
pub struct TrackControl {
  pub cancel: AtomicBool,
  // Frames processed so far, including the first.
  pub processed: AtomicUsize,
  // Frame count of the source, 0 if unknown.
  pub total: AtomicUsize,
}

impl TrackControl {
  pub fn is_cancelled(&self) -> bool {
    self.cancel.load(Ordering::Relaxed)
  }
}

// Tracks the vertices of one polygon through consecutive frames. All state
// lives for a single run.
pub struct VertexTracker {
  layout: SampleLayout,
  kalman_filter: KalmanFilter,
  // Indexed by `SampleId`, fed only with measurements of that sample.
  kalman_states: Vec<KalmanState>,
  optical_flows: Vec<OpticalFlow>,
  filter_method: FilterMethod,
  lk_levels: usize,
  positions: VertexPositions,
  previous_frame: Option<Frame>,
  frame_number: usize,
  // Workspace.
  points0: Vec<Vector2d>,
  points1: Vec<Vector2d>,
  statuses: Vec<bool>,
  measurements: Vec<Vec<Vector2d>>,
}

impl VertexTracker {
  pub fn new(initial_points: &[Vector2d], p: &ParameterSet) -> Result<VertexTracker> {
    let layout = SampleLayout::from_parameters(initial_points.len(), p);
    let kalman_filter = KalmanFilter::from_parameters(p);
    let positions: VertexPositions = initial_points.iter().map(|x| Some(*x)).collect();
    let kalman_states = generate_samples(&layout, &positions).iter()
      .map(|sample| kalman_filter.initiate(sample.point))
      .collect();
    let optical_flows = p.effective_window_sizes().into_iter()
      .map(|w| OpticalFlow::from_parameters(w, p))
      .collect::<Result<Vec<_>>>()?;
    info!(
      "Tracking {} vertices with {} samples, window sizes {:?}, {:?} filtering.",
      layout.vertex_count(),
      layout.sample_count(),
      optical_flows.iter().map(|f| f.win_size()).collect::<Vec<_>>(),
      p.filter_method,
    );
    Ok(VertexTracker {
      kalman_states,
      kalman_filter,
      optical_flows,
      filter_method: p.filter_method,
      lk_levels: p.lk_levels,
      positions,
      previous_frame: None,
      frame_number: 0,
      points0: vec![],
      points1: vec![],
      statuses: vec![],
      measurements: vec![vec![]; layout.sample_count()],
      layout,
    })
  }

  pub fn positions(&self) -> &[Option<Vector2d>] {
    &self.positions
  }

  // Returns the vertex positions on the given frame. The first frame only
  // sets the reference and returns the initial points.
  pub fn process(&mut self, image: Image) -> VertexPositions {
    let frame = Frame::new(image, self.lk_levels);
    let previous_frame = match self.previous_frame.take() {
      Some(f) => f,
      None => {
        self.previous_frame = Some(frame);
        return self.positions.clone();
      },
    };
    self.frame_number += 1;
    if self.positions.iter().all(|x| x.is_none()) {
      self.previous_frame = Some(frame);
      return self.positions.clone();
    }

    let samples = generate_samples(&self.layout, &self.positions);
    self.points0.clear();
    self.points0.extend(samples.iter().map(|s| s.point));
    for m in &mut self.measurements { m.clear(); }
    for flow in &mut self.optical_flows {
      flow.process(&previous_frame, &frame, &self.points0, &mut self.points1, &mut self.statuses);
      for (i, sample) in samples.iter().enumerate() {
        if self.statuses[i] {
          self.measurements[sample.id.0].push(self.points1[i]);
        }
      }
    }

    let mut pools: Vec<Vec<Vector2d>> = vec![vec![]; self.positions.len()];
    for sample in &samples {
      let measurements = &self.measurements[sample.id.0];
      if measurements.is_empty() { continue }
      let (state, estimates) = filter_measurements(
        &self.kalman_filter,
        &self.kalman_states[sample.id.0],
        measurements,
        self.layout.offset(sample.id),
      );
      self.kalman_states[sample.id.0] = state;
      pools[sample.vertex.0].extend(estimates);
    }

    for v in 0..self.positions.len() {
      let previous = match self.positions[v] {
        Some(p) => p,
        None => continue,
      };
      let position = match fuse(&pools[v], previous, self.filter_method) {
        Some(p) => p,
        None => self.predict_center(VertexId(v)),
      };
      if frame.image.contains(&position) {
        self.positions[v] = Some(position);
      }
      else {
        info!("Vertex {} lost at frame {}.", v, self.frame_number);
        self.positions[v] = None;
      }
    }
    trace!("Frame {}: {:?}", self.frame_number, self.positions);
    self.previous_frame = Some(frame);
    self.positions.clone()
  }

  // Position for a vertex none of whose samples were tracked.
  fn predict_center(&mut self, vertex: VertexId) -> Vector2d {
    let center = self.layout.center_of(vertex);
    let state = self.kalman_filter.predict(&self.kalman_states[center.0]);
    debug!(
      "Vertex {} follows its prediction at frame {}, velocity {:?}.",
      vertex.0, self.frame_number, state.velocity(),
    );
    let position = state.position();
    self.kalman_states[center.0] = state;
    position
  }
}

// Feeds one frame's measurements of a sample to its filter in window order,
// predicting before each correction. Returns the new state and the vertex
// position estimate after every correction.
pub fn filter_measurements(
  kalman_filter: &KalmanFilter,
  state: &KalmanState,
  measurements: &[Vector2d],
  offset: Vector2d,
) -> (KalmanState, Vec<Vector2d>) {
  let mut state = state.clone();
  let mut estimates = Vec::with_capacity(measurements.len());
  for m in measurements {
    state = kalman_filter.correct(&kalman_filter.predict(&state), *m);
    estimates.push(state.position() - offset);
  }
  (state, estimates)
}

// Runs the tracker over the whole source. A source that cannot produce a
// first frame yields an empty trajectory.
pub fn track(
  source: &mut dyn FrameSource,
  initial_points: &[Vector2d],
  p: &ParameterSet,
  control: &TrackControl,
) -> Result<Trajectory> {
  let mut tracker = VertexTracker::new(initial_points, p)?;
  control.total.store(source.frame_count().unwrap_or(0), Ordering::Relaxed);
  let mut trajectory: Trajectory = vec![];
  loop {
    if control.is_cancelled() {
      bail!("Tracking cancelled after {} frames.", trajectory.len());
    }
    let image = match source.next_frame() {
      Ok(Some(image)) => image.clone(),
      Ok(None) => break,
      Err(err) => {
        warn!("Stopping tracking after {} frames: {:#}", trajectory.len(), err);
        break;
      },
    };
    trajectory.push(tracker.process(image));
    control.processed.store(trajectory.len(), Ordering::Relaxed);
  }
  if trajectory.is_empty() {
    warn!("Frame source produced no frames, nothing was tracked.");
  }
  else {
    let lost = tracker.positions().iter().filter(|x| x.is_none()).count();
    info!("Tracked {} frames, {} of {} vertices lost.", trajectory.len(), lost, initial_points.len());
  }
  Ok(trajectory)
}

// Like `track()` for a video file. A video that cannot be opened yields an
// empty trajectory.
pub fn track_video(
  path: &Path,
  initial_points: &[Vector2d],
  p: &ParameterSet,
  control: &TrackControl,
) -> Result<Trajectory> {
  let mut input = match VideoInput::new(path) {
    Ok(input) => input,
    Err(err) => {
      warn!("Cannot open video for tracking: {:#}", err);
      return Ok(vec![]);
    },
  };
  track(&mut input, initial_points, p, control)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::test_util::textured_image;

  fn static_video(frame_count: usize) -> ImageSequence {
    let image = textured_image(200, 200, 7);
    ImageSequence::new(vec![image; frame_count])
  }

  fn run(source: &mut dyn FrameSource, points: &[Vector2d], p: &ParameterSet) -> Trajectory {
    track(source, points, p, &TrackControl::default()).unwrap()
  }

  struct BrokenSource;

  impl FrameSource for BrokenSource {
    fn next_frame(&mut self) -> Result<Option<&Image>> {
      bail!("Decoder crashed.")
    }

    fn frame_count(&self) -> Option<usize> {
      None
    }
  }

  #[test]
  fn test_static_scene() {
    let points = vec![Vector2d::new(100., 100.)];
    let trajectory = run(&mut static_video(3), &points, &ParameterSet::default());
    assert_eq!(trajectory.len(), 3);
    assert_eq!(trajectory[0], vec![Some(Vector2d::new(100., 100.))]);
    for positions in &trajectory[1..] {
      let p = positions[0].unwrap();
      assert!((p - points[0]).norm() < 0.5, "{}", p);
    }
  }

  #[test]
  fn test_static_scene_other_configurations() {
    let points = vec![Vector2d::new(80., 120.), Vector2d::new(130.5, 60.25)];
    let mut p = ParameterSet::default();
    p.use_shifted_points = false;
    p.filter_method = FilterMethod::Average;
    p.window_sizes = vec![15, 31];
    let trajectory = run(&mut static_video(4), &points, &p);
    assert_eq!(trajectory.len(), 4);
    for positions in &trajectory {
      for (position, point) in positions.iter().zip(&points) {
        assert!((position.unwrap() - point).norm() < 0.5);
      }
    }
  }

  #[test]
  fn test_follows_translation() {
    let texture = textured_image(260, 200, 3);
    // Content moves 2 pixels right every frame.
    let images = (0..9).map(|k| texture.get_sub_image(40 - 2 * k, 0, 200, 200)).collect();
    let points = vec![Vector2d::new(100., 100.)];
    let trajectory = run(&mut ImageSequence::new(images), &points, &ParameterSet::default());
    assert_eq!(trajectory.len(), 9);
    let mut x = 100.;
    for positions in &trajectory[1..] {
      let p = positions[0].unwrap();
      assert!(p[0] > x, "{} not right of {}", p[0], x);
      assert!((p[1] - 100.).abs() < 1., "{}", p);
      x = p[0];
    }
    assert!(x > 101. && x < 100. + 2. * 8. + 2., "{}", x);
  }

  #[test]
  fn test_loss_is_permanent() {
    let points = vec![Vector2d::new(-50., -50.), Vector2d::new(100., 100.)];
    let trajectory = run(&mut static_video(5), &points, &ParameterSet::default());
    assert_eq!(trajectory.len(), 5);
    assert_eq!(trajectory[0][0], Some(points[0]));
    for positions in &trajectory[1..] {
      assert_eq!(positions[0], None);
      assert!(positions[1].is_some());
    }
  }

  #[test]
  fn test_all_vertices_lost() {
    let points = vec![Vector2d::new(-50., 10.), Vector2d::new(10., 500.)];
    let trajectory = run(&mut static_video(4), &points, &ParameterSet::default());
    assert_eq!(trajectory.len(), 4);
    for positions in &trajectory[1..] {
      assert_eq!(positions, &vec![None, None]);
    }
  }

  #[test]
  fn test_untrackable_vertex_follows_prediction() {
    let flat = Image::from_data(100, 100, vec![128; 10000]).unwrap();
    let mut tracker = VertexTracker::new(&[Vector2d::new(20., 50.)], &ParameterSet::default()).unwrap();
    // Give the center filter some velocity so the prediction is visible.
    let center = tracker.layout.center_of(VertexId(0));
    tracker.kalman_states[center.0].mean[2] = 1.;
    let xs: Vec<f64> = (0..16)
      .map(|_| tracker.process(flat.clone())[0].unwrap()[0])
      .collect();
    let expected: Vec<f64> = (20..36).map(|x| x as f64).collect();
    assert_eq!(xs, expected);
  }

  #[test]
  fn test_vertex_leaving_the_frame_stays_lost() {
    let texture = textured_image(400, 200, 5);
    // Content moves 10 pixels right every frame.
    let images = (0..12).map(|k| texture.get_sub_image(150 - 10 * k, 0, 200, 200)).collect();
    let mut p = ParameterSet::default();
    // Let the filter follow the measurements closely.
    p.kalman_measurement_noise = 1e-6;
    let points = vec![Vector2d::new(150., 100.), Vector2d::new(40., 100.)];
    let trajectory = run(&mut ImageSequence::new(images), &points, &p);
    assert_eq!(trajectory.len(), 12);
    for k in 1..=3 {
      let x = trajectory[k][0].unwrap()[0];
      assert!((x - (150. + 10. * k as f64)).abs() < 2., "frame {}: {}", k, x);
    }
    let lost_at = trajectory.iter().position(|positions| positions[0].is_none()).unwrap();
    assert!(lost_at >= 4, "{}", lost_at);
    assert!(trajectory[lost_at..].iter().all(|positions| positions[0].is_none()));
    assert!(trajectory.iter().all(|positions| positions[1].is_some()));
  }

  #[test]
  fn test_filter_predicts_before_each_correction() {
    let kalman_filter = KalmanFilter::from_parameters(&ParameterSet::default());
    let state0 = kalman_filter.initiate(Vector2d::new(10., 20.));
    // One measurement per window size.
    let measurements = [Vector2d::new(12., 20.), Vector2d::new(14., 21.)];
    let offset = Vector2d::new(5., 0.);
    let (state, estimates) = filter_measurements(&kalman_filter, &state0, &measurements, offset);

    let state1 = kalman_filter.correct(&kalman_filter.predict(&state0), measurements[0]);
    let state2 = kalman_filter.correct(&kalman_filter.predict(&state1), measurements[1]);
    assert_eq!(state, state2);
    assert_eq!(estimates, vec![state1.position() - offset, state2.position() - offset]);

    let predicted_once = kalman_filter.correct(
      &kalman_filter.correct(&kalman_filter.predict(&state0), measurements[0]),
      measurements[1],
    );
    assert_ne!(state.P, predicted_once.P);

    let (unchanged, estimates) = filter_measurements(&kalman_filter, &state0, &[], offset);
    assert_eq!(unchanged, state0);
    assert!(estimates.is_empty());
  }

  #[test]
  fn test_no_frames() {
    let points = vec![Vector2d::new(1., 1.)];
    assert!(run(&mut ImageSequence::new(vec![]), &points, &ParameterSet::default()).is_empty());
    assert!(run(&mut BrokenSource, &points, &ParameterSet::default()).is_empty());
    let control = TrackControl::default();
    let missing = Path::new("/nonexistent/video.mp4");
    assert!(track_video(missing, &points, &ParameterSet::default(), &control).unwrap().is_empty());
  }

  #[test]
  fn test_no_vertices() {
    let trajectory = run(&mut static_video(3), &[], &ParameterSet::default());
    assert_eq!(trajectory, vec![vec![]; 3]);
  }

  #[test]
  fn test_invalid_window_size() {
    let mut p = ParameterSet::default();
    p.window_sizes = vec![20];
    let points = vec![Vector2d::new(1., 1.)];
    assert!(track(&mut static_video(2), &points, &p, &TrackControl::default()).is_err());
  }

  #[test]
  fn test_progress_and_cancel() {
    let points = vec![Vector2d::new(100., 100.)];
    let control = TrackControl::default();
    track(&mut static_video(3), &points, &ParameterSet::default(), &control).unwrap();
    assert_eq!(control.processed.load(Ordering::Relaxed), 3);
    assert_eq!(control.total.load(Ordering::Relaxed), 3);

    let control = TrackControl::default();
    control.cancel.store(true, Ordering::Relaxed);
    assert!(track(&mut static_video(3), &points, &ParameterSet::default(), &control).is_err());
    assert_eq!(control.processed.load(Ordering::Relaxed), 0);
  }

  struct CancellingSource<'a> {
    frames: ImageSequence,
    control: &'a TrackControl,
    cancel_after: usize,
    served: usize,
  }

  impl FrameSource for CancellingSource<'_> {
    fn next_frame(&mut self) -> Result<Option<&Image>> {
      self.served += 1;
      if self.served == self.cancel_after {
        self.control.cancel.store(true, Ordering::Relaxed);
      }
      self.frames.next_frame()
    }

    fn frame_count(&self) -> Option<usize> {
      self.frames.frame_count()
    }
  }

  #[test]
  fn test_cancel_between_frames() {
    let points = vec![Vector2d::new(100., 100.)];
    let control = TrackControl::default();
    let mut source = CancellingSource {
      frames: static_video(6),
      control: &control,
      cancel_after: 2,
      served: 0,
    };
    assert!(track(&mut source, &points, &ParameterSet::default(), &control).is_err());
    assert_eq!(control.processed.load(Ordering::Relaxed), 2);
    assert_eq!(source.served, 2);
  }
}
