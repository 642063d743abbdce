use crate::all::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub usize);

// Index into the per-run sample table and the Kalman filter bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
  Center,
  Up,
  Down,
  Left,
  Right,
}

impl SampleKind {
  pub const ALL: [SampleKind; 5] = [
    SampleKind::Center,
    SampleKind::Up,
    SampleKind::Down,
    SampleKind::Left,
    SampleKind::Right,
  ];

  // Image y axis points down.
  pub fn offset(self, shift: f64) -> Vector2d {
    match self {
      SampleKind::Center => Vector2d::zeros(),
      SampleKind::Up => Vector2d::new(0., -shift),
      SampleKind::Down => Vector2d::new(0., shift),
      SampleKind::Left => Vector2d::new(-shift, 0.),
      SampleKind::Right => Vector2d::new(shift, 0.),
    }
  }
}

// Sample probe for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
  pub id: SampleId,
  pub vertex: VertexId,
  pub point: Vector2d,
}

// Which samples belong to which vertex, fixed for a tracking run.
#[derive(Clone, Debug)]
pub struct SampleLayout {
  // Offset of each sample from its vertex.
  offsets: Vec<Vector2d>,
  by_vertex: Vec<Vec<SampleId>>,
}

impl SampleLayout {
  pub fn new(vertex_count: usize, use_shifted_points: bool, shift: f64) -> SampleLayout {
    let kinds: &[SampleKind] = if use_shifted_points { &SampleKind::ALL } else { &SampleKind::ALL[..1] };
    let mut offsets = vec![];
    let mut by_vertex = vec![];
    for _ in 0..vertex_count {
      let mut ids = vec![];
      for kind in kinds {
        ids.push(SampleId(offsets.len()));
        offsets.push(kind.offset(shift));
      }
      by_vertex.push(ids);
    }
    SampleLayout { offsets, by_vertex }
  }

  pub fn from_parameters(vertex_count: usize, p: &ParameterSet) -> SampleLayout {
    SampleLayout::new(vertex_count, p.use_shifted_points, p.shift_value)
  }

  pub fn vertex_count(&self) -> usize {
    self.by_vertex.len()
  }

  pub fn sample_count(&self) -> usize {
    self.offsets.len()
  }

  pub fn offset(&self, id: SampleId) -> Vector2d {
    self.offsets[id.0]
  }

  pub fn samples_of(&self, vertex: VertexId) -> &[SampleId] {
    &self.by_vertex[vertex.0]
  }

  // The first sample of each vertex is always its center.
  pub fn center_of(&self, vertex: VertexId) -> SampleId {
    self.by_vertex[vertex.0][0]
  }
}

// Sample set for the next frame transition from the current vertex
// positions. Lost vertices get no samples.
pub fn generate_samples(
  layout: &SampleLayout,
  positions: &[Option<Vector2d>],
) -> Vec<Sample> {
  assert_eq!(positions.len(), layout.vertex_count());
  let mut samples = vec![];
  for (v, position) in positions.iter().enumerate() {
    let position = match position {
      Some(p) => p,
      None => continue,
    };
    for id in layout.samples_of(VertexId(v)) {
      samples.push(Sample {
        id: *id,
        vertex: VertexId(v),
        point: position + layout.offset(*id),
      });
    }
  }
  samples
}
