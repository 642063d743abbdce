use crate::all::*;

// Pixels an estimate's displacement may differ from the median displacement
// on either axis and still count as agreeing.
pub const CONSENSUS_THRESHOLD: f64 = 10.;

// Fewer estimates than this are always averaged.
const MIN_CONSENSUS_ESTIMATES: usize = 3;

// Combines the pooled position estimates of one vertex. `previous` is the
// vertex position on the frame the estimates were tracked from.
pub fn fuse(
  estimates: &[Vector2d],
  previous: Vector2d,
  method: FilterMethod,
) -> Option<Vector2d> {
  if estimates.is_empty() { return None }
  if method == FilterMethod::Average || estimates.len() < MIN_CONSENSUS_ESTIMATES {
    return Some(mean(estimates));
  }

  let displacements: Vec<Vector2d> = estimates.iter().map(|e| e - previous).collect();
  let mut xs: Vec<f64> = displacements.iter().map(|d| d[0]).collect();
  let mut ys: Vec<f64> = displacements.iter().map(|d| d[1]).collect();
  let median_d = Vector2d::new(median(&mut xs)?, median(&mut ys)?);

  let agreeing: Vec<Vector2d> = estimates.iter().zip(&displacements)
    .filter(|(_, d)| {
      (d[0] - median_d[0]).abs() < CONSENSUS_THRESHOLD
        && (d[1] - median_d[1]).abs() < CONSENSUS_THRESHOLD
    })
    .map(|(e, _)| *e)
    .collect();

  if agreeing.is_empty() {
    trace!("No consensus among {} estimates, using median displacement.", estimates.len());
    Some(previous + median_d)
  }
  else {
    Some(mean(&agreeing))
  }
}

fn mean(points: &[Vector2d]) -> Vector2d {
  points.iter().sum::<Vector2d>() / points.len() as f64
}
