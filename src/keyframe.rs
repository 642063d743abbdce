use crate::all::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
  pub frame: i64,
  pub points: Vec<Vector2d>,
}

// Polygon vertices at `frame`, linearly interpolated between the surrounding
// keyframes and clamped to the first and last keyframe outside their range.
// `keyframes` must be sorted by frame.
//
// When the two keyframes have different vertex counts, the result has as many
// vertices as the earlier keyframe and vertices missing from the later one
// stay where the earlier keyframe has them.
pub fn interpolate(keyframes: &[Keyframe], frame: i64) -> Vec<Vector2d> {
  if keyframes.is_empty() { return vec![] }
  let next_ind = keyframes.partition_point(|k| k.frame <= frame);
  let (prev, next) = match (next_ind.checked_sub(1), keyframes.get(next_ind)) {
    (None, _) => return keyframes[0].points.clone(),
    (Some(_), None) => return keyframes[keyframes.len() - 1].points.clone(),
    (Some(prev_ind), Some(next)) => (&keyframes[prev_ind], next),
  };
  let total_frames = next.frame - prev.frame;
  // Only possible if the keyframes are not sorted.
  if total_frames <= 0 {
    return prev.points.clone();
  }
  let factor = (frame - prev.frame) as f64 / total_frames as f64;
  prev.points.iter().enumerate()
    .map(|(i, p0)| match next.points.get(i) {
      Some(p1) => p0 + (p1 - p0) * factor,
      None => *p0,
    })
    .collect()
}

// A polygon annotation that changes over the frames of a video.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mask {
  pub id: String,
  pub keyframes: Vec<Keyframe>,
}

impl Mask {
  pub fn new(id: &str, points: Vec<Vector2d>) -> Mask {
    Mask {
      id: id.to_string(),
      keyframes: vec![Keyframe { frame: 0, points }],
    }
  }

  pub fn vertex_count(&self) -> usize {
    self.keyframes.first().map(|k| k.points.len()).unwrap_or(0)
  }

  // Inserts a keyframe keeping the list sorted. A keyframe already on the same
  // frame is replaced.
  pub fn add_keyframe(&mut self, frame: i64, points: Vec<Vector2d>) -> Result<()> {
    if !self.keyframes.is_empty() && points.len() != self.vertex_count() {
      bail!(
        "Mask {} has {} vertices, the new keyframe has {}.",
        self.id, self.vertex_count(), points.len(),
      );
    }
    let keyframe = Keyframe { frame, points };
    match self.keyframes.binary_search_by_key(&frame, |k| k.frame) {
      Ok(i) => self.keyframes[i] = keyframe,
      Err(i) => self.keyframes.insert(i, keyframe),
    }
    Ok(())
  }

  // Replaces all keyframes but the first with one keyframe per tracked frame.
  // Frames where any vertex was lost are skipped. Returns the number of
  // keyframes added.
  pub fn apply_trajectory(&mut self, trajectory: &Trajectory) -> Result<usize> {
    let first = self.keyframes.first().cloned()
      .ok_or(anyhow!("Mask {} has no keyframes to track from.", self.id))?;
    let mut keyframes = vec![first];
    for (frame, positions) in trajectory.iter().enumerate().skip(1) {
      let points: Option<Vec<Vector2d>> = positions.iter().copied().collect();
      let points = match points {
        Some(points) => points,
        None => continue,
      };
      if points.len() != keyframes[0].points.len() {
        bail!("Trajectory has {} vertices, mask {} has {}.", points.len(), self.id, keyframes[0].points.len());
      }
      keyframes.push(Keyframe { frame: frame as i64, points });
    }
    keyframes.sort_by_key(|k| k.frame);
    keyframes.dedup_by_key(|k| k.frame);
    let added = keyframes.len() - 1;
    self.keyframes = keyframes;
    Ok(added)
  }

  pub fn interpolate(&self, frame: i64) -> Vec<Vector2d> {
    interpolate(&self.keyframes, frame)
  }
}

// Mask shared between threads, eg a tracking worker replacing keyframes
// while another thread reads them.
#[derive(Clone, Debug)]
pub struct SharedMask(Arc<RwLock<Mask>>);

impl SharedMask {
  pub fn new(mask: Mask) -> SharedMask {
    SharedMask(Arc::new(RwLock::new(mask)))
  }

  pub fn apply_trajectory(&self, trajectory: &Trajectory) -> Result<usize> {
    let mut mask = self.0.write().map_err(|_| anyhow!("Mask lock poisoned."))?;
    mask.apply_trajectory(trajectory)
  }

  pub fn snapshot(&self) -> Result<Mask> {
    let mask = self.0.read().map_err(|_| anyhow!("Mask lock poisoned."))?;
    Ok(mask.clone())
  }
}
