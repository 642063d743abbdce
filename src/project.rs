use crate::all::*;

// All masks of one annotated video.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskFile {
  pub masks: Vec<Mask>,
}

impl MaskFile {
  pub fn load(path: &Path) -> Result<MaskFile> {
    let s = std::fs::read_to_string(path)
      .context(format!("Failed to read file {}.", path.display()))?;
    let mask_file: MaskFile = serde_json::from_str(&s)
      .context(format!("Failed to parse {}.", path.display()))?;
    for mask in &mask_file.masks {
      if mask.keyframes.windows(2).any(|w| w[0].frame >= w[1].frame) {
        bail!("Keyframes of mask {} in {} are not sorted.", mask.id, path.display());
      }
    }
    Ok(mask_file)
  }

  // Like `load()`, but a missing file is an empty mask file.
  pub fn load_or_default(path: &Path) -> Result<MaskFile> {
    if path.exists() { MaskFile::load(path) } else { Ok(MaskFile::default()) }
  }

  pub fn save(&self, path: &Path) -> Result<()> {
    let s = serde_json::to_string_pretty(self)?;
    std::fs::write(path, s)
      .context(format!("Failed to write file {}.", path.display()))
  }

  pub fn mask(&self, id: &str) -> Result<&Mask> {
    self.masks.iter().find(|m| m.id == id)
      .ok_or(anyhow!("No mask with id {}.", id))
  }

  pub fn mask_mut(&mut self, id: &str) -> Result<&mut Mask> {
    self.masks.iter_mut().find(|m| m.id == id)
      .ok_or(anyhow!("No mask with id {}.", id))
  }

  // Replaces the mask with the same id.
  pub fn replace_mask(&mut self, mask: Mask) -> Result<()> {
    let existing = self.mask_mut(&mask.id)?;
    *existing = mask;
    Ok(())
  }

  // Adds a mask with its first keyframe at frame 0 and returns its id.
  pub fn add_mask(&mut self, points: Vec<Vector2d>) -> Result<String> {
    if points.is_empty() {
      bail!("A mask needs at least one vertex.");
    }
    let mut n = self.masks.len() + 1;
    while self.masks.iter().any(|m| m.id == format!("mask_{}", n)) {
      n += 1;
    }
    let id = format!("mask_{}", n);
    self.masks.push(Mask::new(&id, points));
    Ok(id)
  }

  pub fn delete_mask(&mut self, id: &str) -> Result<()> {
    let len = self.masks.len();
    self.masks.retain(|m| m.id != id);
    if self.masks.len() == len {
      bail!("No mask with id {}.", id);
    }
    Ok(())
  }
}
