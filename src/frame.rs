use crate::all::*;

// Data derived from a single decoded video frame for the optical flow.
pub struct Frame {
  pub image: Image,
  pub pyramid: Pyramid,
}

pub struct Level<'a> {
  pub data: &'a[u8],
  pub width: usize,
  pub height: usize,
}

impl Frame {
  pub fn new(image: Image, level_count: usize) -> Frame {
    Frame {
      pyramid: Pyramid::new(&image, level_count),
      image,
    }
  }

  // Levels above those the pyramid could build (tiny images) are `None`.
  pub fn get_level(&self, level: usize) -> Option<Level> {
    if level == 0 {
      Some(Level {
        data: &self.image.data,
        width: self.image.width,
        height: self.image.height,
      })
    }
    else {
      let image = self.pyramid.levels.get(level - 1)?;
      Some(Level {
        data: &image.data,
        width: image.width,
        height: image.height,
      })
    }
  }
}
