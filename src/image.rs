use crate::all::*;

// Row-major grayscale image storage.
// Could also have used nalebgra::DMatrix, but the added complexity
// only seems to help with algorithms like the optical flow.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
}

impl Image {
  pub fn new(width: usize, height: usize) -> Image {
    Image {
      data: vec![0; width * height],
      width,
      height,
    }
  }

  // True if `p` is inside the image in continuous pixel coordinates, where
  // (0, 0) is the center of the top-left pixel.
  pub fn contains(&self, p: &Vector2d) -> bool {
    p[0] >= 0. && p[1] >= 0.
      && p[0] <= (self.width as f64 - 1.)
      && p[1] <= (self.height as f64 - 1.)
  }

  #[inline(always)]
  pub fn value(&self, x: usize, y: usize) -> u8 {
    self.data[y * self.width + x]
  }

  // Clamps coordinates to the image, ie replicates border pixels.
  #[inline(always)]
  pub fn value_clamped(&self, x: i64, y: i64) -> u8 {
    let x = x.clamp(0, self.width as i64 - 1) as usize;
    let y = y.clamp(0, self.height as i64 - 1) as usize;
    self.value(x, y)
  }

  #[inline(always)]
  pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
    self.data[y * self.width + x] = value;
  }
}

// Test image construction.
#[cfg(test)]
impl Image {
  pub fn from_data(width: usize, height: usize, data: Vec<u8>) -> Result<Image> {
    if data.len() != width * height {
      bail!("Image data has {} bytes, expected {}x{}.", data.len(), width, height);
    }
    Ok(Image { data, width, height })
  }

  pub fn get_sub_image(
    &self,
    ax: usize,
    ay: usize,
    width: usize,
    height: usize,
  ) -> Image {
    let mut image = Image::new(width, height);
    for y in 0..height {
      for x in 0..width {
        image.set_value(x, y, self.value(ax + x, ay + y));
      }
    }
    image
  }
}

// Element access in the manner of `image[y][x]`.
impl Index<usize> for Image {
  type Output = [u8];
  fn index(&self, y: usize) -> &Self::Output {
    &self.data[y * self.width .. (y + 1) * self.width]
  }
}
