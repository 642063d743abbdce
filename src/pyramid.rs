use crate::all::*;

const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];

// Successively halved versions of an image, not including the image itself.
pub struct Pyramid {
  pub levels: Vec<Image>,
}

impl Pyramid {
  pub fn new(image: &Image, level_count: usize) -> Pyramid {
    let mut levels: Vec<Image> = Vec::with_capacity(level_count);
    for level_ind in 0..level_count {
      let parent = if level_ind > 0 { &levels[level_ind - 1] } else { image };
      if parent.width < 2 && parent.height < 2 { break }
      let child = downscale(parent);
      levels.push(child);
    }
    Pyramid { levels }
  }
}

// Gaussian blur followed by dropping every other row and column,
// like `cv::pyrDown()`. Borders are replicated.
fn downscale(parent: &Image) -> Image {
  let w = (parent.width + 1) / 2;
  let h = (parent.height + 1) / 2;
  // Horizontal pass, only at the even columns that survive.
  let mut tmp = vec![0u32; w * parent.height];
  for y in 0..parent.height {
    for x in 0..w {
      let mut sum = 0;
      for (i, k) in KERNEL.iter().enumerate() {
        sum += k * parent.value_clamped(2 * x as i64 + i as i64 - 2, y as i64) as u32;
      }
      tmp[y * w + x] = sum;
    }
  }
  let mut child = Image::new(w, h);
  for y in 0..h {
    for x in 0..w {
      let mut sum = 0;
      for (i, k) in KERNEL.iter().enumerate() {
        let sy = (2 * y as i64 + i as i64 - 2).clamp(0, parent.height as i64 - 1) as usize;
        sum += k * tmp[sy * w + x];
      }
      // Kernel weights sum to 16 in each direction. Round to nearest.
      child.set_value(x, y, ((sum + 128) / 256) as u8);
    }
  }
  child
}
