use crate::all::*;

use std::process::{Child, ChildStdout, Command, Stdio};

// Sequential supplier of decoded grayscale frames.
pub trait FrameSource {
  // End of stream is signaled by `Ok(None)`.
  fn next_frame(&mut self) -> Result<Option<&Image>>;

  // Number of frames the source will produce from its start, if known.
  fn frame_count(&self) -> Option<usize>;
}

pub struct VideoInput {
  child: Child,
  child_stdout: ChildStdout,
  video_frame: Image,
  frame_count: Option<usize>,
}

pub struct VideoInfo {
  pub width: usize,
  pub height: usize,
  pub frame_count: Option<usize>,
}

impl VideoInput {
  pub fn new(path: &Path) -> Result<VideoInput> {
    VideoInput::open_at(path, 0)
  }

  // Starts decoding at frame index `start`.
  pub fn open_at(path: &Path, start: usize) -> Result<VideoInput> {
    let info = probe(path)?;
    let path_str = path.to_str().ok_or(anyhow!("Failed to parse video path."))?;
    let mut args: Vec<String> = vec!["-v".into(), "error".into(), "-i".into(), path_str.into()];
    if start > 0 {
      args.push("-vf".into());
      args.push(format!("select=gte(n\\,{})", start));
    }
    args.extend(["-f", "rawvideo", "-vcodec", "rawvideo", "-vsync", "0", "-pix_fmt", "gray", "-"]
      .iter().map(|s| s.to_string()));
    let mut child = Command::new("ffmpeg").args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .spawn()
      .context("Failed to start ffmpeg.")?;
    let child_stdout = child.stdout.take().ok_or(anyhow!("ffmpeg has no stdout."))?;
    debug!("Decoding {} ({}x{}) from frame {}.", path.display(), info.width, info.height, start);
    Ok(VideoInput {
      child,
      child_stdout,
      video_frame: Image::new(info.width, info.height),
      frame_count: info.frame_count.map(|n| n.saturating_sub(start)),
    })
  }
}

impl FrameSource for VideoInput {
  fn next_frame(&mut self) -> Result<Option<&Image>> {
    match self.child_stdout.read_exact(&mut self.video_frame.data) {
      Ok(()) => Ok(Some(&self.video_frame)),
      Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
      Err(err) => Err(err).context("Reading bytes from video input failed."),
    }
  }

  fn frame_count(&self) -> Option<usize> {
    self.frame_count
  }
}

impl Drop for VideoInput {
  fn drop(&mut self) {
    // The decoder may still be writing if we stopped early.
    let _ = self.child.kill();
    let _ = self.child.wait();
  }
}

pub fn probe(path: &Path) -> Result<VideoInfo> {
  if !path.exists() {
    bail!("Video file {} does not exist.", path.display());
  }
  let output = Command::new("ffprobe")
    .args(["-v", "error", "-select_streams", "v:0", "-count_packets",
      "-show_entries", "stream=width,height,nb_read_packets", "-of", "csv=p=0"])
    .arg(path)
    .output()
    .context("Failed to run ffprobe.")?;
  if !output.status.success() {
    bail!("ffprobe failed for {}.", path.display());
  }
  parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    .context(format!("Unexpected ffprobe output for {}.", path.display()))
}

fn parse_probe_output(s: &str) -> Result<VideoInfo> {
  let line = s.lines().next().ok_or(anyhow!("Empty output."))?;
  let fields: Vec<&str> = line.trim().split(',').collect();
  if fields.len() < 2 {
    bail!("Expected width and height, got `{}`.", line);
  }
  let width: usize = fields[0].parse()?;
  let height: usize = fields[1].parse()?;
  if width == 0 || height == 0 {
    bail!("Video has zero size.");
  }
  let frame_count = fields.get(2).and_then(|n| n.parse().ok());
  Ok(VideoInfo { width, height, frame_count })
}

// Frames already decoded into memory.
#[cfg(test)]
pub struct ImageSequence {
  images: Vec<Image>,
  next: usize,
}

#[cfg(test)]
impl ImageSequence {
  pub fn new(images: Vec<Image>) -> ImageSequence {
    ImageSequence { images, next: 0 }
  }
}

#[cfg(test)]
impl FrameSource for ImageSequence {
  fn next_frame(&mut self) -> Result<Option<&Image>> {
    let image = self.images.get(self.next);
    if image.is_some() {
      self.next += 1;
    }
    Ok(image)
  }

  fn frame_count(&self) -> Option<usize> {
    Some(self.images.len() - self.next)
  }
}
