mod all;
mod consensus;
mod frame;
mod image;
mod kalman_filter;
mod keyframe;
mod optical_flow;
mod parameters;
mod project;
mod pyramid;
mod sample;
mod tracker;
mod types;
mod util;
mod video;

use all::*;

use clap::{Parser, Subcommand};

use std::time::Duration;

#[derive(Parser)]
#[clap(about = "Track polygon masks through a video and interpolate their keyframes.")]
struct Args {
  #[clap(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create a mask from a polygon on frame 0 and print its id.
  NewMask {
    #[clap(long)]
    mask_file: PathBuf,
    /// Polygon vertices as `x,y;x,y;...`.
    #[clap(long)]
    points: String,
  },
  /// Set the polygon of a mask on one frame.
  AddKeyframe {
    #[clap(long)]
    mask_file: PathBuf,
    #[clap(long)]
    mask_id: String,
    #[clap(long, allow_hyphen_values = true)]
    frame: i64,
    #[clap(long)]
    points: String,
  },
  DeleteMask {
    #[clap(long)]
    mask_file: PathBuf,
    #[clap(long)]
    mask_id: String,
  },
  /// Track polygon vertices through a video.
  Track {
    #[clap(long)]
    video: PathBuf,
    /// Track the polygon of this mask and replace its keyframes with the result.
    #[clap(long)]
    mask_file: Option<PathBuf>,
    #[clap(long)]
    mask_id: Option<String>,
    /// Track these points instead of a mask.
    #[clap(long)]
    points: Option<String>,
    /// Write the trajectory here instead of stdout.
    #[clap(long, short)]
    output: Option<PathBuf>,
    /// Read tracking parameters from a JSON file, ignoring the flags below.
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(flatten)]
    parameters: ParameterSet,
  },
  /// Print the polygon of a mask on one frame.
  Interpolate {
    #[clap(long)]
    mask_file: PathBuf,
    #[clap(long)]
    mask_id: String,
    #[clap(long, allow_hyphen_values = true)]
    frame: i64,
  },
}

fn handle_error(err: &anyhow::Error) {
  for (i, e) in err.chain().enumerate() {
    println!("  {}: {}", i + 1, e);
  }
}

fn main() {
  env_logger::Builder::new()
    .filter_level(LevelFilter::Info)
    .parse_default_env()
    .format(util::format_log)
    .init();

  if let Err(err) = run() {
    handle_error(&err);
    std::process::exit(1);
  }
}

fn run() -> Result<()> {
  let args = Args::parse();
  match args.command {
    Command::NewMask { mask_file, points } => {
      let mut masks = MaskFile::load_or_default(&mask_file)?;
      let id = masks.add_mask(parse_points(&points)?)?;
      masks.save(&mask_file)?;
      println!("{}", id);
    },
    Command::AddKeyframe { mask_file, mask_id, frame, points } => {
      let mut masks = MaskFile::load(&mask_file)?;
      masks.mask_mut(&mask_id)?.add_keyframe(frame, parse_points(&points)?)?;
      masks.save(&mask_file)?;
    },
    Command::DeleteMask { mask_file, mask_id } => {
      let mut masks = MaskFile::load(&mask_file)?;
      masks.delete_mask(&mask_id)?;
      masks.save(&mask_file)?;
    },
    Command::Track { video, mask_file, mask_id, points, output, config, parameters } => {
      let parameters = match config {
        Some(path) => {
          let s = std::fs::read_to_string(&path)
            .context(format!("Failed to read file {}.", path.display()))?;
          ParameterSet::from_json(&s)?
        },
        None => parameters,
      };
      parameters.validate()?;
      let mask = match (&mask_file, &mask_id) {
        (Some(path), Some(id)) => Some(MaskFile::load(path)?.mask(id)?.clone()),
        (None, None) => None,
        _ => bail!("--mask-file and --mask-id must be given together."),
      };
      let initial_points = match (&mask, &points) {
        (Some(mask), None) => mask.keyframes.first()
          .ok_or(anyhow!("Mask {} has no keyframes.", mask.id))?
          .points.clone(),
        (None, Some(points)) => parse_points(points)?,
        (Some(_), Some(_)) => bail!("Give either a mask or points to track, not both."),
        (None, None) => bail!("Either a mask or points to track are required."),
      };
      let shared_mask = mask.map(SharedMask::new);
      let trajectory = run_tracking(video, initial_points, parameters, shared_mask.clone())?;

      if let (Some(path), Some(shared_mask)) = (mask_file, shared_mask) {
        let mut masks = MaskFile::load(&path)?;
        masks.replace_mask(shared_mask.snapshot()?)?;
        masks.save(&path)?;
      }
      let s = serde_json::to_string(&trajectory)?;
      match output {
        Some(path) => std::fs::write(&path, s)
          .context(format!("Failed to write file {}.", path.display()))?,
        None => println!("{}", s),
      }
    },
    Command::Interpolate { mask_file, mask_id, frame } => {
      let masks = MaskFile::load(&mask_file)?;
      let points = masks.mask(&mask_id)?.interpolate(frame);
      println!("{}", serde_json::to_string(&points)?);
    },
  }
  Ok(())
}

// Tracks on a worker thread and reports progress from this one. The worker
// replaces the keyframes of `mask` with the result.
fn run_tracking(
  video: PathBuf,
  initial_points: Vec<Vector2d>,
  parameters: ParameterSet,
  mask: Option<SharedMask>,
) -> Result<Trajectory> {
  let control = Arc::new(TrackControl::default());
  let worker = {
    let control = control.clone();
    std::thread::spawn(move || -> Result<Trajectory> {
      let trajectory = track_video(&video, &initial_points, &parameters, &control)?;
      if let Some(mask) = mask {
        let added = mask.apply_trajectory(&trajectory)?;
        info!("Replaced keyframes of the mask, {} added.", added);
      }
      Ok(trajectory)
    })
  };
  let mut reported = 0;
  while !worker.is_finished() {
    std::thread::sleep(Duration::from_millis(500));
    let processed = control.processed.load(Ordering::Relaxed);
    if processed != reported {
      reported = processed;
      match control.total.load(Ordering::Relaxed) {
        0 => info!("Tracked {} frames.", processed),
        total => info!("Tracked {}/{} frames.", processed, total),
      }
    }
  }
  worker.join().map_err(|_| anyhow!("Tracking thread panicked."))?
}
