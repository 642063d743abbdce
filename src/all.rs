// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  consensus::*,
  frame::*,
  image::*,
  keyframe::*,
  kalman_filter::*,
  optical_flow::*,
  parameters::*,
  project::*,
  pyramid::*,
  sample::*,
  tracker::*,
  types::*,
  util::*,
  video::*,
};

pub use {
  std::{
    io::{Read, Write},
    ops::Index,
    path::{Path, PathBuf},
    sync::{
      atomic::{AtomicBool, AtomicUsize, Ordering},
      Arc, RwLock,
    },
  },
  log::{debug, info, trace, warn, LevelFilter},
  nalgebra::DMatrix,
  serde::{Deserialize, Serialize},
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
};
