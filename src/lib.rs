/// Sightline
///
/// 2D 視野引擎：牆壁索引、放射掃描產生可見多邊形、光源與視野合成、
/// 偵測判定以及戰爭迷霧探索記錄。

pub mod comp;
pub mod config;
pub mod error;
pub mod state;
pub mod util;
pub mod vision;

pub use crate::comp::*;
pub use crate::error::{VisionError, VisionResult};
pub use crate::state::{SceneSession, TickReport};
pub use crate::vision::*;
