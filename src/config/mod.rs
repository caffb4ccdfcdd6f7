/// 引擎設定
pub mod engine_config;

pub use engine_config::*;
