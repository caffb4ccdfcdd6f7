/// 場景會話初始化
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

use crate::config::SweepSetting;
use crate::error::VisionError;

pub struct SessionInitializer;

impl SessionInitializer {
    /// 建立掃描用執行緒池；threads 為 0 時使用 CPU 核心數
    pub fn create_thread_pool(setting: &SweepSetting) -> Result<Arc<ThreadPool>, VisionError> {
        let threads = if setting.threads == 0 { num_cpus::get() } else { setting.threads };
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("sweep-{}", i))
            .build()
            .map(Arc::new)
            .map_err(|e| VisionError::Configuration(format!("failed to create sweep thread pool: {}", e)))
    }

    /// 設定要求平行時才建立；失敗則退回單執行緒
    pub fn optional_thread_pool(setting: &SweepSetting) -> Option<Arc<ThreadPool>> {
        if !setting.parallel {
            return None;
        }
        match Self::create_thread_pool(setting) {
            Ok(pool) => Some(pool),
            Err(err) => {
                log::warn!("{}, sweeping on the calling thread", err);
                None
            }
        }
    }
}
