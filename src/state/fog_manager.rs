/// 戰爭迷霧持久化管理
///
/// 探索遮罩每幀更新，但只在間隔到期時寫回儲存層。
/// 讀取失敗一律從未探索開始，寫入失敗保留 dirty 等下次存檔時機重試。
use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::comp::emitter::Emitter;
use crate::comp::fog::FogExploration;
use crate::config::FogSetting;
use crate::error::VisionError;
use crate::vision::quadtree::Bounds;

/// 外部儲存層介面
pub trait FogStore: Send + Sync {
    /// 尚無記錄時回傳 Ok(None)
    fn load_fog_blob(&self, scene_id: &str, user_id: Option<&str>) -> Result<Option<Vec<u8>>, VisionError>;
    fn save_fog_blob(&self, scene_id: &str, user_id: Option<&str>, blob: &[u8]) -> Result<(), VisionError>;
}

/// 記憶體內的儲存層
#[derive(Default)]
pub struct MemoryFogStore {
    blobs: Mutex<HashMap<(String, Option<String>), Vec<u8>>>,
    saves: Mutex<usize>,
}

impl MemoryFogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, scene_id: &str, user_id: Option<&str>, blob: Vec<u8>) {
        self.blobs
            .lock()
            .insert((scene_id.to_string(), user_id.map(str::to_string)), blob);
    }

    pub fn get_raw(&self, scene_id: &str, user_id: Option<&str>) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .get(&(scene_id.to_string(), user_id.map(str::to_string)))
            .cloned()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl FogStore for MemoryFogStore {
    fn load_fog_blob(&self, scene_id: &str, user_id: Option<&str>) -> Result<Option<Vec<u8>>, VisionError> {
        Ok(self.get_raw(scene_id, user_id))
    }

    fn save_fog_blob(&self, scene_id: &str, user_id: Option<&str>, blob: &[u8]) -> Result<(), VisionError> {
        self.insert_raw(scene_id, user_id, blob.to_vec());
        *self.saves.lock() += 1;
        Ok(())
    }
}

pub struct FogManager {
    exploration: FogExploration,
    store: Arc<dyn FogStore>,
    save_interval: Duration,
    last_attempt: Option<DateTime<Utc>>,
    dirty: bool,
}

impl FogManager {
    /// 讀取既有記錄；缺少或損毀時從未探索開始，並回傳讀取時遇到的錯誤
    pub fn load(
        store: Arc<dyn FogStore>,
        scene_id: &str,
        user_id: Option<&str>,
        scene_bounds: Bounds,
        setting: &FogSetting,
    ) -> (Self, Option<VisionError>) {
        let fresh = || FogExploration::new(scene_id, user_id, scene_bounds, setting.cell_size);
        let (exploration, error) = match store.load_fog_blob(scene_id, user_id) {
            Ok(Some(blob)) => {
                match FogExploration::from_blob(scene_id, user_id, scene_bounds, setting.cell_size, &blob) {
                    Ok(fog) => (fog, None),
                    Err(err) => {
                        log::warn!("fog record for scene {} unreadable, starting unexplored: {}", scene_id, err);
                        (fresh(), Some(err))
                    }
                }
            }
            Ok(None) => (fresh(), None),
            Err(err) => {
                log::warn!("fog load failed for scene {}, starting unexplored: {}", scene_id, err);
                (fresh(), Some(err))
            }
        };
        let manager = Self {
            exploration,
            store,
            save_interval: Duration::milliseconds(setting.save_interval_ms.max(0)),
            last_attempt: None,
            dirty: false,
        };
        (manager, error)
    }

    pub fn exploration(&self) -> &FogExploration {
        &self.exploration
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn explore(&mut self, emitter: &Emitter) -> usize {
        let newly = self.exploration.explore(emitter);
        if newly > 0 {
            self.dirty = true;
        }
        newly
    }

    pub fn reset(&mut self) {
        self.exploration.reset();
        self.dirty = true;
    }

    /// 有變更且距上次嘗試已超過間隔時才存檔；回傳是否成功寫入
    pub fn maybe_persist(&mut self, now: DateTime<Utc>) -> Result<bool, VisionError> {
        if !self.dirty {
            return Ok(false);
        }
        if let Some(last) = self.last_attempt {
            if now - last < self.save_interval {
                return Ok(false);
            }
        }
        self.persist(now)
    }

    /// 無視間隔立即存檔（場景卸載時）
    pub fn flush(&mut self, now: DateTime<Utc>) -> Result<bool, VisionError> {
        if !self.dirty {
            return Ok(false);
        }
        self.persist(now)
    }

    fn persist(&mut self, now: DateTime<Utc>) -> Result<bool, VisionError> {
        self.last_attempt = Some(now);
        let blob = self.exploration.to_blob()?;
        self.store.save_fog_blob(
            &self.exploration.scene_id,
            self.exploration.user_id.as_deref(),
            &blob,
        )?;
        self.dirty = false;
        log::debug!(
            "saved fog for scene {} ({} cells explored, version {})",
            self.exploration.scene_id,
            self.exploration.explored_count(),
            self.exploration.version
        );
        Ok(true)
    }
}
