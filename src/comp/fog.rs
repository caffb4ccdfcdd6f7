/// 戰爭迷霧探索記錄
///
/// 以固定格子大小的位元遮罩記錄場景中曾經看過的區域。
/// 遮罩只增不減，除非明確呼叫 `reset`。
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vek::Vec2;

use crate::comp::emitter::{Emitter, EmitterKind};
use crate::error::VisionError;
use crate::vision::geometry_utils::Point;
use crate::vision::polygon::Polygon;
use crate::vision::quadtree::Bounds;

/// 舊版格式：未壓縮 JSON，位元打包
pub const FOG_FORMAT_LEGACY: u8 = 1;
/// 目前格式：lz4 壓縮 JSON，遮罩以 run-length 編碼
pub const FOG_FORMAT_CURRENT: u8 = 2;

const BITS: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct FogExploration {
    pub scene_id: String,
    pub user_id: Option<String>,
    /// 網格左下角
    pub origin: Point,
    pub cell_size: f64,
    pub width: usize,
    pub height: usize,
    mask: Vec<u64>,
    explored_count: usize,
    /// 每次遮罩有新增時遞增
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FogBlobPayload {
    width: usize,
    height: usize,
    cell_size: f64,
    origin: [f64; 2],
    version: u64,
    updated_at: DateTime<Utc>,
    /// 交替的連續長度，從未探索開始
    runs: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LegacyFogPayload {
    width: usize,
    height: usize,
    /// 每 byte 8 格，低位元在前
    bits: Vec<u8>,
}

impl FogExploration {
    pub fn new(scene_id: &str, user_id: Option<&str>, scene_bounds: Bounds, cell_size: f64) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        let width = (scene_bounds.width() / cell_size).ceil().max(1.0) as usize;
        let height = (scene_bounds.height() / cell_size).ceil().max(1.0) as usize;
        Self {
            scene_id: scene_id.to_string(),
            user_id: user_id.map(str::to_string),
            origin: scene_bounds.min,
            cell_size,
            width,
            height,
            mask: vec![0; (width * height + BITS - 1) / BITS],
            explored_count: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn explored_count(&self) -> usize {
        self.explored_count
    }

    pub fn is_explored(&self, col: usize, row: usize) -> bool {
        if col >= self.width || row >= self.height {
            return false;
        }
        self.bit(row * self.width + col)
    }

    /// 世界座標是否已探索
    pub fn explored_at(&self, point: Point) -> bool {
        let col = ((point.x - self.origin.x) / self.cell_size).floor();
        let row = ((point.y - self.origin.y) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 {
            return false;
        }
        self.is_explored(col as usize, row as usize)
    }

    fn bit(&self, idx: usize) -> bool {
        self.mask[idx / BITS] & (1u64 << (idx % BITS)) != 0
    }

    /// 設定位元，回傳是否為新探索
    fn set_bit(&mut self, idx: usize) -> bool {
        let word = &mut self.mask[idx / BITS];
        let flag = 1u64 << (idx % BITS);
        if *word & flag != 0 {
            return false;
        }
        *word |= flag;
        self.explored_count += 1;
        true
    }

    /// 把多邊形聯集進探索遮罩，回傳新探索的格數
    pub fn explore_polygon(&mut self, polygon: &Polygon) -> usize {
        let cells = polygon.rasterize(self.origin, self.cell_size, self.width, self.height);
        let mut newly = 0;
        for (col, row) in cells {
            if self.set_bit(row * self.width + col) {
                newly += 1;
            }
        }
        if newly > 0 {
            self.version += 1;
            self.updated_at = Utc::now();
        }
        newly
    }

    /// 把視野發射源目前的多邊形聯集進遮罩；非視野發射源不影響探索
    pub fn explore(&mut self, emitter: &Emitter) -> usize {
        if emitter.kind != EmitterKind::Vision || !emitter.active {
            return 0;
        }
        self.explore_polygon(&emitter.polygon)
    }

    /// 是否包含另一份記錄探索過的所有格子
    pub fn is_superset_of(&self, other: &FogExploration) -> bool {
        self.mask.len() == other.mask.len()
            && self.mask.iter().zip(&other.mask).all(|(a, b)| a & b == *b)
    }

    /// 明確重置為完全未探索
    pub fn reset(&mut self) {
        self.mask.iter_mut().for_each(|w| *w = 0);
        self.explored_count = 0;
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn runs(&self) -> Vec<u32> {
        let mut runs = Vec::new();
        let mut current = false;
        let mut length: u32 = 0;
        for idx in 0..self.cell_count() {
            let bit = self.bit(idx);
            if bit != current {
                runs.push(length);
                current = bit;
                length = 0;
            }
            length += 1;
        }
        runs.push(length);
        runs
    }

    /// 編碼成目前格式的存檔資料
    pub fn to_blob(&self) -> Result<Vec<u8>, VisionError> {
        let payload = FogBlobPayload {
            width: self.width,
            height: self.height,
            cell_size: self.cell_size,
            origin: [self.origin.x, self.origin.y],
            version: self.version,
            updated_at: self.updated_at,
            runs: self.runs(),
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| VisionError::Persistence(format!("encode fog payload: {}", e)))?;
        let mut blob = Vec::with_capacity(json.len() / 2 + 1);
        blob.push(FOG_FORMAT_CURRENT);
        blob.extend(lz4_flex::compress_prepend_size(&json));
        Ok(blob)
    }

    /// 從存檔資料還原；格式不明、資料損毀或網格尺寸不符都回傳 PersistenceError
    pub fn from_blob(
        scene_id: &str,
        user_id: Option<&str>,
        scene_bounds: Bounds,
        cell_size: f64,
        blob: &[u8],
    ) -> Result<Self, VisionError> {
        let mut fog = Self::new(scene_id, user_id, scene_bounds, cell_size);
        let (&tag, body) = blob
            .split_first()
            .ok_or_else(|| VisionError::Persistence("empty fog blob".to_string()))?;

        match tag {
            FOG_FORMAT_CURRENT => {
                let json = lz4_flex::decompress_size_prepended(body)
                    .map_err(|e| VisionError::Persistence(format!("decompress fog blob: {}", e)))?;
                let payload: FogBlobPayload = serde_json::from_slice(&json)
                    .map_err(|e| VisionError::Persistence(format!("decode fog blob: {}", e)))?;
                fog.check_shape(payload.width, payload.height)?;
                if (payload.cell_size - fog.cell_size).abs() > f64::EPSILON
                    || Vec2::from(payload.origin) != fog.origin
                {
                    return Err(VisionError::Persistence("fog blob grid does not match scene".to_string()));
                }
                fog.apply_runs(&payload.runs)?;
                fog.version = payload.version;
                fog.updated_at = payload.updated_at;
            }
            FOG_FORMAT_LEGACY => {
                let payload: LegacyFogPayload = serde_json::from_slice(body)
                    .map_err(|e| VisionError::Persistence(format!("decode legacy fog blob: {}", e)))?;
                fog.check_shape(payload.width, payload.height)?;
                if payload.bits.len() * 8 < fog.cell_count() {
                    return Err(VisionError::Persistence("legacy fog blob truncated".to_string()));
                }
                for idx in 0..fog.cell_count() {
                    if payload.bits[idx / 8] & (1 << (idx % 8)) != 0 {
                        fog.set_bit(idx);
                    }
                }
                fog.version = 1;
                log::info!("migrated legacy fog blob for scene {}", scene_id);
            }
            other => {
                return Err(VisionError::Persistence(format!("unknown fog blob format tag {}", other)));
            }
        }
        Ok(fog)
    }

    fn check_shape(&self, width: usize, height: usize) -> Result<(), VisionError> {
        if width != self.width || height != self.height {
            return Err(VisionError::Persistence(format!(
                "fog blob is {}x{}, scene grid is {}x{}",
                width, height, self.width, self.height
            )));
        }
        Ok(())
    }

    fn apply_runs(&mut self, runs: &[u32]) -> Result<(), VisionError> {
        let total: u64 = runs.iter().map(|r| *r as u64).sum();
        if total != self.cell_count() as u64 {
            return Err(VisionError::Persistence(format!(
                "fog runs cover {} cells, expected {}", total, self.cell_count()
            )));
        }
        let mut idx = 0;
        for (i, run) in runs.iter().enumerate() {
            let explored = i % 2 == 1;
            for _ in 0..*run {
                if explored {
                    self.set_bit(idx);
                }
                idx += 1;
            }
        }
        Ok(())
    }

    /// 舊版格式編碼，僅供遷移測試
    #[cfg(test)]
    pub(crate) fn to_legacy_blob(&self) -> Vec<u8> {
        let mut bits = vec![0u8; (self.cell_count() + 7) / 8];
        for idx in 0..self.cell_count() {
            if self.bit(idx) {
                bits[idx / 8] |= 1 << (idx % 8);
            }
        }
        let payload = LegacyFogPayload {
            width: self.width,
            height: self.height,
            bits,
        };
        let mut blob = vec![FOG_FORMAT_LEGACY];
        blob.extend(serde_json::to_vec(&payload).unwrap_or_default());
        blob
    }
}
