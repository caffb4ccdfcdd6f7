/// 渲染輸出
///
/// 核心不做任何繪製，只把多邊形以點列表、包圍盒與世代交給渲染端。
/// 另外提供點陣格式，把可見、已探索、未探索合成成小地圖用的網格。
use serde::{Deserialize, Serialize};
use vek::Vec2;

use crate::comp::emitter::{Emitter, EmitterId, EmitterKind};
use crate::comp::fog::FogExploration;
use crate::vision::compositor::VisibilityState;
use crate::vision::quadtree::Bounds;

/// 單一發射源多邊形更新（向量格式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonUpdate {
    /// 輸出格式標識
    pub format_type: String,
    pub emitter: EmitterId,
    pub kind: EmitterKind,
    pub active: bool,
    pub points: Vec<Vec2<f64>>,
    pub bounds: Bounds,
    pub generation: u64,
    /// 計算失敗時附帶原因
    pub error: Option<String>,
}

impl PolygonUpdate {
    pub fn from_emitter(emitter: &Emitter) -> Self {
        Self {
            format_type: "vector".to_string(),
            emitter: emitter.id,
            kind: emitter.kind,
            active: emitter.active,
            points: emitter.polygon.points.clone(),
            bounds: emitter.polygon.bounds,
            generation: emitter.generation,
            error: emitter.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// 被移除的發射源：空點列表
    pub fn removed(id: EmitterId, kind: EmitterKind, generation: u64) -> Self {
        Self {
            format_type: "vector".to_string(),
            emitter: id,
            kind,
            active: false,
            points: Vec::new(),
            bounds: Bounds::new(Vec2::zero(), Vec2::zero()),
            generation,
            error: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 網格每格的可見性等級
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VisibilityLevel {
    /// 從未看過
    Unexplored,
    /// 看過但目前不可見（戰爭迷霧）
    Explored,
    /// 目前可見
    Visible,
}

/// 點陣視野輸出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridVisibilityOutput {
    pub format_type: String,
    pub cell_size: f64,
    pub origin: Vec2<f64>,
    pub width: usize,
    pub height: usize,
    /// [row][col]
    pub cells: Vec<Vec<VisibilityLevel>>,
}

impl GridVisibilityOutput {
    pub fn level_at(&self, col: usize, row: usize) -> Option<VisibilityLevel> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    pub fn count(&self, level: VisibilityLevel) -> usize {
        self.cells.iter().flatten().filter(|l| **l == level).count()
    }
}

pub struct RenderOutputGenerator {
    cell_size: f64,
}

impl RenderOutputGenerator {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
        }
    }

    /// 以格子中心判斷可見性；已探索資訊來自迷霧記錄
    pub fn generate_grid_output(
        &self,
        state: &VisibilityState,
        fog: Option<&FogExploration>,
        area: Bounds,
    ) -> GridVisibilityOutput {
        let width = (area.width() / self.cell_size).ceil().max(1.0) as usize;
        let height = (area.height() / self.cell_size).ceil().max(1.0) as usize;
        let mut cells = vec![vec![VisibilityLevel::Unexplored; width]; height];

        for (row, line) in cells.iter_mut().enumerate() {
            for (col, cell) in line.iter_mut().enumerate() {
                let center = Vec2::new(
                    area.min.x + (col as f64 + 0.5) * self.cell_size,
                    area.min.y + (row as f64 + 0.5) * self.cell_size,
                );
                *cell = if state.is_visible(center) {
                    VisibilityLevel::Visible
                } else if fog.map_or(false, |f| f.explored_at(center)) {
                    VisibilityLevel::Explored
                } else {
                    VisibilityLevel::Unexplored
                };
            }
        }

        GridVisibilityOutput {
            format_type: "grid".to_string(),
            cell_size: self.cell_size,
            origin: area.min,
            width,
            height,
            cells,
        }
    }
}

impl Default for RenderOutputGenerator {
    fn default() -> Self {
        Self::new(25.0)
    }
}

/// 可見性等級轉換為遮罩透明度
impl From<VisibilityLevel> for f32 {
    fn from(level: VisibilityLevel) -> f32 {
        match level {
            VisibilityLevel::Unexplored => 1.0,
            VisibilityLevel::Explored => 0.5,
            VisibilityLevel::Visible => 0.0,
        }
    }
}
