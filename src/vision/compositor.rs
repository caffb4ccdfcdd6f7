/// 可見性合成
///
/// 每幀把相關觀察者的視野多邊形聯集成「可見區域」，
/// 光源多邊形聯集成「照明區域」，再扣掉黑暗多邊形。
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::comp::emitter::{CompositeRule, Emitter, ViewerId};
use crate::vision::geometry_utils::Point;
use crate::vision::polygon::Polygon;
use crate::vision::quadtree::Bounds;

/// 環境光參數
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    /// 場景黑暗程度 0.0（白天）~ 1.0（全黑）
    pub darkness: f64,
    /// 黑暗程度低於此值時整個場景視為被照亮
    pub global_light_threshold: f64,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            darkness: 0.0,
            global_light_threshold: 0.25,
        }
    }
}

impl AmbientLight {
    pub fn new(darkness: f64) -> Self {
        Self {
            darkness: darkness.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// 環境光強度
    pub fn light_level(&self) -> f64 {
        1.0 - self.darkness.clamp(0.0, 1.0)
    }

    pub fn globally_lit(&self) -> bool {
        self.darkness < self.global_light_threshold
    }
}

/// 多邊形聯集再扣除的區域
#[derive(Debug, Clone, Default)]
pub struct Region {
    include: Vec<Arc<Polygon>>,
    exclude: Vec<Arc<Polygon>>,
}

impl Region {
    pub fn contains(&self, point: Point) -> bool {
        self.include.iter().any(|p| p.contains_point(point))
            && !self.exclude.iter().any(|p| p.contains_point(point))
    }

    /// 點是否落在被扣除的多邊形內
    pub fn excludes(&self, point: Point) -> bool {
        self.exclude.iter().any(|p| p.contains_point(point))
    }

    pub fn is_empty(&self) -> bool {
        self.include.iter().all(|p| p.is_empty())
    }

    pub fn polygons(&self) -> &[Arc<Polygon>] {
        &self.include
    }

    pub fn subtracted(&self) -> &[Arc<Polygon>] {
        &self.exclude
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.include
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.bounds)
            .reduce(|a, b| a.union(&b))
    }
}

/// 一幀的合成結果
#[derive(Debug, Clone, Default)]
pub struct VisibilityState {
    pub visible: Region,
    pub illuminated: Region,
    pub ambient: AmbientLight,
}

impl VisibilityState {
    pub fn is_visible(&self, point: Point) -> bool {
        self.visible.contains(point)
    }

    /// 點是否被照亮：黑暗區域優先，其次全域光，最後是光源照明區域
    pub fn is_illuminated(&self, point: Point) -> bool {
        if self.illuminated.excludes(point) {
            return false;
        }
        self.ambient.globally_lit() || self.illuminated.contains(point)
    }
}

pub struct Compositor;

impl Compositor {
    /// 依輸入順序合成；呼叫端需以固定順序（發射源 id）提供，保證結果可重現
    pub fn composite<'a>(
        emitters: impl IntoIterator<Item = &'a Emitter>,
        viewers: &HashSet<ViewerId>,
        ambient: AmbientLight,
    ) -> VisibilityState {
        let mut state = VisibilityState {
            ambient,
            ..Default::default()
        };

        for emitter in emitters {
            if !emitter.active || emitter.polygon.is_empty() {
                continue;
            }
            match emitter.profile().composite {
                CompositeRule::Visible => {
                    let relevant = viewers.is_empty()
                        || emitter.config.viewer.map_or(false, |v| viewers.contains(&v));
                    if relevant {
                        state.visible.include.push(emitter.polygon.clone());
                    }
                }
                CompositeRule::Illuminate => state.illuminated.include.push(emitter.polygon.clone()),
                CompositeRule::Subtract => state.illuminated.exclude.push(emitter.polygon.clone()),
                CompositeRule::Standalone => {}
            }
        }

        log::debug!(
            "composited {} visible / {} light / {} darkness polygons",
            state.visible.include.len(),
            state.illuminated.include.len(),
            state.illuminated.exclude.len()
        );
        state
    }
}
