/// 發射源（光源、視野、聲音、移動、黑暗）
///
/// 五種發射源共用同一個結構，行為差異由每種類型的感知設定表決定：
/// 受哪種感知的牆限制、如何合成、是否受環境光影響。
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::comp::edge::Sense;
use crate::config::SweepSetting;
use crate::error::VisionError;
use crate::vision::geometry_utils::{GeometryUtils, Point};
use crate::vision::polygon::Polygon;
use crate::vision::quadtree::Bounds;
use crate::vision::sweep::SweepConfig;

pub type EmitterId = u64;
/// 擁有視野的玩家/觀察者
pub type ViewerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKind {
    Light,
    Vision,
    Sound,
    Movement,
    Darkness,
}

/// 多邊形合成規則
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeRule {
    /// 併入可見區域
    Visible,
    /// 併入照明區域
    Illuminate,
    /// 從照明區域扣除
    Subtract,
    /// 不參與合成（供偵測使用）
    Standalone,
}

/// 每種發射源的感知設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseProfile {
    pub kind: EmitterKind,
    /// 決定哪些牆會限制此發射源
    pub sense: Sense,
    pub composite: CompositeRule,
    /// 環境光改變時需要重算
    pub ambient_sensitive: bool,
}

const SENSE_PROFILES: [SenseProfile; 5] = [
    SenseProfile { kind: EmitterKind::Light, sense: Sense::Light, composite: CompositeRule::Illuminate, ambient_sensitive: true },
    SenseProfile { kind: EmitterKind::Vision, sense: Sense::Sight, composite: CompositeRule::Visible, ambient_sensitive: false },
    SenseProfile { kind: EmitterKind::Sound, sense: Sense::Sound, composite: CompositeRule::Standalone, ambient_sensitive: false },
    SenseProfile { kind: EmitterKind::Movement, sense: Sense::Move, composite: CompositeRule::Standalone, ambient_sensitive: false },
    SenseProfile { kind: EmitterKind::Darkness, sense: Sense::Light, composite: CompositeRule::Subtract, ambient_sensitive: true },
];

impl EmitterKind {
    pub fn profile(self) -> &'static SenseProfile {
        let idx = match self {
            EmitterKind::Light => 0,
            EmitterKind::Vision => 1,
            EmitterKind::Sound => 2,
            EmitterKind::Movement => 3,
            EmitterKind::Darkness => 4,
        };
        &SENSE_PROFILES[idx]
    }

    pub fn sense(self) -> Sense {
        self.profile().sense
    }

    /// 偵測模式的感知類型對應到哪種發射源的多邊形
    pub fn for_detection_sense(sense: Sense) -> Option<EmitterKind> {
        match sense {
            Sense::Sight => Some(EmitterKind::Vision),
            Sense::Sound => Some(EmitterKind::Sound),
            Sense::Move => Some(EmitterKind::Movement),
            Sense::Light => None,
        }
    }
}

/// 發射源設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterConfig {
    pub origin: Point,
    pub radius: f64,
    /// 張角（度）
    #[serde(default = "default_angle")]
    pub angle: f64,
    /// 朝向（度）
    #[serde(default)]
    pub rotation: f64,
    /// 預算不足時優先度高者先算
    #[serde(default)]
    pub priority: i32,
    /// 視野發射源所屬的觀察者
    #[serde(default)]
    pub viewer: Option<ViewerId>,
}

fn default_angle() -> f64 {
    360.0
}

impl EmitterConfig {
    pub fn new(origin: Point, radius: f64) -> Self {
        Self {
            origin,
            radius,
            angle: 360.0,
            rotation: 0.0,
            priority: 0,
            viewer: None,
        }
    }

    pub fn with_cone(mut self, angle: f64, rotation: f64) -> Self {
        self.angle = angle;
        self.rotation = rotation;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_viewer(mut self, viewer: ViewerId) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn is_full_circle(&self) -> bool {
        self.angle >= 360.0
    }
}

/// 發射源
#[derive(Debug, Clone)]
pub struct Emitter {
    pub id: EmitterId,
    pub kind: EmitterKind,
    pub config: EmitterConfig,
    /// 最後一次計算的多邊形
    pub polygon: Arc<Polygon>,
    pub active: bool,
    /// 每次設定或周邊幾何改變時遞增，用來丟棄過時的計算結果
    pub generation: u64,
    /// 需要重算
    pub dirty: bool,
    /// 最後一次計算失敗的原因
    pub last_error: Option<VisionError>,
}

impl Emitter {
    pub fn new(id: EmitterId, kind: EmitterKind, config: EmitterConfig) -> Self {
        let origin = config.origin;
        Self {
            id,
            kind,
            config,
            polygon: Arc::new(Polygon::empty(origin)),
            active: true,
            generation: 0,
            dirty: true,
            last_error: None,
        }
    }

    pub fn profile(&self) -> &'static SenseProfile {
        self.kind.profile()
    }

    pub fn origin(&self) -> Point {
        self.config.origin
    }

    /// 廣域查詢用的包圍盒
    pub fn bounds(&self) -> Bounds {
        Bounds::from_circle(self.config.origin, self.config.radius.max(0.0))
    }

    pub fn sweep_config(&self, setting: &SweepSetting) -> SweepConfig {
        SweepConfig {
            origin: self.config.origin,
            radius: self.config.radius,
            sense: self.kind.sense(),
            angle: self.config.angle,
            rotation: self.config.rotation,
            arc_segments: setting.arc_segments,
            max_candidates: setting.max_candidate_edges,
        }
    }

    /// 標記需要重算，並使進行中的結果失效
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.dirty = true;
    }

    pub fn move_to(&mut self, origin: Point) {
        if self.config.origin != origin {
            self.config.origin = origin;
            self.invalidate();
        }
    }

    pub fn reconfigure(&mut self, config: EmitterConfig) {
        if self.config != config {
            self.config = config;
            self.invalidate();
        }
    }

    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.invalidate();
        }
    }

    /// 套用計算結果；世代不符時丟棄並回傳 false
    pub fn apply_polygon(&mut self, generation: u64, polygon: Polygon, error: Option<VisionError>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.polygon = Arc::new(polygon);
        self.last_error = error;
        self.dirty = false;
        true
    }

    /// 線段是否在影響範圍內
    pub fn touches_segment(&self, a: Point, b: Point) -> bool {
        GeometryUtils::segment_touches_circle(a, b, self.config.origin, self.config.radius)
    }

    /// 點是否在錐形張角內
    pub fn in_cone(&self, point: Point) -> bool {
        if self.config.is_full_circle() {
            return true;
        }
        let angle = GeometryUtils::angle_of(self.config.origin, point);
        let half = self.config.angle.to_radians() * 0.5;
        let center = self.config.rotation.to_radians();
        GeometryUtils::angle_difference(center, angle).abs() <= half
    }
}
