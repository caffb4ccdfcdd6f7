/// 阻擋線段（牆壁）模型
///
/// 每條邊對每種感知（視線、光、聲音、移動）有各自的限制類型，
/// 另可帶門的狀態、單向與近距離門檻。
use serde::{Deserialize, Serialize};
use vek::Vec2;

use crate::error::VisionError;
use crate::vision::geometry_utils::{GeometryUtils, Point};
use crate::vision::quadtree::Bounds;

/// 邊的唯一識別碼（由牆壁來源指定）
pub type EdgeId = u64;

/// 感知類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sense {
    Sight,
    Light,
    Sound,
    Move,
}

impl Sense {
    pub const ALL: [Sense; 4] = [Sense::Sight, Sense::Light, Sense::Sound, Sense::Move];
}

/// 限制類型：允許射線穿過幾次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionKind {
    /// 不限制
    None,
    /// 第一次穿過仍可見，第二次被擋
    Limited,
    /// 完全阻擋
    Blocking,
}

impl Default for RestrictionKind {
    fn default() -> Self {
        RestrictionKind::Blocking
    }
}

/// 各感知的限制設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenseRestrictions {
    pub sight: RestrictionKind,
    pub light: RestrictionKind,
    pub sound: RestrictionKind,
    #[serde(rename = "move")]
    pub movement: RestrictionKind,
}

impl SenseRestrictions {
    pub fn uniform(kind: RestrictionKind) -> Self {
        Self {
            sight: kind,
            light: kind,
            sound: kind,
            movement: kind,
        }
    }

    pub fn get(&self, sense: Sense) -> RestrictionKind {
        match sense {
            Sense::Sight => self.sight,
            Sense::Light => self.light,
            Sense::Sound => self.sound,
            Sense::Move => self.movement,
        }
    }

    pub fn set(&mut self, sense: Sense, kind: RestrictionKind) {
        match sense {
            Sense::Sight => self.sight = kind,
            Sense::Light => self.light = kind,
            Sense::Sound => self.sound = kind,
            Sense::Move => self.movement = kind,
        }
    }

    pub fn with(mut self, sense: Sense, kind: RestrictionKind) -> Self {
        self.set(sense, kind);
        self
    }
}

impl Default for SenseRestrictions {
    fn default() -> Self {
        Self::uniform(RestrictionKind::Blocking)
    }
}

/// 門的狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    /// 不是門
    None,
    Closed,
    Open,
    Locked,
}

impl Default for DoorState {
    fn default() -> Self {
        DoorState::None
    }
}

/// 單向牆：只限制位於有向線段 a→b 某一側的原點
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallSide {
    Left,
    Right,
}

/// 阻擋線段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub a: Point,
    pub b: Point,
    pub restrictions: SenseRestrictions,
    pub door: DoorState,
    pub one_way: Option<WallSide>,
    /// 原點距離小於此值時不受限制
    pub proximity: Option<f64>,
}

impl Edge {
    /// 建立邊；零長度或非有限座標會被拒絕
    pub fn new(id: EdgeId, a: Point, b: Point, restrictions: SenseRestrictions) -> Result<Self, VisionError> {
        if !(a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite()) {
            return Err(VisionError::Configuration(format!(
                "edge {} has non-finite endpoint ({:?}, {:?})", id, a, b
            )));
        }
        if a.distance_squared(b) == 0.0 {
            return Err(VisionError::Configuration(format!(
                "edge {} has zero length at ({:.3}, {:.3})", id, a.x, a.y
            )));
        }
        Ok(Self {
            id,
            a,
            b,
            restrictions,
            door: DoorState::None,
            one_way: None,
            proximity: None,
        })
    }

    /// 四感知都完全阻擋的普通牆
    pub fn wall(id: EdgeId, a: [f64; 2], b: [f64; 2]) -> Result<Self, VisionError> {
        Self::new(id, Vec2::from(a), Vec2::from(b), SenseRestrictions::default())
    }

    pub fn with_door(mut self, door: DoorState) -> Self {
        self.door = door;
        self
    }

    pub fn with_one_way(mut self, side: WallSide) -> Self {
        self.one_way = Some(side);
        self
    }

    pub fn with_proximity(mut self, threshold: f64) -> Self {
        self.proximity = Some(threshold);
        self
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(&[self.a, self.b]).unwrap_or(Bounds::new(self.a, self.a))
    }

    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    /// 不考慮原點位置的限制類型（門開啟時不限制）
    pub fn restriction(&self, sense: Sense) -> RestrictionKind {
        if self.door == DoorState::Open {
            return RestrictionKind::None;
        }
        self.restrictions.get(sense)
    }

    /// 從指定原點看過來的實際限制類型
    pub fn restriction_from(&self, sense: Sense, origin: Point) -> RestrictionKind {
        let kind = self.restriction(sense);
        if kind == RestrictionKind::None {
            return kind;
        }
        if let Some(side) = self.one_way {
            let orientation = GeometryUtils::orientation(self.a, self.b, origin);
            let on_side = match side {
                WallSide::Left => orientation > 0.0,
                WallSide::Right => orientation < 0.0,
            };
            if !on_side {
                return RestrictionKind::None;
            }
        }
        if let Some(threshold) = self.proximity {
            if GeometryUtils::point_to_segment_distance(origin, self.a, self.b) < threshold {
                return RestrictionKind::None;
            }
        }
        kind
    }

    /// 是否對任何感知有限制
    pub fn restricts_anything(&self) -> bool {
        Sense::ALL.iter().any(|s| self.restriction(*s) != RestrictionKind::None)
    }
}
