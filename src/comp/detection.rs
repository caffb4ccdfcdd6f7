/// 偵測模式與偵測判定
///
/// 每對（觀察者, 目標）依序套用距離、牆、感知多邊形、張角與模式自身條件，
/// 只要任何一個啟用中的模式判定為 Detected，目標即可被感知。
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vek::Vec2;

use crate::comp::edge::Sense;
use crate::comp::emitter::{Emitter, EmitterId};
use crate::vision::compositor::VisibilityState;
use crate::vision::edge_index::EdgeIndex;
use crate::vision::geometry_utils::Point;

pub type EntityId = u64;

/// 黑暗視覺生效的環境光上限
pub const DARKVISION_LIGHT_THRESHOLD: f64 = 0.5;
/// 目標邊緣取樣點相對半徑的比例
pub const TEST_POINT_RADIUS_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionState {
    NotTested,
    OutOfRange,
    Blocked,
    Detected,
}

impl DetectionState {
    /// 多個取樣點合併時取最好的結果
    fn rank(self) -> u8 {
        match self {
            DetectionState::NotTested => 0,
            DetectionState::OutOfRange => 1,
            DetectionState::Blocked => 2,
            DetectionState::Detected => 3,
        }
    }

    pub fn best(self, other: DetectionState) -> DetectionState {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionModeId {
    BasicSight,
    LightPerception,
    Darkvision,
    SeeInvisibility,
    FeelTremor,
    Hearing,
    SenseAll,
}

/// 判定時可用的場景資料
pub struct DetectionContext<'a> {
    pub edges: &'a EdgeIndex,
    pub emitters: &'a BTreeMap<EmitterId, Emitter>,
    pub visibility: &'a VisibilityState,
}

/// 模式自身條件，在距離與遮擋都通過後才檢查
pub type DetectionPredicate = fn(&DetectionContext<'_>, &Observer, &Target, Point) -> bool;

#[derive(Clone)]
pub struct DetectionMode {
    pub id: DetectionModeId,
    pub sense: Sense,
    pub range: f64,
    pub angle_sensitive: bool,
    pub walls_block: bool,
    /// 特權觀察者可直接略過一般判定
    pub global: bool,
    pub enabled: bool,
    predicate: DetectionPredicate,
}

impl std::fmt::Debug for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionMode")
            .field("id", &self.id)
            .field("sense", &self.sense)
            .field("range", &self.range)
            .field("angle_sensitive", &self.angle_sensitive)
            .field("walls_block", &self.walls_block)
            .field("global", &self.global)
            .field("enabled", &self.enabled)
            .finish()
    }
}

fn visible_target(_ctx: &DetectionContext<'_>, _observer: &Observer, _target: &Target, _point: Point) -> bool {
    true
}

fn lit_point(ctx: &DetectionContext<'_>, _observer: &Observer, _target: &Target, point: Point) -> bool {
    ctx.visibility.is_illuminated(point)
}

fn dark_enough(ctx: &DetectionContext<'_>, _observer: &Observer, _target: &Target, _point: Point) -> bool {
    ctx.visibility.ambient.light_level() < DARKVISION_LIGHT_THRESHOLD
}

fn counters_invisibility(_ctx: &DetectionContext<'_>, observer: &Observer, _target: &Target, _point: Point) -> bool {
    observer.counters_invisibility
}

fn grounded(_ctx: &DetectionContext<'_>, _observer: &Observer, target: &Target, _point: Point) -> bool {
    target.grounded
}

fn audible(_ctx: &DetectionContext<'_>, _observer: &Observer, target: &Target, _point: Point) -> bool {
    target.audible
}

impl DetectionMode {
    /// 內建模式
    pub fn builtin(id: DetectionModeId, range: f64) -> Self {
        let (sense, angle_sensitive, walls_block, global, predicate): (Sense, bool, bool, bool, DetectionPredicate) =
            match id {
                DetectionModeId::BasicSight => (Sense::Sight, true, true, false, visible_target),
                DetectionModeId::LightPerception => (Sense::Sight, true, true, false, lit_point),
                DetectionModeId::Darkvision => (Sense::Sight, true, true, false, dark_enough),
                DetectionModeId::SeeInvisibility => (Sense::Sight, true, true, false, counters_invisibility),
                DetectionModeId::FeelTremor => (Sense::Move, false, false, false, grounded),
                DetectionModeId::Hearing => (Sense::Sound, false, true, false, audible),
                DetectionModeId::SenseAll => (Sense::Sight, false, false, true, visible_target),
            };
        Self {
            id,
            sense,
            range,
            angle_sensitive,
            walls_block,
            global,
            enabled: true,
            predicate,
        }
    }

    pub fn with_predicate(mut self, predicate: DetectionPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_walls_block(mut self, walls_block: bool) -> Self {
        self.walls_block = walls_block;
        self
    }

    /// 可以看見隱形目標的模式
    pub fn detects_invisible(&self) -> bool {
        self.sense != Sense::Sight || self.id == DetectionModeId::SeeInvisibility
    }

    /// 對整個目標判定：取樣點中最好的結果
    pub fn test(&self, ctx: &DetectionContext<'_>, observer: &Observer, target: &Target) -> DetectionState {
        if !self.enabled {
            return DetectionState::NotTested;
        }
        if self.global && !observer.privileged {
            return DetectionState::NotTested;
        }
        // 距離以目標中心為準，取樣點只用於牆壁與多邊形判定
        if observer.position.distance(target.position) > self.range {
            return DetectionState::OutOfRange;
        }
        let mut state = DetectionState::NotTested;
        for point in target.test_points() {
            state = state.best(self.test_point(ctx, observer, target, point));
            if state == DetectionState::Detected {
                break;
            }
        }
        state
    }

    fn test_point(&self, ctx: &DetectionContext<'_>, observer: &Observer, target: &Target, point: Point) -> DetectionState {
        if self.global {
            return DetectionState::Detected;
        }
        if target.invisible && !self.detects_invisible() {
            return DetectionState::Blocked;
        }

        let emitter = observer
            .emitter_for(self.sense)
            .and_then(|id| ctx.emitters.get(&id));
        if self.walls_block {
            if ctx.edges.segment_restricted(observer.position, point, self.sense) {
                return DetectionState::Blocked;
            }
            if let Some(emitter) = emitter {
                if !emitter.active || !emitter.polygon.contains_point(point) {
                    return DetectionState::Blocked;
                }
            }
        }
        if self.angle_sensitive {
            if let Some(emitter) = emitter {
                if !emitter.in_cone(point) {
                    return DetectionState::Blocked;
                }
            }
        }
        if !(self.predicate)(ctx, observer, target, point) {
            return DetectionState::Blocked;
        }
        DetectionState::Detected
    }
}

/// 觀察者提供的模式設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionModeConfig {
    pub id: DetectionModeId,
    pub range: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<&DetectionModeConfig> for DetectionMode {
    fn from(config: &DetectionModeConfig) -> Self {
        let mut mode = DetectionMode::builtin(config.id, config.range);
        mode.enabled = config.enabled;
        mode
    }
}

/// 觀察者
#[derive(Debug, Clone)]
pub struct Observer {
    pub id: EntityId,
    pub position: Point,
    /// 每種感知對應的發射源
    pub emitters: HashMap<Sense, EmitterId>,
    pub modes: Vec<DetectionMode>,
    /// 可使用全域模式
    pub privileged: bool,
    pub counters_invisibility: bool,
}

impl Observer {
    pub fn new(id: EntityId, position: Point) -> Self {
        Self {
            id,
            position,
            emitters: HashMap::new(),
            modes: Vec::new(),
            privileged: false,
            counters_invisibility: false,
        }
    }

    pub fn with_mode(mut self, mode: DetectionMode) -> Self {
        self.modes.push(mode);
        self
    }

    pub fn with_modes(mut self, configs: &[DetectionModeConfig]) -> Self {
        self.modes.extend(configs.iter().map(DetectionMode::from));
        self
    }

    pub fn with_emitter(mut self, sense: Sense, emitter: EmitterId) -> Self {
        self.emitters.insert(sense, emitter);
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn emitter_for(&self, sense: Sense) -> Option<EmitterId> {
        self.emitters.get(&sense).copied()
    }
}

/// 偵測目標
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: EntityId,
    pub position: Point,
    #[serde(default)]
    pub radius: f64,
    #[serde(default)]
    pub invisible: bool,
    /// 與地面接觸（震顫感知需要）
    #[serde(default = "default_grounded")]
    pub grounded: bool,
    /// 正在發出聲音
    #[serde(default)]
    pub audible: bool,
}

fn default_grounded() -> bool {
    true
}

impl Target {
    pub fn new(id: EntityId, position: Point) -> Self {
        Self {
            id,
            position,
            radius: 0.0,
            invisible: false,
            grounded: true,
            audible: false,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius.max(0.0);
        self
    }

    /// 中心點加上四個方向 0.9 倍半徑處
    pub fn test_points(&self) -> Vec<Point> {
        let mut points = vec![self.position];
        if self.radius > 0.0 {
            let r = self.radius * TEST_POINT_RADIUS_RATIO;
            points.extend([
                self.position + Vec2::new(r, 0.0),
                self.position + Vec2::new(0.0, r),
                self.position + Vec2::new(-r, 0.0),
                self.position + Vec2::new(0.0, -r),
            ]);
        }
        points
    }
}

/// 一對觀察者/目標的判定結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub observer: EntityId,
    pub target: EntityId,
    pub states: Vec<(DetectionModeId, DetectionState)>,
}

impl DetectionReport {
    pub fn detected(&self) -> bool {
        self.states.iter().any(|(_, s)| *s == DetectionState::Detected)
    }

    pub fn detected_by(&self) -> Option<DetectionModeId> {
        self.states
            .iter()
            .find(|(_, s)| *s == DetectionState::Detected)
            .map(|(id, _)| *id)
    }
}

pub struct DetectionPipeline;

impl DetectionPipeline {
    pub fn evaluate(ctx: &DetectionContext<'_>, observer: &Observer, target: &Target) -> DetectionReport {
        let states = observer
            .modes
            .iter()
            .map(|mode| (mode.id, mode.test(ctx, observer, target)))
            .collect();
        DetectionReport {
            observer: observer.id,
            target: target.id,
            states,
        }
    }

    /// 任一啟用模式偵測到即可
    pub fn can_detect(ctx: &DetectionContext<'_>, observer: &Observer, target: &Target) -> bool {
        observer
            .modes
            .iter()
            .any(|mode| mode.test(ctx, observer, target) == DetectionState::Detected)
    }
}
