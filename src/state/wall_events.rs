/// 牆壁變更事件
///
/// 牆壁來源（地圖編輯、門開關）以 create/update/delete 事件通知引擎，
/// 事件先排入佇列，在下一個 tick 開頭一次套用。
use serde::{Deserialize, Serialize};
use vek::Vec2;

use crate::comp::edge::{DoorState, Edge, EdgeId, SenseRestrictions, WallSide};
use crate::error::VisionError;
use crate::vision::edge_index::EdgeIndex;
use crate::vision::quadtree::Bounds;

/// 牆壁來源提供的原始資料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallData {
    pub id: EdgeId,
    pub a: [f64; 2],
    pub b: [f64; 2],
    #[serde(default)]
    pub restrictions: SenseRestrictions,
    #[serde(default)]
    pub door: DoorState,
    #[serde(default)]
    pub one_way: Option<WallSide>,
    #[serde(default)]
    pub proximity: Option<f64>,
}

impl WallData {
    pub fn new(id: EdgeId, a: [f64; 2], b: [f64; 2]) -> Self {
        Self {
            id,
            a,
            b,
            restrictions: SenseRestrictions::default(),
            door: DoorState::None,
            one_way: None,
            proximity: None,
        }
    }

    pub fn to_edge(&self) -> Result<Edge, VisionError> {
        let mut edge = Edge::new(self.id, Vec2::from(self.a), Vec2::from(self.b), self.restrictions)?;
        edge.door = self.door;
        edge.one_way = self.one_way;
        edge.proximity = self.proximity;
        Ok(edge)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WallChange {
    Created(WallData),
    Updated(WallData),
    Deleted { id: EdgeId },
}

impl WallChange {
    pub fn id(&self) -> EdgeId {
        match self {
            WallChange::Created(data) | WallChange::Updated(data) => data.id,
            WallChange::Deleted { id } => *id,
        }
    }
}

/// 一批事件套用後受影響的線段（舊位置與新位置都算）
#[derive(Debug, Default)]
pub struct AppliedWalls {
    pub touched: Vec<(Vec2<f64>, Vec2<f64>)>,
    pub errors: Vec<VisionError>,
}

impl AppliedWalls {
    pub fn bounds(&self) -> Option<Bounds> {
        self.touched
            .iter()
            .filter_map(|(a, b)| Bounds::from_points(&[*a, *b]))
            .reduce(|x, y| x.union(&y))
    }
}

pub struct WallEventApplier;

impl WallEventApplier {
    /// 依序套用事件；不合法的邊被丟棄並記錄警告，其餘照常套用
    pub fn apply(index: &mut EdgeIndex, changes: impl IntoIterator<Item = WallChange>) -> AppliedWalls {
        let mut applied = AppliedWalls::default();
        for change in changes {
            match change {
                WallChange::Created(data) | WallChange::Updated(data) => match data.to_edge() {
                    Ok(edge) => {
                        let (a, b) = (edge.a, edge.b);
                        if let Some(old) = index.insert(edge) {
                            applied.touched.push((old.a, old.b));
                        }
                        applied.touched.push((a, b));
                    }
                    Err(err) => {
                        log::warn!("dropping wall {}: {}", data.id, err);
                        // 舊的牆仍要移除，避免留下過時幾何
                        if let Some(old) = index.remove(data.id) {
                            applied.touched.push((old.a, old.b));
                        }
                        applied.errors.push(err);
                    }
                },
                WallChange::Deleted { id } => {
                    if let Some(old) = index.remove(id) {
                        applied.touched.push((old.a, old.b));
                    } else {
                        log::debug!("delete for unknown wall {}", id);
                    }
                }
            }
        }
        applied
    }
}
