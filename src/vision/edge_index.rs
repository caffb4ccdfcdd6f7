/// 邊索引：邊表 + 頂點表 + 四叉樹
///
/// 會話以 `Arc<EdgeIndex>` 持有，掃描期間拿到的是不可變快照；
/// 修改時透過 `Arc::make_mut` 寫時複製。
use std::collections::BTreeMap;

use crate::comp::edge::{Edge, EdgeId, RestrictionKind, Sense};
use crate::comp::vertex::{VertexKey, VertexMap, VERTEX_PRECISION};
use crate::config::QuadTreeSetting;
use crate::vision::geometry_utils::{GeometryUtils, Point, GEOMETRY_EPSILON};
use crate::vision::quadtree::{Bounds, QuadTree};

#[derive(Debug, Clone)]
pub struct EdgeIndex {
    edges: BTreeMap<EdgeId, Edge>,
    vertices: VertexMap,
    tree: QuadTree<EdgeId>,
    /// 每次修改遞增
    generation: u64,
}

impl EdgeIndex {
    pub fn new(world_bounds: Bounds, setting: &QuadTreeSetting) -> Self {
        Self {
            edges: BTreeMap::new(),
            vertices: VertexMap::new(),
            tree: QuadTree::new(
                world_bounds,
                setting.max_objects,
                setting.min_node_size,
                setting.max_depth,
            ),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn get(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn vertices(&self) -> &VertexMap {
        &self.vertices
    }

    pub fn tree(&self) -> &QuadTree<EdgeId> {
        &self.tree
    }

    /// 插入或取代一條邊，回傳被取代的舊邊
    pub fn insert(&mut self, edge: Edge) -> Option<Edge> {
        let previous = self.remove(edge.id);
        self.vertices.attach(edge.a, edge.id);
        self.vertices.attach(edge.b, edge.id);
        self.tree.insert(edge.id, edge.bounds());
        self.edges.insert(edge.id, edge);
        self.generation += 1;
        previous
    }

    pub fn update(&mut self, edge: Edge) -> Option<Edge> {
        self.insert(edge)
    }

    pub fn remove(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        self.vertices.detach(edge.a, id);
        self.vertices.detach(edge.b, id);
        self.tree.remove(&id);
        self.generation += 1;
        Some(edge)
    }

    /// 矩形範圍查詢（保守超集）
    pub fn query(&self, bounds: &Bounds) -> Vec<&Edge> {
        self.tree
            .query(bounds)
            .into_iter()
            .filter_map(|id| self.edges.get(&id))
            .collect()
    }

    /// 圓形範圍內、會限制指定感知的邊
    pub fn candidates_in_circle(&self, center: Point, radius: f64, sense: Sense) -> Vec<&Edge> {
        let mut candidates: Vec<&Edge> = self
            .query(&Bounds::from_circle(center, radius))
            .into_iter()
            .filter(|edge| edge.restriction_from(sense, center) != RestrictionKind::None)
            .filter(|edge| GeometryUtils::segment_touches_circle(edge.a, edge.b, center, radius))
            .collect();
        candidates.sort_by_key(|edge| edge.id);
        candidates
    }

    /// 從 from 看向 to 的線段是否被限制指定感知的邊擋住
    ///
    /// 與掃描相同規則：一條 Blocking 或兩條 Limited 即被擋。
    /// 線段穿過兩條 Limited 邊串接的頂點時只算一次穿越；
    /// 兩條邊在同側（擦過角點）或交叉成 X 時各算一次。
    pub fn segment_restricted(&self, from: Point, to: Point, sense: Sense) -> bool {
        let Some(bounds) = Bounds::from_points(&[from, to]) else {
            return false;
        };
        let mut limited_hits: Vec<Option<(VertexKey, bool)>> = Vec::new();
        for edge in self.query(&bounds) {
            let kind = edge.restriction_from(sense, from);
            if kind == RestrictionKind::None {
                continue;
            }
            let Some(hit) = GeometryUtils::segments_intersect(from, to, edge.a, edge.b) else {
                continue;
            };
            let t = hit.distance(from);
            // 端點剛好碰到牆不算穿越
            if hit.distance(to) <= GEOMETRY_EPSILON * 10.0 || t <= GEOMETRY_EPSILON * 10.0 {
                continue;
            }
            match kind {
                RestrictionKind::Blocking => return true,
                RestrictionKind::Limited => {
                    let corner = self.corner_hit(edge, hit, from, to);
                    let chained = corner.is_some_and(|(key, left)| {
                        limited_hits
                            .iter()
                            .any(|other| matches!(other, Some((k, l)) if *k == key && *l != left))
                    });
                    if !chained {
                        limited_hits.push(corner);
                    }
                    if limited_hits.len() >= 2 {
                        return true;
                    }
                }
                RestrictionKind::None => {}
            }
        }
        false
    }

    /// 交點落在共用頂點上時，回傳頂點鍵與邊的另一端是否在線段左側
    fn corner_hit(&self, edge: &Edge, hit: Point, from: Point, to: Point) -> Option<(VertexKey, bool)> {
        let (corner, other) = if hit.distance(edge.a) <= VERTEX_PRECISION {
            (edge.a, edge.b)
        } else if hit.distance(edge.b) <= VERTEX_PRECISION {
            (edge.b, edge.a)
        } else {
            return None;
        };
        let vertex = self.vertices.get(corner)?;
        if vertex.edges.len() < 2 {
            return None;
        }
        Some((vertex.key, GeometryUtils::cross(to - from, other - from) > 0.0))
    }

    /// 全部重建四叉樹
    pub fn rebuild(&mut self) {
        self.tree.rebuild();
        self.generation += 1;
    }
}
