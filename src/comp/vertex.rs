/// 頂點：多條邊共享的端點
///
/// 以量化後的座標為鍵，讓幾乎重合的端點合併成同一個頂點。
use hashbrown::HashMap;

use crate::comp::edge::EdgeId;
use crate::vision::geometry_utils::Point;

/// 座標量化精度（場景單位）
pub const VERTEX_PRECISION: f64 = 1e-6;

/// 量化後的頂點鍵
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexKey(i64, i64);

impl VertexKey {
    pub fn from_point(p: Point) -> Self {
        VertexKey(
            (p.x / VERTEX_PRECISION).round() as i64,
            (p.y / VERTEX_PRECISION).round() as i64,
        )
    }
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub key: VertexKey,
    /// 第一次登記時的座標
    pub point: Point,
    /// 連接到此頂點的邊
    pub edges: Vec<EdgeId>,
}

/// 頂點表
#[derive(Debug, Clone, Default)]
pub struct VertexMap {
    vertices: HashMap<VertexKey, Vertex>,
}

impl VertexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登記邊的端點，回傳頂點鍵
    pub fn attach(&mut self, point: Point, edge: EdgeId) -> VertexKey {
        let key = VertexKey::from_point(point);
        let vertex = self.vertices.entry(key).or_insert_with(|| Vertex {
            key,
            point,
            edges: Vec::new(),
        });
        if !vertex.edges.contains(&edge) {
            vertex.edges.push(edge);
        }
        key
    }

    /// 解除邊與頂點的連結；頂點沒有邊時一併移除
    pub fn detach(&mut self, point: Point, edge: EdgeId) {
        let key = VertexKey::from_point(point);
        let now_empty = match self.vertices.get_mut(&key) {
            Some(vertex) => {
                vertex.edges.retain(|e| *e != edge);
                vertex.edges.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.vertices.remove(&key);
        }
    }

    pub fn get(&self, point: Point) -> Option<&Vertex> {
        self.vertices.get(&VertexKey::from_point(point))
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }
}
