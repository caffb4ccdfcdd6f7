use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use vek::Vec2;

use crate::vision::geometry_utils::Point;

/// 邊界矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// 包住一組點的最小矩形
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = *points.first()?;
        let mut bounds = Self::new(first, first);
        for p in &points[1..] {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    /// 圓的外接正方形
    pub fn from_circle(center: Point, radius: f64) -> Self {
        let r = Vec2::new(radius, radius);
        Self::new(center - r, center + r)
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y
    }

    /// 是否完整包含另一個矩形
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        other.min.x >= self.min.x && other.max.x <= self.max.x &&
        other.min.y >= self.min.y && other.max.y <= self.max.y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: Vec2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Vec2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        (self.min + self.max) * 0.5
    }

    /// 四個象限（西北、東北、西南、東南）
    fn quadrants(&self) -> [Bounds; 4] {
        let mid = self.center();
        [
            Bounds::new(Vec2::new(self.min.x, mid.y), Vec2::new(mid.x, self.max.y)),
            Bounds::new(mid, self.max),
            Bounds::new(self.min, mid),
            Bounds::new(Vec2::new(mid.x, self.min.y), Vec2::new(self.max.x, mid.y)),
        ]
    }
}

/// 節點內存放的物件
#[derive(Debug, Clone)]
struct QuadObject<K> {
    bounds: Bounds,
    key: K,
}

/// 四叉樹節點
#[derive(Debug, Clone)]
pub struct QuadTreeNode<K> {
    /// 節點邊界
    pub bounds: Bounds,
    /// 子節點（NW, NE, SW, SE）
    children: Option<Box<[QuadTreeNode<K>; 4]>>,
    /// 跨越子節點邊界或無法再細分時留在本層的物件
    objects: Vec<QuadObject<K>>,
    /// 節點深度
    pub depth: usize,
}

impl<K: Copy + Eq> QuadTreeNode<K> {
    fn new(bounds: Bounds, depth: usize) -> Self {
        Self {
            bounds,
            children: None,
            objects: Vec::new(),
            depth,
        }
    }

    fn child_containing(&mut self, bounds: &Bounds) -> Option<&mut QuadTreeNode<K>> {
        self.children
            .as_mut()?
            .iter_mut()
            .find(|child| child.bounds.contains_bounds(bounds))
    }
}

/// 動態四叉樹
///
/// 支援增量插入、移除、更新與矩形範圍查詢。物件放在能完整包住它的最深節點；
/// 超出世界範圍的物件留在根節點。移除時不合併節點，膨脹可以用 `rebuild` 回收。
#[derive(Debug, Clone)]
pub struct QuadTree<K> {
    root: QuadTreeNode<K>,
    /// 物件目前的邊界，用於移除時定位
    locations: HashMap<K, Bounds>,
    pub max_objects_per_node: usize,
    pub min_node_size: f64,
    pub max_tree_depth: usize,
}

impl<K: Copy + Eq + Hash> QuadTree<K> {
    pub fn new(world_bounds: Bounds, max_objects_per_node: usize, min_node_size: f64, max_tree_depth: usize) -> Self {
        Self {
            root: QuadTreeNode::new(world_bounds, 0),
            locations: HashMap::new(),
            max_objects_per_node: max_objects_per_node.max(1),
            min_node_size,
            max_tree_depth,
        }
    }

    pub fn world_bounds(&self) -> Bounds {
        self.root.bounds
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.locations.contains_key(key)
    }

    pub fn bounds_of(&self, key: &K) -> Option<Bounds> {
        self.locations.get(key).copied()
    }

    /// 插入物件；已存在時等同更新
    pub fn insert(&mut self, key: K, bounds: Bounds) {
        if self.locations.contains_key(&key) {
            self.remove(&key);
        }
        self.locations.insert(key, bounds);

        let max_objects = self.max_objects_per_node;
        let min_size = self.min_node_size;
        let max_depth = self.max_tree_depth;

        let mut node = &mut self.root;
        loop {
            if node.children.is_none() {
                node.objects.push(QuadObject { bounds, key });
                Self::maybe_subdivide(node, max_objects, min_size, max_depth);
                return;
            }
            if !node.bounds.contains_bounds(&bounds)
                || !node.children.as_ref().map_or(false, |c| c.iter().any(|child| child.bounds.contains_bounds(&bounds)))
            {
                node.objects.push(QuadObject { bounds, key });
                return;
            }
            node = match node.child_containing(&bounds) {
                Some(child) => child,
                None => return,
            };
        }
    }

    /// 節點超過容量且尺寸允許時細分，並把能下放的物件下放
    fn maybe_subdivide(node: &mut QuadTreeNode<K>, max_objects: usize, min_size: f64, max_depth: usize) {
        if node.objects.len() <= max_objects
            || node.depth >= max_depth
            || node.bounds.width() * 0.5 < min_size
            || node.bounds.height() * 0.5 < min_size
        {
            return;
        }

        let depth = node.depth + 1;
        let [nw, ne, sw, se] = node.bounds.quadrants();
        node.children = Some(Box::new([
            QuadTreeNode::new(nw, depth),
            QuadTreeNode::new(ne, depth),
            QuadTreeNode::new(sw, depth),
            QuadTreeNode::new(se, depth),
        ]));

        let objects = std::mem::take(&mut node.objects);
        for object in objects {
            match node.child_containing(&object.bounds) {
                Some(child) => child.objects.push(object),
                None => node.objects.push(object),
            }
        }

        if let Some(children) = node.children.as_mut() {
            for child in children.iter_mut() {
                Self::maybe_subdivide(child, max_objects, min_size, max_depth);
            }
        }
    }

    /// 移除物件，回傳是否存在
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(bounds) = self.locations.remove(key) else {
            return false;
        };

        let mut node = &mut self.root;
        loop {
            if let Some(pos) = node.objects.iter().position(|o| o.key == *key) {
                node.objects.swap_remove(pos);
                return true;
            }
            node = match node.child_containing(&bounds) {
                Some(child) => child,
                None => break,
            };
        }

        // 正常情況不會走到這裡；保險起見全樹搜尋
        log::warn!("quadtree object not found along its path, scanning whole tree");
        Self::remove_anywhere(&mut self.root, key)
    }

    fn remove_anywhere(node: &mut QuadTreeNode<K>, key: &K) -> bool {
        if let Some(pos) = node.objects.iter().position(|o| o.key == *key) {
            node.objects.swap_remove(pos);
            return true;
        }
        if let Some(children) = node.children.as_mut() {
            for child in children.iter_mut() {
                if Self::remove_anywhere(child, key) {
                    return true;
                }
            }
        }
        false
    }

    /// 更新物件邊界
    pub fn update(&mut self, key: K, bounds: Bounds) {
        self.insert(key, bounds);
    }

    /// 查詢與矩形相交的物件（保守超集，呼叫端需做精確測試）
    pub fn query(&self, query_bounds: &Bounds) -> Vec<K> {
        let mut results = Vec::new();
        // 根節點永遠檢查，因為可能存放超出世界範圍的物件
        Self::collect(&self.root, query_bounds, &mut results);
        results
    }

    fn collect(node: &QuadTreeNode<K>, query_bounds: &Bounds, results: &mut Vec<K>) {
        for object in &node.objects {
            if object.bounds.intersects(query_bounds) {
                results.push(object.key);
            }
        }

        if let Some(ref children) = node.children {
            for child in children.iter() {
                if child.bounds.intersects(query_bounds) {
                    Self::collect(child, query_bounds, results);
                }
            }
        }
    }

    /// 全部重建（回收只分裂不合併造成的膨脹）
    pub fn rebuild(&mut self) {
        self.rebuild_with_bounds(self.root.bounds);
    }

    pub fn rebuild_with_bounds(&mut self, world_bounds: Bounds) {
        let objects: Vec<(K, Bounds)> = self.locations.drain().collect();
        self.root = QuadTreeNode::new(world_bounds, 0);
        for (key, bounds) in objects {
            self.insert(key, bounds);
        }
    }

    /// 計算四叉樹節點數量
    pub fn count_nodes(&self) -> usize {
        Self::count_nodes_recursive(&self.root)
    }

    fn count_nodes_recursive(node: &QuadTreeNode<K>) -> usize {
        let mut count = 1;
        if let Some(ref children) = node.children {
            for child in children.iter() {
                count += Self::count_nodes_recursive(child);
            }
        }
        count
    }

    /// 最大深度（測試與統計用）
    pub fn depth(&self) -> usize {
        fn walk<K>(node: &QuadTreeNode<K>) -> usize {
            match node.children {
                Some(ref children) => children.iter().map(walk).max().unwrap_or(node.depth),
                None => node.depth,
            }
        }
        walk(&self.root)
    }
}
