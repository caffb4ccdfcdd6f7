/// 可見範圍多邊形
///
/// 一次掃描的輸出：封閉、不自交的有序頂點序列，附帶快取的包圍盒
use serde::{Deserialize, Serialize};

use crate::vision::geometry_utils::{GeometryUtils, Point, GEOMETRY_EPSILON};
use crate::vision::quadtree::Bounds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// 掃描原點
    pub origin: Point,
    /// 最大半徑
    pub radius: f64,
    /// 邊界頂點（逆時針）
    pub points: Vec<Point>,
    /// 快取的包圍盒
    pub bounds: Bounds,
}

impl Polygon {
    pub fn new(origin: Point, radius: f64, points: Vec<Point>) -> Self {
        let bounds = Bounds::from_points(&points).unwrap_or(Bounds::new(origin, origin));
        Self {
            origin,
            radius,
            points,
            bounds,
        }
    }

    /// 空多邊形（計算退化時的結果）
    pub fn empty(origin: Point) -> Self {
        Self::new(origin, 0.0, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Ray-casting 點在多邊形內測試
    pub fn contains_point(&self, point: Point) -> bool {
        if self.is_empty() || !self.bounds.contains_point(point) {
            return false;
        }
        let points = &self.points;
        let n = points.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (pi, pj) = (points[i], points[j]);
            if (pi.y > point.y) != (pj.y > point.y) {
                let intersect_x = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
                if point.x < intersect_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Shoelace 面積
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += GeometryUtils::cross(self.points[i], self.points[j]);
        }
        area.abs() * 0.5
    }

    /// 是否有一個頂點落在指定點附近
    pub fn has_vertex_near(&self, point: Point, tolerance: f64) -> bool {
        self.points.iter().any(|p| p.distance(point) <= tolerance)
    }

    /// 移除重複點與共線點
    pub fn simplify(&mut self, tolerance: f64) {
        let mut cleaned: Vec<Point> = Vec::with_capacity(self.points.len());
        for &p in &self.points {
            if cleaned.last().map_or(false, |last: &Point| last.distance(p) <= tolerance) {
                continue;
            }
            cleaned.push(p);
        }
        while cleaned.len() > 1 && cleaned[0].distance(cleaned[cleaned.len() - 1]) <= tolerance {
            cleaned.pop();
        }

        // 移除夾在兩鄰點連線上的頂點，移除後回頭重新檢查前一點
        let mut i = 0;
        while cleaned.len() > 3 && i < cleaned.len() {
            let n = cleaned.len();
            let prev = cleaned[(i + n - 1) % n];
            let cur = cleaned[i];
            let next = cleaned[(i + 1) % n];
            let between = (cur - prev).dot(next - cur) > 0.0;
            if between && GeometryUtils::is_collinear(prev, cur, next, tolerance) {
                cleaned.remove(i);
                i = i.saturating_sub(1);
            } else {
                i += 1;
            }
        }

        self.points = cleaned;
        self.bounds = Bounds::from_points(&self.points).unwrap_or(Bounds::new(self.origin, self.origin));
    }

    /// 掃描每個網格中心，回傳落在多邊形內的格子索引 (col, row)
    pub fn rasterize(&self, grid_origin: Point, cell_size: f64, cols: usize, rows: usize) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        if self.is_empty() || cell_size <= 0.0 {
            return cells;
        }
        let to_cell = |v: f64, o: f64| ((v - o) / cell_size).floor();
        let col_min = to_cell(self.bounds.min.x, grid_origin.x).max(0.0) as usize;
        let row_min = to_cell(self.bounds.min.y, grid_origin.y).max(0.0) as usize;
        let col_max = (to_cell(self.bounds.max.x, grid_origin.x) + 1.0).max(0.0).min(cols as f64) as usize;
        let row_max = (to_cell(self.bounds.max.y, grid_origin.y) + 1.0).max(0.0).min(rows as f64) as usize;

        for row in row_min..row_max {
            let y = grid_origin.y + (row as f64 + 0.5) * cell_size;
            for col in col_min..col_max {
                let x = grid_origin.x + (col as f64 + 0.5) * cell_size;
                if self.contains_point(Point::new(x, y)) {
                    cells.push((col, row));
                }
            }
        }
        cells
    }
}

/// 多邊形頂點相對容差：半徑越大容許越大
pub fn vertex_tolerance(radius: f64) -> f64 {
    (radius.abs() * 1e-9).max(GEOMETRY_EPSILON)
}
