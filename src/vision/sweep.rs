/// 角度掃描可見多邊形
///
/// 流程：
/// 1. 以包圍圓向邊索引查詢候選邊，裁切到圓內
/// 2. 由端點（與邊之間的交點）建立事件，依極角排序，同角度時近者優先
/// 3. 維護目前射線穿過的活動邊集合；每個事件先算移除前的邊界點，
///    再先移除結束邊、後插入開始邊，算移除後的邊界點
/// 4. 射線依距離走過活動邊：Blocking 立即停止，Limited 第二次穿越才停止
///
/// 同一次射線中的活動邊各算一次穿越：串接的兩條邊在共用頂點上不會同時活動，
/// 交叉成 X 的兩條邊在交點上則是兩次穿越。
use hashbrown::HashMap;
use ordered_float::OrderedFloat;
use std::f64::consts::PI;
use vek::Vec2;

use crate::comp::edge::{Edge, EdgeId, RestrictionKind, Sense};
use crate::comp::vertex::{VertexKey, VertexMap};
use crate::error::VisionError;
use crate::vision::edge_index::EdgeIndex;
use crate::vision::geometry_utils::{GeometryUtils, Point, GEOMETRY_EPSILON};
use crate::vision::polygon::{vertex_tolerance, Polygon};

const TAU: f64 = 2.0 * PI;
/// 視為同一角度的容差
const ANGLE_EPSILON: f64 = 1e-9;
/// 原點與邊距離小於此值時視為落在邊上
const ORIGIN_ON_EDGE_EPSILON: f64 = 1e-7;
/// 原點落在邊上時的擾動距離
const ORIGIN_PERTURBATION: f64 = 1e-5;

/// 掃描輸入
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub origin: Point,
    pub radius: f64,
    pub sense: Sense,
    /// 張角（度），>= 360 為完整圓
    pub angle: f64,
    /// 錐形中心方向（度，逆時針，自 +x 軸起算）
    pub rotation: f64,
    /// 完整圓周的取樣段數
    pub arc_segments: usize,
    /// 候選邊上限
    pub max_candidates: usize,
}

impl SweepConfig {
    pub fn new(origin: Point, radius: f64, sense: Sense) -> Self {
        Self {
            origin,
            radius,
            sense,
            angle: 360.0,
            rotation: 0.0,
            arc_segments: 72,
            max_candidates: usize::MAX,
        }
    }

    pub fn with_cone(mut self, angle: f64, rotation: f64) -> Self {
        self.angle = angle;
        self.rotation = rotation;
        self
    }

    pub fn is_full_circle(&self) -> bool {
        self.angle >= 360.0
    }
}

/// 掃描輸出
#[derive(Debug, Clone)]
pub struct SweepOutput {
    pub polygon: Polygon,
    /// 實際使用的候選邊數
    pub candidate_count: usize,
    /// 候選邊是否因上限被截斷
    pub truncated: bool,
    /// 原點是否因落在邊上被擾動
    pub origin_perturbed: bool,
}

/// 裁切後參與掃描的邊
#[derive(Debug, Clone)]
struct SweepEdge {
    id: EdgeId,
    a: Point,
    b: Point,
    kind: RestrictionKind,
    /// 逆時針方向的起點頂點
    start: usize,
    end: usize,
    /// 與射線方向平行（張角為零），不進入活動集合
    radial: bool,
}

#[derive(Debug, Clone)]
struct SweepVertex {
    point: Point,
    /// 相對掃描起始方向的極角，範圍 [0, 2π)
    angle: f64,
    distance: f64,
    edges: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Vertex(usize),
    /// 圓弧取樣或邊交點，只發出射線
    Ray,
}

#[derive(Debug, Clone, Copy)]
struct SweepEvent {
    angle: f64,
    distance: f64,
    kind: EventKind,
}

pub struct VisibilitySweep;

impl VisibilitySweep {
    /// 計算單一發射源的可見多邊形
    pub fn compute(config: &SweepConfig, index: &EdgeIndex) -> Result<SweepOutput, VisionError> {
        Self::validate(config)?;

        let mut candidates = index.candidates_in_circle(config.origin, config.radius, config.sense);
        let truncated = Self::cap_candidates(&mut candidates, config);
        let (origin, origin_perturbed) = Self::resolve_origin(config.origin, &candidates);

        let mut state = SweepState::build(origin, config, &candidates, index.vertices());
        let mut points = state.sweep(config);

        if !config.is_full_circle() {
            points.insert(0, origin);
        }

        let mut polygon = Polygon::new(config.origin, config.radius, points);
        polygon.simplify(vertex_tolerance(config.radius) * 100.0);

        Ok(SweepOutput {
            polygon,
            candidate_count: candidates.len(),
            truncated,
            origin_perturbed,
        })
    }

    fn validate(config: &SweepConfig) -> Result<(), VisionError> {
        if !(config.origin.x.is_finite() && config.origin.y.is_finite()) {
            return Err(VisionError::Computation(format!(
                "non-finite sweep origin {:?}", config.origin
            )));
        }
        if !config.radius.is_finite() || config.radius <= 0.0 {
            return Err(VisionError::Computation(format!(
                "sweep radius must be positive, got {}", config.radius
            )));
        }
        if !config.angle.is_finite() || config.angle <= 0.0 {
            return Err(VisionError::Computation(format!(
                "sweep angle must be positive, got {}", config.angle
            )));
        }
        if !config.rotation.is_finite() {
            return Err(VisionError::Computation("non-finite sweep rotation".to_string()));
        }
        Ok(())
    }

    /// 超過上限時只保留最近的候選邊
    fn cap_candidates(candidates: &mut Vec<&Edge>, config: &SweepConfig) -> bool {
        if candidates.len() <= config.max_candidates {
            return false;
        }
        let origin = config.origin;
        candidates.sort_by_key(|edge| {
            (
                OrderedFloat(GeometryUtils::point_to_segment_distance(origin, edge.a, edge.b)),
                edge.id,
            )
        });
        log::warn!(
            "sweep at ({:.1}, {:.1}) truncated {} candidate edges to {}",
            origin.x, origin.y, candidates.len(), config.max_candidates
        );
        candidates.truncate(config.max_candidates);
        true
    }

    /// 原點剛好落在邊上時沿法線微調
    fn resolve_origin(origin: Point, candidates: &[&Edge]) -> (Point, bool) {
        let mut resolved = origin;
        let mut perturbed = false;
        for _ in 0..3 {
            let on_edge = candidates.iter().find(|edge| {
                GeometryUtils::point_to_segment_distance(resolved, edge.a, edge.b) < ORIGIN_ON_EDGE_EPSILON
            });
            match on_edge {
                Some(edge) => {
                    let dir = (edge.b - edge.a).normalized();
                    resolved += Vec2::new(-dir.y, dir.x) * ORIGIN_PERTURBATION;
                    perturbed = true;
                }
                None => break,
            }
        }
        if perturbed {
            log::debug!(
                "sweep origin ({:.3}, {:.3}) lies on an edge, perturbed to ({:.6}, {:.6})",
                origin.x, origin.y, resolved.x, resolved.y
            );
        }
        (resolved, perturbed)
    }
}

/// 單次掃描的工作資料
struct SweepState {
    origin: Point,
    radius: f64,
    /// 起始方向的絕對角度
    start_angle: f64,
    edges: Vec<SweepEdge>,
    vertices: Vec<SweepVertex>,
    /// 與邊交點的角度
    crossings: Vec<(f64, f64)>,
    active: Vec<usize>,
}

impl SweepState {
    fn build(origin: Point, config: &SweepConfig, candidates: &[&Edge], shared: &VertexMap) -> Self {
        let start_angle = if config.is_full_circle() {
            0.0
        } else {
            (config.rotation - config.angle * 0.5).to_radians()
        };

        let mut state = SweepState {
            origin,
            radius: config.radius,
            start_angle,
            edges: Vec::with_capacity(candidates.len()),
            vertices: Vec::new(),
            crossings: Vec::new(),
            active: Vec::new(),
        };

        let mut vertex_lookup: HashMap<VertexKey, usize> = HashMap::new();
        for edge in candidates {
            let kind = edge.restriction_from(config.sense, origin);
            if kind == RestrictionKind::None {
                continue;
            }
            let Some((a, b)) = GeometryUtils::clip_segment_to_circle(edge.a, edge.b, origin, config.radius) else {
                continue;
            };
            state.add_edge(edge.id, a, b, kind, shared, &mut vertex_lookup);
        }

        state.collect_crossings();
        state.seed_active();
        state
    }

    /// 端點先對應到邊索引的共用頂點；裁切在圓周上的端點自成一個頂點
    fn vertex_for(&mut self, p: Point, shared: &VertexMap, lookup: &mut HashMap<VertexKey, usize>) -> usize {
        let (key, p) = match shared.get(p) {
            Some(vertex) => (vertex.key, vertex.point),
            None => (VertexKey::from_point(p), p),
        };
        if let Some(&idx) = lookup.get(&key) {
            return idx;
        }
        let idx = self.vertices.len();
        self.vertices.push(SweepVertex {
            point: p,
            angle: self.relative_angle(p),
            distance: self.origin.distance(p),
            edges: Vec::new(),
        });
        lookup.insert(key, idx);
        idx
    }

    fn relative_angle(&self, p: Point) -> f64 {
        GeometryUtils::normalize_angle(GeometryUtils::angle_of(self.origin, p) - self.start_angle)
    }

    fn add_edge(
        &mut self,
        id: EdgeId,
        a: Point,
        b: Point,
        kind: RestrictionKind,
        shared: &VertexMap,
        lookup: &mut HashMap<VertexKey, usize>,
    ) {
        let va = self.vertex_for(a, shared, lookup);
        let vb = self.vertex_for(b, shared, lookup);
        if va == vb {
            return;
        }
        let (a, b) = (self.vertices[va].point, self.vertices[vb].point);

        let c = GeometryUtils::cross(a - self.origin, b - self.origin);
        let (start, end) = if c > 0.0 { (va, vb) } else { (vb, va) };
        let span = (self.vertices[end].angle - self.vertices[start].angle).rem_euclid(TAU);
        let radial = c.abs() <= GEOMETRY_EPSILON * a.distance(self.origin) * b.distance(self.origin)
            || span <= ANGLE_EPSILON
            || span >= TAU - ANGLE_EPSILON;

        let idx = self.edges.len();
        self.edges.push(SweepEdge {
            id,
            a,
            b,
            kind,
            start,
            end,
            radial,
        });
        self.vertices[va].edges.push(idx);
        self.vertices[vb].edges.push(idx);
    }

    /// 互相交叉的邊在交點處產生額外事件
    fn collect_crossings(&mut self) {
        let n = self.edges.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (ei, ej) = (&self.edges[i], &self.edges[j]);
                if ei.start == ej.start || ei.start == ej.end || ei.end == ej.start || ei.end == ej.end {
                    continue;
                }
                if let Some(p) = GeometryUtils::segments_intersect(ei.a, ei.b, ej.a, ej.b) {
                    let angle = self.relative_angle(p);
                    let distance = self.origin.distance(p);
                    self.crossings.push((angle, distance));
                }
            }
        }
    }

    /// 起始射線上已經被穿過的邊
    fn seed_active(&mut self) {
        for (idx, edge) in self.edges.iter().enumerate() {
            if edge.radial {
                continue;
            }
            if self.vertices[edge.start].angle > self.vertices[edge.end].angle {
                self.active.push(idx);
            }
        }
    }

    fn events(&self, config: &SweepConfig) -> Vec<SweepEvent> {
        let full = config.is_full_circle();
        let width = if full { TAU } else { config.angle.to_radians() };

        let mut events: Vec<SweepEvent> = self
            .vertices
            .iter()
            .enumerate()
            .map(|(idx, v)| SweepEvent {
                angle: v.angle,
                distance: v.distance,
                kind: EventKind::Vertex(idx),
            })
            .collect();

        events.extend(self.crossings.iter().map(|&(angle, distance)| SweepEvent {
            angle,
            distance,
            kind: EventKind::Ray,
        }));

        let per_circle = config.arc_segments.max(8);
        let segments = if full {
            per_circle
        } else {
            ((per_circle as f64) * width / TAU - ANGLE_EPSILON).ceil().max(1.0) as usize
        };
        let step = width / segments as f64;
        let last = if full { segments - 1 } else { segments };
        for k in 0..=last {
            events.push(SweepEvent {
                angle: (k as f64 * step).min(width),
                distance: self.radius,
                kind: EventKind::Ray,
            });
        }

        events.retain(|e| e.angle <= width + ANGLE_EPSILON);
        events.sort_by_key(|e| (OrderedFloat(e.angle), OrderedFloat(e.distance)));
        events
    }

    fn sweep(&mut self, config: &SweepConfig) -> Vec<Point> {
        let full = config.is_full_circle();
        let events = self.events(config);
        let last_angle = events.last().map(|e| e.angle).unwrap_or(0.0);

        let mut points: Vec<Point> = Vec::with_capacity(events.len() * 2);
        let mut i = 0;
        while i < events.len() {
            let group_angle = events[i].angle;
            let mut j = i;
            while j < events.len() && events[j].angle - group_angle <= ANGLE_EPSILON {
                j += 1;
            }
            let group = &events[i..j];
            let is_first = i == 0;
            let is_last = j == events.len();

            let before = self.cast(group_angle);

            // 同角度先移除再插入，避免牆角漏光
            for event in group {
                if let EventKind::Vertex(v) = event.kind {
                    for &e in &self.vertices[v].edges {
                        if self.edges[e].end == v {
                            self.active.retain(|&a| a != e);
                        }
                    }
                }
            }
            for event in group {
                if let EventKind::Vertex(v) = event.kind {
                    for &e in &self.vertices[v].edges {
                        let edge = &self.edges[e];
                        if edge.start == v && !edge.radial && !self.active.contains(&e) {
                            self.active.push(e);
                        }
                    }
                }
            }

            let after = self.cast(group_angle);

            let skip_before = !full && is_first;
            let skip_after = !full && is_last && (last_angle - group_angle).abs() <= ANGLE_EPSILON;
            if !skip_before {
                points.push(before);
            }
            if !skip_after && (skip_before || before.distance(after) > GEOMETRY_EPSILON) {
                points.push(after);
            }

            i = j;
        }
        points
    }

    /// 沿指定相對角度發射射線，回傳邊界點
    fn cast(&self, relative_angle: f64) -> Point {
        let dir = GeometryUtils::direction(self.start_angle + relative_angle);

        let mut hits: Vec<(f64, usize)> = self
            .active
            .iter()
            .map(|&e| {
                let edge = &self.edges[e];
                (
                    GeometryUtils::ray_distance_to_spanning_segment(self.origin, dir, edge.a, edge.b),
                    e,
                )
            })
            .collect();
        hits.sort_by_key(|&(t, e)| (OrderedFloat(t), self.edges[e].id));

        let mut limited_crossings = 0;
        for (t, e) in hits {
            if t >= self.radius {
                break;
            }
            match self.edges[e].kind {
                RestrictionKind::Blocking => return self.origin + dir * t,
                RestrictionKind::Limited => {
                    limited_crossings += 1;
                    if limited_crossings >= 2 {
                        return self.origin + dir * t;
                    }
                }
                RestrictionKind::None => {}
            }
        }
        self.origin + dir * self.radius
    }
}
