use std::f64::consts::PI;
use vek::Vec2;

/// 場景中的二維座標
pub type Point = Vec2<f64>;

/// 幾何比較容差
pub const GEOMETRY_EPSILON: f64 = 1e-9;

const TAU: f64 = 2.0 * PI;

pub struct GeometryUtils;

impl GeometryUtils {
    /// 二維叉積（有號面積的兩倍）
    #[inline]
    pub fn cross(a: Point, b: Point) -> f64 {
        a.x * b.y - a.y * b.x
    }

    /// 點 p 相對有向線段 a→b 的方位：正值在左側，負值在右側
    #[inline]
    pub fn orientation(a: Point, b: Point, p: Point) -> f64 {
        Self::cross(b - a, p - a)
    }

    /// 標準化角度到 [0, 2π) 範圍
    pub fn normalize_angle(angle: f64) -> f64 {
        let a = angle.rem_euclid(TAU);
        // rem_euclid 可能因捨入回傳 TAU 本身
        if a >= TAU - GEOMETRY_EPSILON {
            0.0
        } else {
            a
        }
    }

    /// 檢查角度是否在扇形範圍內
    pub fn angle_in_sector(angle: f64, start_angle: f64, end_angle: f64) -> bool {
        let norm_angle = Self::normalize_angle(angle);
        let norm_start = Self::normalize_angle(start_angle);
        let norm_end = Self::normalize_angle(end_angle);

        if norm_start <= norm_end {
            norm_angle >= norm_start && norm_angle <= norm_end
        } else {
            norm_angle >= norm_start || norm_angle <= norm_end
        }
    }

    /// 計算角度差（考慮環形性質），結果在 (-π, π]
    pub fn angle_difference(angle1: f64, angle2: f64) -> f64 {
        let diff = (angle2 - angle1).rem_euclid(TAU);
        if diff > PI {
            diff - TAU
        } else {
            diff
        }
    }

    /// 計算點到線段的最短距離
    pub fn point_to_segment_distance(point: Point, seg_start: Point, seg_end: Point) -> f64 {
        let seg = seg_end - seg_start;
        let to_point = point - seg_start;

        let len_sq = seg.magnitude_squared();
        if len_sq == 0.0 {
            return to_point.magnitude();
        }

        let t = (to_point.dot(seg) / len_sq).max(0.0).min(1.0);
        let projection = seg_start + seg * t;
        (point - projection).magnitude()
    }

    /// 檢查點是否在圓形內
    pub fn point_in_circle(point: Point, center: Point, radius: f64) -> bool {
        point.distance_squared(center) <= radius * radius
    }

    /// 線段相交檢測，回傳交點
    pub fn segments_intersect(p1: Point, q1: Point, p2: Point, q2: Point) -> Option<Point> {
        let d1 = q1 - p1;
        let d2 = q2 - p2;
        let denom = Self::cross(d1, d2);

        if denom.abs() < GEOMETRY_EPSILON {
            return None; // 平行線段
        }

        let diff = p2 - p1;
        let t1 = Self::cross(diff, d2) / denom;
        let t2 = Self::cross(diff, d1) / denom;

        if (-GEOMETRY_EPSILON..=1.0 + GEOMETRY_EPSILON).contains(&t1)
            && (-GEOMETRY_EPSILON..=1.0 + GEOMETRY_EPSILON).contains(&t2)
        {
            Some(p1 + d1 * t1)
        } else {
            None
        }
    }

    /// 射線與線段相交，回傳沿射線的距離 t（direction 為單位向量）
    pub fn ray_segment_intersection(
        ray_origin: Point,
        ray_direction: Point,
        seg_start: Point,
        seg_end: Point,
    ) -> Option<f64> {
        let seg_direction = seg_end - seg_start;
        let denom = Self::cross(ray_direction, seg_direction);

        if denom.abs() < GEOMETRY_EPSILON {
            return None;
        }

        let to_start = seg_start - ray_origin;
        let t = Self::cross(to_start, seg_direction) / denom;
        let u = Self::cross(to_start, ray_direction) / denom;

        if t >= 0.0 && u >= -GEOMETRY_EPSILON && u <= 1.0 + GEOMETRY_EPSILON {
            Some(t)
        } else {
            None
        }
    }

    /// 已知射線穿過線段張角時的距離；射線與線段平行時取較近端點
    pub fn ray_distance_to_spanning_segment(
        ray_origin: Point,
        ray_direction: Point,
        seg_start: Point,
        seg_end: Point,
    ) -> f64 {
        let seg_direction = seg_end - seg_start;
        let denom = Self::cross(ray_direction, seg_direction);
        if denom.abs() < GEOMETRY_EPSILON {
            return ray_origin
                .distance(seg_start)
                .min(ray_origin.distance(seg_end));
        }
        let t = Self::cross(seg_start - ray_origin, seg_direction) / denom;
        t.max(0.0)
    }

    /// 把線段裁切到圓內，回傳圓內部分；完全在圓外時回傳 None
    pub fn clip_segment_to_circle(
        seg_start: Point,
        seg_end: Point,
        center: Point,
        radius: f64,
    ) -> Option<(Point, Point)> {
        let d = seg_end - seg_start;
        let f = seg_start - center;
        let a = d.dot(d);
        if a == 0.0 {
            return None;
        }
        let b = 2.0 * f.dot(d);
        let c = f.dot(f) - radius * radius;
        let discriminant = b * b - 4.0 * a * c;
        if discriminant <= 0.0 {
            return None;
        }
        let sqrt_disc = discriminant.sqrt();
        let t0 = ((-b - sqrt_disc) / (2.0 * a)).max(0.0);
        let t1 = ((-b + sqrt_disc) / (2.0 * a)).min(1.0);
        if t1 - t0 <= GEOMETRY_EPSILON {
            return None;
        }
        let clipped_start = if t0 > 0.0 { seg_start + d * t0 } else { seg_start };
        let clipped_end = if t1 < 1.0 { seg_start + d * t1 } else { seg_end };
        Some((clipped_start, clipped_end))
    }

    /// 線段是否與圓相交或位於圓內
    pub fn segment_touches_circle(seg_start: Point, seg_end: Point, center: Point, radius: f64) -> bool {
        Self::point_to_segment_distance(center, seg_start, seg_end) <= radius
    }

    /// 三點共線檢查（以面積相對邊長判斷）
    pub fn is_collinear(a: Point, b: Point, c: Point, tolerance: f64) -> bool {
        let base = a.distance(c);
        if base <= GEOMETRY_EPSILON {
            return true;
        }
        (Self::orientation(a, c, b).abs() / base) <= tolerance
    }

    /// 以單位方向向量表示的角度
    #[inline]
    pub fn direction(angle: f64) -> Point {
        Vec2::new(angle.cos(), angle.sin())
    }

    /// 點相對原點的極角
    #[inline]
    pub fn angle_of(origin: Point, p: Point) -> f64 {
        (p.y - origin.y).atan2(p.x - origin.x)
    }
}
