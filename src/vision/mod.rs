/// 視野計算模組
///
/// 幾何工具、四叉樹、邊索引、掃描演算法、合成與渲染輸出
pub mod compositor;
pub mod edge_index;
pub mod geometry_utils;
pub mod polygon;
pub mod quadtree;
pub mod render_output;
pub mod sweep;

#[cfg(test)]
mod compositor_tests;

pub use self::{
    compositor::*,
    edge_index::EdgeIndex,
    geometry_utils::{GeometryUtils, Point},
    polygon::Polygon,
    quadtree::{Bounds, QuadTree},
    render_output::*,
    sweep::{SweepConfig, SweepOutput, VisibilitySweep},
};
