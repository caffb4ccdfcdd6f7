/// 場景會話核心
///
/// 一個場景載入期間的所有視野狀態：牆壁索引、發射源表、合成結果與迷霧。
/// 由應用程式擁有並在每幀呼叫 `tick`；發射源之間只以 id 互相參照。
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use hashbrown::HashSet;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::comp::detection::{DetectionContext, DetectionPipeline, DetectionReport, Observer, Target};
use crate::comp::emitter::{Emitter, EmitterConfig, EmitterId, EmitterKind, ViewerId};
use crate::comp::fog::FogExploration;
use crate::config::EngineSetting;
use crate::error::VisionError;
use crate::vision::compositor::{AmbientLight, Compositor, VisibilityState};
use crate::vision::edge_index::EdgeIndex;
use crate::vision::polygon::Polygon;
use crate::vision::quadtree::{Bounds, QuadTree};
use crate::vision::render_output::{GridVisibilityOutput, PolygonUpdate, RenderOutputGenerator};
use crate::vision::sweep::{SweepConfig, SweepOutput, VisibilitySweep};

use super::{FogManager, FogStore, SessionInitializer, SweepScheduler, WallChange, WallEventApplier};

/// 一次掃描工作，持有邊索引快照
#[derive(Debug, Clone)]
pub struct SweepJob {
    pub emitter: EmitterId,
    pub generation: u64,
    pub config: SweepConfig,
    pub edges: Arc<EdgeIndex>,
}

impl SweepJob {
    pub fn run(&self) -> SweepResult {
        SweepResult {
            emitter: self.emitter,
            generation: self.generation,
            outcome: VisibilitySweep::compute(&self.config, &self.edges),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepResult {
    pub emitter: EmitterId,
    pub generation: u64,
    pub outcome: Result<SweepOutput, VisionError>,
}

/// 每個 tick 的摘要，錯誤只以記錄呈現
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub walls_applied: usize,
    pub recomputed: Vec<EmitterId>,
    pub deferred: Vec<EmitterId>,
    /// 世代不符而丟棄的結果數
    pub discarded: usize,
    pub explored_cells: usize,
    pub fog_saved: bool,
    pub errors: Vec<VisionError>,
}

impl TickReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors_of(&self, kind: &str) -> usize {
        self.errors.iter().filter(|e| e.kind_name() == kind).count()
    }
}

pub struct SceneSession {
    scene_id: String,
    setting: EngineSetting,
    world_bounds: Bounds,
    /// 寫入時複製，掃描中的快照不受影響
    edges: Arc<EdgeIndex>,
    emitters: BTreeMap<EmitterId, Emitter>,
    emitter_tree: QuadTree<EmitterId>,
    next_emitter_id: EmitterId,
    pending_walls: Vec<WallChange>,
    wall_rx: Option<Receiver<WallChange>>,
    viewers: HashSet<ViewerId>,
    ambient: AmbientLight,
    ambient_changed: bool,
    visibility: VisibilityState,
    fog: Option<FogManager>,
    /// 迷霧剛掛上或重置，下個 tick 要把目前所有多邊形重新探索一次
    fog_needs_full_explore: bool,
    scheduler: SweepScheduler,
    render_updates: Vec<PolygonUpdate>,
    thread_pool: Option<Arc<ThreadPool>>,
    /// 下個 tick 要回報的錯誤
    pending_errors: Vec<VisionError>,
    tick_count: u64,
}

impl SceneSession {
    pub fn new(scene_id: &str, world_bounds: Bounds, setting: EngineSetting) -> Self {
        let qt = &setting.quadtree;
        let session = Self {
            scene_id: scene_id.to_string(),
            world_bounds,
            edges: Arc::new(EdgeIndex::new(world_bounds, qt)),
            emitters: BTreeMap::new(),
            emitter_tree: QuadTree::new(world_bounds, qt.max_objects, qt.min_node_size, qt.max_depth),
            next_emitter_id: 1,
            pending_walls: Vec::new(),
            wall_rx: None,
            viewers: HashSet::new(),
            ambient: AmbientLight::default(),
            ambient_changed: false,
            visibility: VisibilityState::default(),
            fog: None,
            fog_needs_full_explore: false,
            scheduler: SweepScheduler::new(&setting.budget),
            render_updates: Vec::new(),
            thread_pool: SessionInitializer::optional_thread_pool(&setting.sweep),
            pending_errors: Vec::new(),
            tick_count: 0,
            setting,
        };
        log::info!("scene session {} created", session.scene_id);
        session
    }

    /// 掛上迷霧儲存層並讀取既有記錄
    pub fn attach_fog_store(&mut self, store: Arc<dyn FogStore>, user_id: Option<&str>) {
        let (manager, error) = FogManager::load(store, &self.scene_id, user_id, self.world_bounds, &self.setting.fog);
        if let Some(err) = error {
            self.pending_errors.push(err);
        }
        self.fog = Some(manager);
        self.fog_needs_full_explore = true;
    }

    /// 卸載場景：無條件寫回迷霧
    pub fn teardown(mut self, now: DateTime<Utc>) -> Result<(), VisionError> {
        log::info!("scene session {} torn down after {} ticks", self.scene_id, self.tick_count);
        if let Some(fog) = self.fog.as_mut() {
            fog.flush(now).map_err(|err| {
                log::warn!("final fog save failed for scene {}: {}", self.scene_id, err);
                err
            })?;
        }
        Ok(())
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn setting(&self) -> &EngineSetting {
        &self.setting
    }

    /// 目前邊索引的快照
    pub fn edges(&self) -> Arc<EdgeIndex> {
        self.edges.clone()
    }

    pub fn emitter(&self, id: EmitterId) -> Option<&Emitter> {
        self.emitters.get(&id)
    }

    pub fn emitters(&self) -> impl Iterator<Item = &Emitter> {
        self.emitters.values()
    }

    pub fn visibility(&self) -> &VisibilityState {
        &self.visibility
    }

    pub fn fog(&self) -> Option<&FogExploration> {
        self.fog.as_ref().map(|f| f.exploration())
    }

    pub fn ambient(&self) -> AmbientLight {
        self.ambient
    }

    // ---- 牆壁 ----

    pub fn attach_wall_channel(&mut self, rx: Receiver<WallChange>) {
        self.wall_rx = Some(rx);
    }

    /// 排入佇列，下個 tick 開頭才套用
    pub fn queue_wall_change(&mut self, change: WallChange) {
        self.pending_walls.push(change);
    }

    /// 全部重建四叉樹
    pub fn rebuild_index(&mut self) {
        Arc::make_mut(&mut self.edges).rebuild();
        self.emitter_tree.rebuild();
        log::info!(
            "rebuilt indexes for scene {}: {} edges, {} emitters",
            self.scene_id,
            self.edges.len(),
            self.emitters.len()
        );
    }

    // ---- 發射源 ----

    pub fn create_emitter(&mut self, kind: EmitterKind, config: EmitterConfig) -> Result<EmitterId, VisionError> {
        validate_config(&config)?;
        let id = self.next_emitter_id;
        self.next_emitter_id += 1;
        let emitter = Emitter::new(id, kind, config);
        self.emitter_tree.insert(id, emitter.bounds());
        self.emitters.insert(id, emitter);
        log::debug!("created {:?} emitter {}", kind, id);
        Ok(id)
    }

    pub fn move_emitter(&mut self, id: EmitterId, origin: vek::Vec2<f64>) -> Result<(), VisionError> {
        if !(origin.x.is_finite() && origin.y.is_finite()) {
            return Err(VisionError::Configuration(format!("emitter {} moved to non-finite origin", id)));
        }
        let emitter = self.emitter_mut(id)?;
        emitter.move_to(origin);
        let bounds = emitter.bounds();
        self.emitter_tree.update(id, bounds);
        Ok(())
    }

    pub fn update_emitter(&mut self, id: EmitterId, config: EmitterConfig) -> Result<(), VisionError> {
        validate_config(&config)?;
        let emitter = self.emitter_mut(id)?;
        emitter.reconfigure(config);
        let bounds = emitter.bounds();
        self.emitter_tree.update(id, bounds);
        Ok(())
    }

    pub fn set_emitter_active(&mut self, id: EmitterId, active: bool) -> Result<(), VisionError> {
        self.emitter_mut(id)?.set_active(active);
        Ok(())
    }

    /// 移除發射源；進行中的計算結果會因找不到發射源而丟棄
    pub fn destroy_emitter(&mut self, id: EmitterId) -> Option<Emitter> {
        let emitter = self.emitters.remove(&id)?;
        self.emitter_tree.remove(&id);
        self.scheduler.forget(id);
        self.render_updates
            .push(PolygonUpdate::removed(id, emitter.kind, emitter.generation + 1));
        log::debug!("destroyed emitter {}", id);
        Some(emitter)
    }

    fn emitter_mut(&mut self, id: EmitterId) -> Result<&mut Emitter, VisionError> {
        self.emitters
            .get_mut(&id)
            .ok_or_else(|| VisionError::Configuration(format!("unknown emitter {}", id)))
    }

    // ---- 合成參數 ----

    pub fn set_ambient(&mut self, ambient: AmbientLight) {
        if self.ambient != ambient {
            self.ambient = ambient;
            self.ambient_changed = true;
        }
    }

    /// 空集合表示所有視野都算
    pub fn set_viewers(&mut self, viewers: impl IntoIterator<Item = ViewerId>) {
        self.viewers = viewers.into_iter().collect();
    }

    // ---- tick ----

    /// 套用排隊的牆壁變更、標記受影響的發射源並依預算排程，
    /// 回傳本 tick 要執行的掃描工作
    pub fn prepare_sweeps(&mut self, report: &mut TickReport) -> Vec<SweepJob> {
        self.apply_wall_changes(report);

        if self.ambient_changed {
            self.ambient_changed = false;
            for emitter in self.emitters.values_mut() {
                if emitter.profile().ambient_sensitive {
                    emitter.invalidate();
                }
            }
        }

        // 停用的發射源不需要掃描
        let mut dirty = Vec::new();
        for emitter in self.emitters.values_mut() {
            if !emitter.dirty {
                continue;
            }
            if emitter.active {
                dirty.push((emitter.id, emitter.config.priority));
            } else {
                let generation = emitter.generation;
                let origin = emitter.origin();
                emitter.apply_polygon(generation, Polygon::empty(origin), None);
                self.render_updates.push(PolygonUpdate::from_emitter(emitter));
            }
        }

        let schedule = self.scheduler.plan(&dirty);
        if !schedule.deferred.is_empty() {
            let err = VisionError::Capacity(format!(
                "{} emitters deferred, budget is {} sweeps per tick",
                schedule.deferred.len(),
                self.scheduler.budget()
            ));
            log::warn!("{}", err);
            report.errors.push(err);
        }
        report.deferred = schedule.deferred;

        let sweep_setting = &self.setting.sweep;
        schedule
            .run
            .iter()
            .filter_map(|id| self.emitters.get(id))
            .map(|emitter| SweepJob {
                emitter: emitter.id,
                generation: emitter.generation,
                config: emitter.sweep_config(sweep_setting),
                edges: self.edges.clone(),
            })
            .collect()
    }

    /// 執行掃描工作；結果順序與工作順序相同
    pub fn run_sweeps(&self, jobs: &[SweepJob]) -> Vec<SweepResult> {
        match &self.thread_pool {
            Some(pool) if jobs.len() > 1 => pool.install(|| jobs.par_iter().map(SweepJob::run).collect()),
            _ => jobs.iter().map(SweepJob::run).collect(),
        }
    }

    /// 依發射源 id 順序套用結果，世代不符者丟棄
    pub fn apply_sweeps(&mut self, mut results: Vec<SweepResult>, report: &mut TickReport) {
        results.sort_by_key(|r| r.emitter);
        for result in results {
            let Some(emitter) = self.emitters.get_mut(&result.emitter) else {
                report.discarded += 1;
                continue;
            };
            let (polygon, error) = match result.outcome {
                Ok(output) => {
                    if output.truncated {
                        report.errors.push(VisionError::Capacity(format!(
                            "emitter {} considered only {} candidate edges",
                            emitter.id, output.candidate_count
                        )));
                    }
                    (output.polygon, None)
                }
                Err(err) => {
                    log::warn!("emitter {} sweep failed: {}", emitter.id, err);
                    report.errors.push(err.clone());
                    (Polygon::empty(emitter.origin()), Some(err))
                }
            };
            if emitter.apply_polygon(result.generation, polygon, error) {
                report.recomputed.push(emitter.id);
                self.render_updates.push(PolygonUpdate::from_emitter(emitter));
            } else {
                log::debug!(
                    "discarding stale sweep for emitter {} (generation {} != {})",
                    emitter.id,
                    result.generation,
                    emitter.generation
                );
                report.discarded += 1;
            }
        }
    }

    /// 每幀呼叫一次；任何錯誤都只會出現在回報中
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        self.tick_count += 1;
        let mut report = TickReport {
            tick: self.tick_count,
            errors: std::mem::take(&mut self.pending_errors),
            ..Default::default()
        };

        let jobs = self.prepare_sweeps(&mut report);
        let results = self.run_sweeps(&jobs);
        self.apply_sweeps(results, &mut report);

        self.visibility = Compositor::composite(self.emitters.values(), &self.viewers, self.ambient);

        if let Some(fog) = self.fog.as_mut() {
            let explore_ids: Vec<EmitterId> = if std::mem::take(&mut self.fog_needs_full_explore) {
                self.emitters.keys().copied().collect()
            } else {
                report.recomputed.clone()
            };
            for id in &explore_ids {
                if let Some(emitter) = self.emitters.get(id) {
                    let relevant = self.viewers.is_empty()
                        || emitter.config.viewer.map_or(false, |v| self.viewers.contains(&v));
                    if relevant {
                        report.explored_cells += fog.explore(emitter);
                    }
                }
            }
            match fog.maybe_persist(now) {
                Ok(saved) => report.fog_saved = saved,
                Err(err) => {
                    log::warn!("fog save skipped for scene {}: {}", self.scene_id, err);
                    report.errors.push(err);
                }
            }
        }

        if !report.recomputed.is_empty() {
            log::debug!(
                "tick {}: {} recomputed, {} deferred, {} discarded",
                report.tick,
                report.recomputed.len(),
                report.deferred.len(),
                report.discarded
            );
        }
        report
    }

    fn apply_wall_changes(&mut self, report: &mut TickReport) {
        if let Some(rx) = &self.wall_rx {
            self.pending_walls.extend(rx.try_iter());
        }
        if self.pending_walls.is_empty() {
            return;
        }
        let changes = std::mem::take(&mut self.pending_walls);
        report.walls_applied = changes.len();

        let applied = WallEventApplier::apply(Arc::make_mut(&mut self.edges), changes);
        report.errors.extend(applied.errors.iter().cloned());

        // 廣域查詢後再做精確的線段與圓測試
        for (a, b) in &applied.touched {
            let Some(bounds) = Bounds::from_points(&[*a, *b]) else {
                continue;
            };
            for id in self.emitter_tree.query(&bounds) {
                if let Some(emitter) = self.emitters.get_mut(&id) {
                    if emitter.touches_segment(*a, *b) {
                        emitter.invalidate();
                    }
                }
            }
        }
    }

    // ---- 輸出 ----

    pub fn drain_render_updates(&mut self) -> Vec<PolygonUpdate> {
        std::mem::take(&mut self.render_updates)
    }

    pub fn grid_output(&self, cell_size: f64) -> GridVisibilityOutput {
        RenderOutputGenerator::new(cell_size).generate_grid_output(&self.visibility, self.fog(), self.world_bounds)
    }

    pub fn reset_fog(&mut self) {
        if let Some(fog) = self.fog.as_mut() {
            fog.reset();
            self.fog_needs_full_explore = true;
        }
    }

    // ---- 偵測 ----

    pub fn detect(&self, observer: &Observer, target: &Target) -> DetectionReport {
        DetectionPipeline::evaluate(&self.detection_context(), observer, target)
    }

    pub fn can_detect(&self, observer: &Observer, target: &Target) -> bool {
        DetectionPipeline::can_detect(&self.detection_context(), observer, target)
    }

    fn detection_context(&self) -> DetectionContext<'_> {
        DetectionContext {
            edges: &self.edges,
            emitters: &self.emitters,
            visibility: &self.visibility,
        }
    }
}

fn validate_config(config: &EmitterConfig) -> Result<(), VisionError> {
    let finite = config.origin.x.is_finite()
        && config.origin.y.is_finite()
        && config.radius.is_finite()
        && config.angle.is_finite()
        && config.rotation.is_finite();
    if !finite {
        return Err(VisionError::Configuration(format!(
            "emitter config has non-finite values: {:?}", config
        )));
    }
    Ok(())
}
