/// 場景會話整合測試
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use vek::Vec2;

use sightline::comp::detection::{DetectionMode, DetectionModeId, DetectionState, Observer, Target};
use sightline::comp::edge::Sense;
use sightline::comp::emitter::{EmitterConfig, EmitterKind};
use sightline::config::EngineSetting;
use sightline::error::VisionError;
use sightline::state::{FogStore, MemoryFogStore, SceneSession, TickReport, WallChange, WallData};
use sightline::vision::compositor::AmbientLight;
use sightline::vision::quadtree::Bounds;
use sightline::vision::render_output::VisibilityLevel;

fn world() -> Bounds {
    Bounds::new(Vec2::new(0.0, 0.0), Vec2::new(1000.0, 1000.0))
}

fn serial_setting() -> EngineSetting {
    let mut setting = EngineSetting::default();
    setting.sweep.parallel = false;
    setting
}

fn at(x: f64, y: f64) -> Vec2<f64> {
    Vec2::new(x, y)
}

fn wall(id: u64, a: [f64; 2], b: [f64; 2]) -> WallChange {
    WallChange::Created(WallData::new(id, a, b))
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

struct BrokenStore;

impl FogStore for BrokenStore {
    fn load_fog_blob(&self, _: &str, _: Option<&str>) -> Result<Option<Vec<u8>>, VisionError> {
        Err(VisionError::Persistence("database unavailable".to_string()))
    }

    fn save_fog_blob(&self, _: &str, _: Option<&str>, _: &[u8]) -> Result<(), VisionError> {
        Err(VisionError::Persistence("database unavailable".to_string()))
    }
}

#[test]
fn test_wall_events_recompute_only_affected_emitters() {
    let mut session = SceneSession::new("keep", world(), EngineSetting::default());
    let (tx, rx) = crossbeam_channel::unbounded();
    session.attach_wall_channel(rx);

    let near = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(100.0, 100.0), 50.0)).unwrap();
    let far = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(800.0, 800.0), 50.0)).unwrap();
    let report = session.tick(t0());
    assert_eq!(report.recomputed, vec![near, far]);
    assert!(session.visibility().is_visible(at(140.0, 100.0)));

    tx.send(wall(1, [120.0, 50.0], [120.0, 150.0])).unwrap();
    let report = session.tick(t0());
    assert_eq!(report.walls_applied, 1);
    assert_eq!(report.recomputed, vec![near]);
    assert!(session.visibility().is_visible(at(110.0, 100.0)));
    assert!(!session.visibility().is_visible(at(140.0, 100.0)));

    // 刪除後恢復
    tx.send(WallChange::Deleted { id: 1 }).unwrap();
    let report = session.tick(t0());
    assert_eq!(report.recomputed, vec![near]);
    assert!(session.visibility().is_visible(at(140.0, 100.0)));

    // 沒有變更時不重算
    let report = session.tick(t0());
    assert!(report.recomputed.is_empty());
    assert!(!report.has_errors());
}

#[test]
fn test_wall_moved_away_invalidates_old_neighbourhood() {
    let mut session = SceneSession::new("move", world(), serial_setting());
    let id = session.create_emitter(EmitterKind::Light, EmitterConfig::new(at(100.0, 100.0), 50.0)).unwrap();
    session.queue_wall_change(wall(1, [120.0, 50.0], [120.0, 150.0]));
    session.tick(t0());
    let generation = session.emitter(id).unwrap().generation;

    session.queue_wall_change(WallChange::Updated(WallData::new(1, [600.0, 50.0], [600.0, 150.0])));
    let report = session.tick(t0());
    assert_eq!(report.recomputed, vec![id]);
    assert!(session.emitter(id).unwrap().generation > generation);
    assert!(session.emitter(id).unwrap().polygon.contains_point(at(140.0, 100.0)));
}

#[test]
fn test_stale_sweep_results_are_discarded() {
    let mut session = SceneSession::new("stale", world(), serial_setting());
    let id = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(200.0, 200.0), 80.0)).unwrap();

    let mut report = TickReport::default();
    let jobs = session.prepare_sweeps(&mut report);
    assert_eq!(jobs.len(), 1);
    let results = session.run_sweeps(&jobs);

    // 計算途中被移動
    session.move_emitter(id, at(600.0, 600.0)).unwrap();
    session.apply_sweeps(results, &mut report);
    assert_eq!(report.discarded, 1);
    assert!(report.recomputed.is_empty());
    let emitter = session.emitter(id).unwrap();
    assert!(emitter.dirty);
    assert!(emitter.polygon.is_empty());

    let report = session.tick(t0());
    assert_eq!(report.recomputed, vec![id]);
    let emitter = session.emitter(id).unwrap();
    assert!(emitter.polygon.contains_point(at(600.0, 620.0)));
    assert!(!emitter.polygon.contains_point(at(200.0, 200.0)));
}

#[test]
fn test_destroyed_emitter_results_are_dropped() {
    let mut session = SceneSession::new("destroy", world(), serial_setting());
    let id = session.create_emitter(EmitterKind::Sound, EmitterConfig::new(at(300.0, 300.0), 60.0)).unwrap();

    let mut report = TickReport::default();
    let jobs = session.prepare_sweeps(&mut report);
    let results = session.run_sweeps(&jobs);
    assert!(session.destroy_emitter(id).is_some());
    assert!(session.destroy_emitter(id).is_none());
    session.apply_sweeps(results, &mut report);
    assert_eq!(report.discarded, 1);

    let updates = session.drain_render_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].emitter, id);
    assert!(!updates[0].active);
    assert!(updates[0].points.is_empty());
    assert!(session.move_emitter(id, at(0.0, 0.0)).is_err());
}

#[test]
fn test_errors_are_reported_not_raised() {
    let mut session = SceneSession::new("errors", world(), serial_setting());
    session.attach_fog_store(Arc::new(BrokenStore), Some("player"));

    let err = session
        .create_emitter(EmitterKind::Vision, EmitterConfig::new(at(f64::NAN, 0.0), 10.0))
        .unwrap_err();
    assert_eq!(err.kind_name(), "configuration");

    let degenerate = session.create_emitter(EmitterKind::Light, EmitterConfig::new(at(100.0, 100.0), 0.0)).unwrap();
    let healthy = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(500.0, 500.0), 50.0)).unwrap();
    session.queue_wall_change(wall(1, [10.0, 10.0], [10.0, 10.0]));
    session.queue_wall_change(wall(2, [480.0, 400.0], [480.0, 600.0]));

    let report = session.tick(t0());
    assert_eq!(report.walls_applied, 2);
    assert_eq!(report.errors_of("configuration"), 1);
    assert_eq!(report.errors_of("computation"), 1);
    // 讀取失敗一次，存檔失敗一次
    assert_eq!(report.errors_of("persistence"), 2);
    assert_eq!(report.recomputed, vec![degenerate, healthy]);

    let broken = session.emitter(degenerate).unwrap();
    assert!(broken.polygon.is_empty());
    assert!(matches!(broken.last_error, Some(VisionError::Computation(_))));
    assert!(!session.emitter(healthy).unwrap().polygon.is_empty());
    assert_eq!(session.edges().len(), 1);

    assert!(session.teardown(t0() + Duration::seconds(1)).is_err());
}

#[test]
fn test_budget_defers_and_catches_up() {
    let mut setting = serial_setting();
    setting.budget.max_sweeps_per_tick = 2;
    let mut session = SceneSession::new("budget", world(), setting);
    let ids: Vec<_> = (0..5)
        .map(|i| {
            let origin = at(100.0 + i as f64 * 150.0, 500.0);
            session.create_emitter(EmitterKind::Vision, EmitterConfig::new(origin, 40.0)).unwrap()
        })
        .collect();

    let report = session.tick(t0());
    assert_eq!(report.recomputed, ids[0..2].to_vec());
    assert_eq!(report.deferred.len(), 3);
    assert_eq!(report.errors_of("capacity"), 1);

    let report = session.tick(t0());
    assert_eq!(report.recomputed, ids[2..4].to_vec());
    assert_eq!(report.errors_of("capacity"), 1);

    let report = session.tick(t0());
    assert_eq!(report.recomputed, vec![ids[4]]);
    assert!(!report.has_errors());
    assert!(session.emitters().all(|e| !e.dirty));
}

#[test]
fn test_priority_goes_first() {
    let mut setting = serial_setting();
    setting.budget.max_sweeps_per_tick = 1;
    let mut session = SceneSession::new("priority", world(), setting);
    session.create_emitter(EmitterKind::Light, EmitterConfig::new(at(100.0, 100.0), 40.0)).unwrap();
    let urgent = session
        .create_emitter(EmitterKind::Vision, EmitterConfig::new(at(300.0, 100.0), 40.0).with_priority(10))
        .unwrap();
    assert_eq!(session.tick(t0()).recomputed, vec![urgent]);
}

#[test]
fn test_candidate_cap_is_a_capacity_warning() {
    let mut setting = serial_setting();
    setting.sweep.max_candidate_edges = 1;
    let mut session = SceneSession::new("cap", world(), setting);
    session.queue_wall_change(wall(1, [120.0, 50.0], [120.0, 150.0]));
    session.queue_wall_change(wall(2, [80.0, 50.0], [80.0, 150.0]));
    let id = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(100.0, 100.0), 50.0)).unwrap();

    let report = session.tick(t0());
    assert_eq!(report.recomputed, vec![id]);
    assert_eq!(report.errors_of("capacity"), 1);
    assert!(!session.emitter(id).unwrap().polygon.is_empty());
}

#[test]
fn test_ambient_change_recomputes_light_sources() {
    let mut session = SceneSession::new("night", world(), serial_setting());
    let light = session.create_emitter(EmitterKind::Light, EmitterConfig::new(at(100.0, 100.0), 50.0)).unwrap();
    let dark = session.create_emitter(EmitterKind::Darkness, EmitterConfig::new(at(300.0, 100.0), 50.0)).unwrap();
    session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(500.0, 100.0), 50.0)).unwrap();
    session.tick(t0());
    assert!(session.visibility().is_illuminated(at(700.0, 700.0)));
    assert!(!session.visibility().is_illuminated(at(300.0, 100.0)));

    session.set_ambient(AmbientLight::new(0.8));
    let report = session.tick(t0());
    assert_eq!(report.recomputed, vec![light, dark]);
    assert!(!session.visibility().is_illuminated(at(700.0, 700.0)));
    assert!(session.visibility().is_illuminated(at(100.0, 100.0)));

    session.set_ambient(AmbientLight::new(0.8));
    assert!(session.tick(t0()).recomputed.is_empty());
    assert_eq!(session.ambient().darkness, 0.8);
}

#[test]
fn test_inactive_emitters_publish_empty_polygons() {
    let mut session = SceneSession::new("toggle", world(), serial_setting());
    let id = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(100.0, 100.0), 50.0)).unwrap();
    session.tick(t0());
    let updates = session.drain_render_updates();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].active && !updates[0].points.is_empty());
    assert!(session.drain_render_updates().is_empty());

    session.set_emitter_active(id, false).unwrap();
    let report = session.tick(t0());
    assert!(report.recomputed.is_empty());
    assert!(!session.visibility().is_visible(at(100.0, 100.0)));
    let updates = session.drain_render_updates();
    assert_eq!(updates.len(), 1);
    assert!(!updates[0].active);
    assert!(updates[0].points.is_empty());

    session.set_emitter_active(id, true).unwrap();
    assert_eq!(session.tick(t0()).recomputed, vec![id]);
    assert!(session.visibility().is_visible(at(100.0, 100.0)));
}

#[test]
fn test_fog_explores_saves_and_reloads() {
    let store = Arc::new(MemoryFogStore::new());
    let mut session = SceneSession::new("dungeon", world(), serial_setting());
    session.attach_fog_store(store.clone(), Some("player"));
    let id = session
        .create_emitter(EmitterKind::Vision, EmitterConfig::new(at(500.0, 500.0), 100.0).with_viewer(1))
        .unwrap();

    let report = session.tick(t0());
    assert!(report.explored_cells > 0);
    assert!(report.fog_saved);
    assert_eq!(store.save_count(), 1);

    let report = session.tick(t0() + Duration::milliseconds(10));
    assert_eq!(report.explored_cells, 0);
    assert!(!report.fog_saved);

    // 間隔內只記錄不存檔
    session.move_emitter(id, at(750.0, 500.0)).unwrap();
    let report = session.tick(t0() + Duration::milliseconds(100));
    assert!(report.explored_cells > 0);
    assert!(!report.fog_saved);
    assert_eq!(store.save_count(), 1);

    let fog = session.fog().unwrap();
    let explored = fog.explored_count();
    assert!(fog.explored_at(at(500.0, 500.0)));
    assert!(fog.explored_at(at(750.0, 500.0)));

    let grid = session.grid_output(50.0);
    assert_eq!(grid.level_at(15, 10), Some(VisibilityLevel::Visible));
    assert_eq!(grid.level_at(10, 10), Some(VisibilityLevel::Explored));
    assert_eq!(grid.level_at(1, 1), Some(VisibilityLevel::Unexplored));

    session.teardown(t0() + Duration::milliseconds(200)).unwrap();
    assert_eq!(store.save_count(), 2);

    let mut reloaded = SceneSession::new("dungeon", world(), serial_setting());
    reloaded.attach_fog_store(store.clone(), Some("player"));
    assert_eq!(reloaded.fog().unwrap().explored_count(), explored);
    assert!(!reloaded.tick(t0()).has_errors());

    reloaded.reset_fog();
    assert_eq!(reloaded.fog().unwrap().explored_count(), 0);
}

#[test]
fn test_attached_or_reset_fog_takes_current_view() {
    let mut session = SceneSession::new("late-fog", world(), serial_setting());
    session
        .create_emitter(EmitterKind::Vision, EmitterConfig::new(at(300.0, 300.0), 80.0))
        .unwrap();
    session
        .create_emitter(EmitterKind::Light, EmitterConfig::new(at(700.0, 700.0), 80.0))
        .unwrap();
    assert_eq!(session.tick(t0()).recomputed.len(), 2);

    // 掛上迷霧時沒有發射源需要重算，仍要記下目前看到的區域
    session.attach_fog_store(Arc::new(MemoryFogStore::new()), Some("player"));
    let report = session.tick(t0() + Duration::milliseconds(10));
    assert!(report.recomputed.is_empty());
    assert!(report.explored_cells > 0);
    let fog = session.fog().unwrap();
    assert!(fog.explored_at(at(300.0, 300.0)));
    assert!(!fog.explored_at(at(700.0, 700.0)));
    let explored = fog.explored_count();

    session.reset_fog();
    assert_eq!(session.fog().unwrap().explored_count(), 0);
    let report = session.tick(t0() + Duration::milliseconds(20));
    assert!(report.recomputed.is_empty());
    assert_eq!(session.fog().unwrap().explored_count(), explored);

    let report = session.tick(t0() + Duration::milliseconds(30));
    assert_eq!(report.explored_cells, 0);
}

#[test]
fn test_viewers_limit_visibility_and_exploration() {
    let store = Arc::new(MemoryFogStore::new());
    let mut session = SceneSession::new("party", world(), serial_setting());
    session.attach_fog_store(store, Some("player-7"));
    session.set_viewers([7]);
    session
        .create_emitter(EmitterKind::Vision, EmitterConfig::new(at(200.0, 200.0), 50.0).with_viewer(8))
        .unwrap();
    session
        .create_emitter(EmitterKind::Vision, EmitterConfig::new(at(800.0, 800.0), 50.0).with_viewer(7))
        .unwrap();
    session.tick(t0());

    assert!(session.visibility().is_visible(at(800.0, 800.0)));
    assert!(!session.visibility().is_visible(at(200.0, 200.0)));
    let fog = session.fog().unwrap();
    assert!(fog.explored_at(at(800.0, 800.0)));
    assert!(!fog.explored_at(at(200.0, 200.0)));
}

#[test]
fn test_detection_through_session() {
    let mut session = SceneSession::new("detect", world(), serial_setting());
    session.queue_wall_change(wall(1, [120.0, 0.0], [120.0, 300.0]));
    let eyes = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(100.0, 100.0), 200.0)).unwrap();
    session.tick(t0());

    let observer = Observer::new(1, at(100.0, 100.0))
        .with_mode(DetectionMode::builtin(DetectionModeId::BasicSight, 200.0))
        .with_mode(DetectionMode::builtin(DetectionModeId::FeelTremor, 150.0))
        .with_emitter(Sense::Sight, eyes);

    let behind = Target::new(10, at(200.0, 100.0));
    let report = session.detect(&observer, &behind);
    assert_eq!(
        report.states,
        vec![
            (DetectionModeId::BasicSight, DetectionState::Blocked),
            (DetectionModeId::FeelTremor, DetectionState::Detected),
        ]
    );

    let mut flying = behind.clone();
    flying.grounded = false;
    assert!(!session.can_detect(&observer, &flying));

    let in_front = Target::new(11, at(100.0, 280.0));
    assert_eq!(session.detect(&observer, &in_front).detected_by(), Some(DetectionModeId::BasicSight));

    let far = Target::new(12, at(100.0, 320.0));
    let report = session.detect(&observer, &far);
    assert_eq!(
        report.states,
        vec![
            (DetectionModeId::BasicSight, DetectionState::OutOfRange),
            (DetectionModeId::FeelTremor, DetectionState::OutOfRange),
        ]
    );
}

#[test]
fn test_rebuild_after_many_removals() {
    let mut session = SceneSession::new("rebuild", world(), serial_setting());
    for i in 0..60u64 {
        let x = 10.0 + (i % 10) as f64 * 95.0;
        let y = 10.0 + (i / 10) as f64 * 150.0;
        session.queue_wall_change(wall(i, [x, y], [x + 40.0, y + 20.0]));
    }
    let id = session.create_emitter(EmitterKind::Vision, EmitterConfig::new(at(500.0, 500.0), 300.0)).unwrap();
    session.tick(t0());
    for i in 0..55u64 {
        session.queue_wall_change(WallChange::Deleted { id: i });
    }
    let report = session.tick(t0());
    assert_eq!(report.walls_applied, 55);
    assert_eq!(report.recomputed, vec![id]);

    let before = session.emitter(id).unwrap().polygon.clone();
    session.rebuild_index();
    assert_eq!(session.edges().len(), 5);
    assert!(session.tick(t0()).recomputed.is_empty());

    session.update_emitter(id, EmitterConfig::new(at(500.0, 500.0), 300.0).with_cone(359.0, 0.0)).unwrap();
    session.update_emitter(id, EmitterConfig::new(at(500.0, 500.0), 300.0)).unwrap();
    assert_eq!(session.tick(t0()).recomputed, vec![id]);
    assert_eq!(session.emitter(id).unwrap().polygon.points, before.points);
}

#[test]
fn test_wall_events_from_json() {
    let changes: Vec<WallChange> = serde_json::from_str(
        r#"[
            {"event":"created","id":3,"a":[0.0,0.0],"b":[10.0,0.0],"door":"closed"},
            {"event":"updated","id":3,"a":[0.0,0.0],"b":[20.0,0.0],"restrictions":{"sight":"limited"}},
            {"event":"deleted","id":3}
        ]"#,
    )
    .unwrap();
    assert_eq!(changes.len(), 3);
    assert_eq!(changes.iter().map(WallChange::id).collect::<Vec<_>>(), vec![3, 3, 3]);

    let mut session = SceneSession::new("json", world(), serial_setting());
    for change in changes.into_iter().take(2) {
        session.queue_wall_change(change);
    }
    let report = session.tick(t0());
    assert_eq!(report.walls_applied, 2);
    assert_eq!(session.edges().len(), 1);
    assert_eq!(session.edges().get(3).unwrap().b, at(20.0, 0.0));
}
