/// 合成與渲染輸出測試
#[cfg(test)]
mod tests {
    use hashbrown::HashSet;
    use vek::Vec2;

    use crate::comp::emitter::{Emitter, EmitterConfig, EmitterKind};
    use crate::comp::fog::FogExploration;
    use crate::vision::compositor::{AmbientLight, Compositor};
    use crate::vision::polygon::Polygon;
    use crate::vision::quadtree::Bounds;
    use crate::vision::render_output::{PolygonUpdate, RenderOutputGenerator, VisibilityLevel};

    fn square(cx: f64, cy: f64, half: f64) -> Polygon {
        let c = Vec2::new(cx, cy);
        Polygon::new(
            c,
            half,
            vec![
                Vec2::new(cx - half, cy - half),
                Vec2::new(cx + half, cy - half),
                Vec2::new(cx + half, cy + half),
                Vec2::new(cx - half, cy + half),
            ],
        )
    }

    fn emitter(id: u64, kind: EmitterKind, polygon: Polygon, viewer: Option<u64>) -> Emitter {
        let mut config = EmitterConfig::new(polygon.origin, polygon.radius);
        config.viewer = viewer;
        let mut e = Emitter::new(id, kind, config);
        assert!(e.apply_polygon(0, polygon, None));
        e
    }

    #[test]
    fn test_visible_region_follows_viewers() {
        let emitters = vec![
            emitter(1, EmitterKind::Vision, square(0.0, 0.0, 10.0), Some(1)),
            emitter(2, EmitterKind::Vision, square(100.0, 0.0, 10.0), Some(2)),
        ];

        let only_one: HashSet<u64> = [1].into_iter().collect();
        let state = Compositor::composite(&emitters, &only_one, AmbientLight::default());
        assert!(state.is_visible(Vec2::new(0.0, 0.0)));
        assert!(!state.is_visible(Vec2::new(100.0, 0.0)));

        let everyone = HashSet::new();
        let state = Compositor::composite(&emitters, &everyone, AmbientLight::default());
        assert!(state.is_visible(Vec2::new(100.0, 0.0)));
        assert_eq!(state.visible.polygons().len(), 2);
    }

    #[test]
    fn test_darkness_subtracts_from_light() {
        let emitters = vec![
            emitter(1, EmitterKind::Light, square(0.0, 0.0, 20.0), None),
            emitter(2, EmitterKind::Darkness, square(10.0, 10.0, 5.0), None),
            emitter(3, EmitterKind::Sound, square(50.0, 50.0, 5.0), None),
        ];
        let night = AmbientLight::new(1.0);
        let state = Compositor::composite(&emitters, &HashSet::new(), night);

        assert!(state.is_illuminated(Vec2::new(-10.0, -10.0)));
        assert!(!state.is_illuminated(Vec2::new(10.0, 10.0)));
        assert!(!state.is_illuminated(Vec2::new(50.0, 50.0)));
        // 聲音不參與可見與照明
        assert!(!state.is_visible(Vec2::new(50.0, 50.0)));
        assert_eq!(state.illuminated.subtracted().len(), 1);
    }

    #[test]
    fn test_global_light_and_darkness_override() {
        let emitters = vec![emitter(1, EmitterKind::Darkness, square(0.0, 0.0, 5.0), None)];
        let day = AmbientLight::new(0.0);
        assert!(day.globally_lit());
        let state = Compositor::composite(&emitters, &HashSet::new(), day);

        assert!(state.is_illuminated(Vec2::new(100.0, 100.0)));
        assert!(!state.is_illuminated(Vec2::new(0.0, 0.0)));
        assert!((day.light_level() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inactive_and_empty_emitters_are_skipped() {
        let mut off = emitter(1, EmitterKind::Vision, square(0.0, 0.0, 10.0), None);
        off.set_active(false);
        let empty = Emitter::new(2, EmitterKind::Vision, EmitterConfig::new(Vec2::new(50.0, 0.0), 10.0));

        let state = Compositor::composite([&off, &empty], &HashSet::new(), AmbientLight::default());
        assert!(state.visible.is_empty());
        assert!(state.visible.bounds().is_none());
    }

    #[test]
    fn test_grid_output_layers_visible_over_explored() {
        let world = Bounds::new(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0));
        let seen_before = emitter(1, EmitterKind::Vision, square(20.0, 20.0, 14.0), None);
        let seen_now = emitter(2, EmitterKind::Vision, square(80.0, 80.0, 14.0), None);

        let mut fog = FogExploration::new("scene", None, world, 10.0);
        fog.explore(&seen_before);
        let state = Compositor::composite([&seen_now], &HashSet::new(), AmbientLight::default());

        let grid = RenderOutputGenerator::new(10.0).generate_grid_output(&state, Some(&fog), world);
        assert_eq!((grid.width, grid.height), (10, 10));
        assert_eq!(grid.level_at(2, 2), Some(VisibilityLevel::Explored));
        assert_eq!(grid.level_at(8, 8), Some(VisibilityLevel::Visible));
        assert_eq!(grid.level_at(5, 5), Some(VisibilityLevel::Unexplored));
        assert_eq!(grid.level_at(10, 0), None);
        assert_eq!(grid.count(VisibilityLevel::Visible), 4);
        assert_eq!(f32::from(VisibilityLevel::Explored), 0.5);
    }

    #[test]
    fn test_polygon_update_serializes() {
        let e = emitter(7, EmitterKind::Light, square(0.0, 0.0, 1.0), None);
        let update = PolygonUpdate::from_emitter(&e);
        assert_eq!(update.points.len(), 4);
        assert_eq!(update.generation, 0);

        let json = update.to_json().unwrap();
        let back: PolygonUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
        assert!(json.contains("\"kind\":\"light\""));

        let removed = PolygonUpdate::removed(7, EmitterKind::Light, 3);
        assert!(removed.points.is_empty());
        assert!(!removed.active);
    }
}
