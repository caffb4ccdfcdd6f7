/// 牆壁、頂點與邊索引測試
#[cfg(test)]
mod tests {
    use vek::Vec2;

    use crate::comp::edge::{DoorState, Edge, RestrictionKind, Sense, SenseRestrictions, WallSide};
    use crate::comp::vertex::{VertexKey, VertexMap};
    use crate::config::QuadTreeSetting;
    use crate::error::VisionError;
    use crate::vision::edge_index::EdgeIndex;
    use crate::vision::quadtree::Bounds;

    fn index() -> EdgeIndex {
        let world = Bounds::new(Vec2::new(0.0, 0.0), Vec2::new(1000.0, 1000.0));
        EdgeIndex::new(world, &QuadTreeSetting::default())
    }

    #[test]
    fn test_rejects_degenerate_edges() {
        let err = Edge::wall(1, [5.0, 5.0], [5.0, 5.0]).unwrap_err();
        assert!(matches!(err, VisionError::Configuration(_)));

        let err = Edge::new(2, Vec2::new(f64::NAN, 0.0), Vec2::new(1.0, 1.0), SenseRestrictions::default()).unwrap_err();
        assert_eq!(err.kind_name(), "configuration");

        let err = Edge::wall(3, [0.0, f64::INFINITY], [1.0, 1.0]).unwrap_err();
        assert_eq!(err.kind_name(), "configuration");
    }

    #[test]
    fn test_restrictions_per_sense() {
        let restrictions = SenseRestrictions::uniform(RestrictionKind::Blocking)
            .with(Sense::Sight, RestrictionKind::Limited)
            .with(Sense::Move, RestrictionKind::None);
        let edge = Edge::new(1, Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), restrictions).unwrap();

        assert_eq!(edge.restriction(Sense::Sight), RestrictionKind::Limited);
        assert_eq!(edge.restriction(Sense::Light), RestrictionKind::Blocking);
        assert_eq!(edge.restriction(Sense::Move), RestrictionKind::None);
        assert!(edge.restricts_anything());
    }

    #[test]
    fn test_doors() {
        let door = Edge::wall(1, [0.0, 0.0], [10.0, 0.0]).unwrap().with_door(DoorState::Closed);
        assert_eq!(door.restriction(Sense::Sight), RestrictionKind::Blocking);

        let open = door.clone().with_door(DoorState::Open);
        assert!(!open.restricts_anything());

        let locked = door.with_door(DoorState::Locked);
        assert_eq!(locked.restriction(Sense::Move), RestrictionKind::Blocking);
    }

    #[test]
    fn test_one_way_depends_on_origin_side() {
        // a→b 朝 +x，左側是 +y
        let edge = Edge::wall(1, [0.0, 0.0], [10.0, 0.0]).unwrap().with_one_way(WallSide::Left);
        assert_eq!(edge.restriction_from(Sense::Sight, Vec2::new(5.0, 5.0)), RestrictionKind::Blocking);
        assert_eq!(edge.restriction_from(Sense::Sight, Vec2::new(5.0, -5.0)), RestrictionKind::None);

        let edge = edge.with_one_way(WallSide::Right);
        assert_eq!(edge.restriction_from(Sense::Sight, Vec2::new(5.0, 5.0)), RestrictionKind::None);
        assert_eq!(edge.restriction_from(Sense::Sight, Vec2::new(5.0, -5.0)), RestrictionKind::Blocking);
    }

    #[test]
    fn test_proximity_threshold() {
        let edge = Edge::wall(1, [0.0, 0.0], [10.0, 0.0]).unwrap().with_proximity(3.0);
        assert_eq!(edge.restriction_from(Sense::Sight, Vec2::new(5.0, 2.0)), RestrictionKind::None);
        assert_eq!(edge.restriction_from(Sense::Sight, Vec2::new(5.0, 8.0)), RestrictionKind::Blocking);
    }

    #[test]
    fn test_restrictions_deserialize_with_defaults() {
        let r: SenseRestrictions = serde_json::from_str(r#"{"sight":"limited","move":"none"}"#).unwrap();
        assert_eq!(r.sight, RestrictionKind::Limited);
        assert_eq!(r.light, RestrictionKind::Blocking);
        assert_eq!(r.movement, RestrictionKind::None);
    }

    #[test]
    fn test_vertex_map_merges_coincident_points() {
        let mut map = VertexMap::new();
        let k1 = map.attach(Vec2::new(1.0, 2.0), 10);
        let k2 = map.attach(Vec2::new(1.0 + 1e-8, 2.0 - 1e-8), 11);
        assert_eq!(k1, k2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(Vec2::new(1.0, 2.0)).unwrap().edges, vec![10, 11]);

        map.detach(Vec2::new(1.0, 2.0), 10);
        assert_eq!(map.len(), 1);
        map.detach(Vec2::new(1.0, 2.0), 11);
        assert!(map.is_empty());
        assert_ne!(VertexKey::from_point(Vec2::new(1.0, 2.0)), VertexKey::from_point(Vec2::new(1.0, 2.1)));
    }

    #[test]
    fn test_index_insert_replace_remove() {
        let mut index = index();
        assert!(index.insert(Edge::wall(1, [10.0, 10.0], [20.0, 10.0]).unwrap()).is_none());
        assert!(index.insert(Edge::wall(2, [20.0, 10.0], [20.0, 30.0]).unwrap()).is_none());
        assert_eq!(index.len(), 2);
        // 共用端點
        assert_eq!(index.vertices().len(), 3);
        let gen = index.generation();

        let old = index.update(Edge::wall(1, [500.0, 500.0], [600.0, 500.0]).unwrap()).unwrap();
        assert_eq!(old.a, Vec2::new(10.0, 10.0));
        assert!(index.generation() > gen);
        assert_eq!(index.vertices().len(), 4);

        let near = Bounds::new(Vec2::new(0.0, 0.0), Vec2::new(50.0, 50.0));
        let ids: Vec<_> = index.query(&near).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);

        assert!(index.remove(2).is_some());
        assert!(index.remove(2).is_none());
        assert!(index.query(&near).is_empty());
        assert_eq!(index.vertices().len(), 2);
    }

    #[test]
    fn test_candidates_in_circle_uses_exact_distance() {
        let mut index = index();
        index.insert(Edge::wall(1, [100.0, 100.0], [110.0, 100.0]).unwrap());
        // 包圍盒與圓相交但線段在圓外
        index.insert(Edge::wall(2, [140.0, 170.0], [170.0, 140.0]).unwrap());
        index.insert(
            Edge::new(
                3,
                Vec2::new(100.0, 120.0),
                Vec2::new(110.0, 120.0),
                SenseRestrictions::default().with(Sense::Sight, RestrictionKind::None),
            )
            .unwrap(),
        );

        let ids: Vec<_> = index
            .candidates_in_circle(Vec2::new(100.0, 110.0), 50.0, Sense::Sight)
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1]);

        let ids: Vec<_> = index
            .candidates_in_circle(Vec2::new(100.0, 110.0), 50.0, Sense::Sound)
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_segment_restricted() {
        let mut index = index();
        index.insert(Edge::wall(1, [50.0, 0.0], [50.0, 100.0]).unwrap());
        let limited = SenseRestrictions::uniform(RestrictionKind::Limited);
        index.insert(Edge::new(2, Vec2::new(200.0, 0.0), Vec2::new(200.0, 100.0), limited).unwrap());
        index.insert(Edge::new(3, Vec2::new(250.0, 0.0), Vec2::new(250.0, 100.0), limited).unwrap());

        let from = Vec2::new(10.0, 50.0);
        assert!(index.segment_restricted(from, Vec2::new(60.0, 50.0), Sense::Sight));
        assert!(!index.segment_restricted(from, Vec2::new(40.0, 50.0), Sense::Sight));
        // 剛好碰到牆不算穿越
        assert!(!index.segment_restricted(from, Vec2::new(50.0, 50.0), Sense::Sight));

        let from = Vec2::new(150.0, 50.0);
        assert!(!index.segment_restricted(from, Vec2::new(220.0, 50.0), Sense::Sight));
        assert!(index.segment_restricted(from, Vec2::new(300.0, 50.0), Sense::Sight));
    }

    #[test]
    fn test_segment_restricted_at_limited_corners() {
        let limited = SenseRestrictions::uniform(RestrictionKind::Limited);
        let from = Vec2::new(0.0, 50.0);

        // 交叉成 X：交點上穿過兩條邊
        let mut crossing = index();
        crossing.insert(Edge::new(1, Vec2::new(10.0, 40.0), Vec2::new(30.0, 60.0), limited).unwrap());
        crossing.insert(Edge::new(2, Vec2::new(10.0, 60.0), Vec2::new(30.0, 40.0), limited).unwrap());
        assert!(crossing.segment_restricted(from, Vec2::new(60.0, 50.0), Sense::Sight));
        assert!(crossing.segment_restricted(from, Vec2::new(60.0, 50.3), Sense::Sight));

        // 串接的牆在共用頂點上只算一次
        let mut chain = index();
        chain.insert(Edge::new(1, Vec2::new(20.0, 40.0), Vec2::new(20.0, 50.0), limited).unwrap());
        chain.insert(Edge::new(2, Vec2::new(20.0, 50.0), Vec2::new(20.0, 60.0), limited).unwrap());
        assert!(!chain.segment_restricted(from, Vec2::new(50.0, 50.0), Sense::Sight));
        chain.insert(Edge::new(3, Vec2::new(40.0, 40.0), Vec2::new(40.0, 60.0), limited).unwrap());
        assert!(!chain.segment_restricted(from, Vec2::new(30.0, 50.0), Sense::Sight));
        assert!(chain.segment_restricted(from, Vec2::new(50.0, 50.0), Sense::Sight));

        // 兩條邊都在同側時擦過角點算兩次
        let mut tangent = index();
        tangent.insert(Edge::new(1, Vec2::new(20.0, 50.0), Vec2::new(30.0, 60.0), limited).unwrap());
        tangent.insert(Edge::new(2, Vec2::new(20.0, 50.0), Vec2::new(10.0, 60.0), limited).unwrap());
        assert!(tangent.segment_restricted(from, Vec2::new(50.0, 50.0), Sense::Sight));
    }

    #[test]
    fn test_rebuild_keeps_edges_queryable() {
        let mut index = index();
        for i in 0..100u64 {
            let x = (i % 10) as f64 * 90.0 + 5.0;
            let y = (i / 10) as f64 * 90.0 + 5.0;
            index.insert(Edge::wall(i, [x, y], [x + 20.0, y + 5.0]).unwrap());
        }
        for i in 0..80u64 {
            index.remove(i);
        }
        index.rebuild();
        let all = Bounds::new(Vec2::new(0.0, 0.0), Vec2::new(1000.0, 1000.0));
        assert_eq!(index.query(&all).len(), 20);
    }
}
