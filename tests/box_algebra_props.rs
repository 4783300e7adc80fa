use amr_flux_register::geometry::{BoxArray, IndexBox, IndexType, IntVect, Orientation};
use amr_flux_register::kernels::face_region;
use proptest::prelude::*;

fn arb_box() -> impl Strategy<Value = IndexBox<3>> {
    (
        prop::array::uniform3(-20i64..20),
        prop::array::uniform3(0i64..12),
    )
        .prop_map(|(lo, len)| {
            IndexBox::from_corners(lo, [lo[0] + len[0], lo[1] + len[1], lo[2] + len[2]])
        })
}

fn arb_ratio() -> impl Strategy<Value = IntVect<3>> {
    prop::array::uniform3(1i64..5).prop_map(IntVect::new)
}

fn arb_face() -> impl Strategy<Value = Orientation> {
    (0usize..6).prop_map(|i| Orientation::from_index::<3>(i).unwrap())
}

proptest! {
    #[test]
    fn intersection_is_commutative_and_contained(a in arb_box(), b in arb_box()) {
        let ab = a & b;
        prop_assert_eq!(ab, b & a);
        prop_assert_eq!(a.intersects(&b), !ab.is_empty());
        if !ab.is_empty() {
            prop_assert!(a.contains(&ab));
            prop_assert!(b.contains(&ab));
        }
    }

    #[test]
    fn grow_then_shrink_is_identity(a in arb_box(), n in 0i64..5) {
        prop_assert_eq!(a.grow(n).grow(-n), a);
        prop_assert_eq!(a.grow(n).num_pts() >= a.num_pts(), true);
    }

    #[test]
    fn refine_then_coarsen_is_identity(a in arb_box(), r in arb_ratio()) {
        prop_assert_eq!(a.refine(&r).coarsen(&r), a);
        prop_assert!(a.coarsen(&r).refine(&r).contains(&a));
    }

    #[test]
    fn node_boxes_coarsen_onto_covering_faces(a in arb_box(), r in arb_ratio(), axis in 0usize..3) {
        let faces = a.refine(&r).surrounding_nodes(axis);
        prop_assert_eq!(faces.coarsen(&r), a.surrounding_nodes(axis));
    }

    #[test]
    fn face_region_of_adjacent_cells_is_the_face(a in arb_box(), face in arb_face()) {
        let fb = a.face_box(face);
        prop_assert_eq!(face_region(&a.adj_cell(face), face), fb);
        prop_assert_eq!(fb.index_type(), IndexType::face(face.axis()));
        prop_assert_eq!(fb.length(face.axis()), 1);
    }

    #[test]
    fn orientation_index_round_trips(i in 0usize..6) {
        let o = Orientation::from_index::<3>(i).unwrap();
        prop_assert_eq!(o.index::<3>(), i);
        prop_assert_eq!(o.is_low(), i < 3);
        prop_assert_eq!(o.flip().flip(), o);
    }
}

#[test]
fn box_array_json_round_trip() {
    let ba = BoxArray::new(vec![
        IndexBox::from_corners([0, 0], [7, 7]),
        IndexBox::with_type(IntVect::new([8, 0]), IntVect::new([16, 7]), IndexType::face(0)),
    ]);
    let json = serde_json::to_string(&ba).unwrap();
    let back: BoxArray<2> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ba);
}

#[test]
fn orientation_out_of_range_is_none() {
    assert!(Orientation::from_index::<2>(4).is_none());
}
