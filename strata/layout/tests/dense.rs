//! Dense layout detection only reports gap free packings

mod common;

use std::sync::Arc;

use bytemuck::Pod;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_layout::{
    AffineAccessor, IndexSpace, InstanceLayout, InstanceLayoutConstraints, Rect, RegionInstance,
};

fn sub_rect(rng: &mut StdRng, bounds: &Rect<3>) -> Rect<3> {
    let a = common::random_point(rng, bounds);
    let b = common::random_point(rng, bounds);
    Rect::new(a.min(&b), a.max(&b))
}

fn check_dense_detection<FT: Pod>(rng: &mut StdRng) {
    let element = std::mem::size_of::<FT>();
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, element)], 0).unwrap();
    let mut dense_found = 0;
    for _ in 0..30 {
        let bounds = common::random_rect::<3>(rng, 6);
        let order = common::random_dim_order::<3>(rng);
        let layout = InstanceLayout::choose(IndexSpace::dense(bounds), &constraints, &order).unwrap();
        let instance = RegionInstance::new_local(Arc::new(layout));
        let field = AffineAccessor::<FT, 3>::new(&instance, 0, 0);

        for _ in 0..10 {
            let rect = if rng.gen_bool(0.3) { bounds } else { sub_rect(rng, &bounds) };
            if !field.is_dense_arbitrary(&rect) {
                continue;
            }
            dense_found += 1;
            // dense means the elements form one contiguous run
            let mut addresses: Vec<usize> = rect.points().map(|p| field.ptr(&p) as usize).collect();
            addresses.sort_unstable();
            for pair in addresses.windows(2) {
                assert_eq!(pair[1] - pair[0], element, "gap in {rect} with order {order:?}");
            }
        }
    }
    assert!(dense_found > 0);
}

#[test]
fn test_dense_detection_is_sound() {
    let mut rng = StdRng::seed_from_u64(21);
    check_dense_detection::<u8>(&mut rng);
    check_dense_detection::<u32>(&mut rng);
    check_dense_detection::<[f64; 2]>(&mut rng);
}

#[test]
fn test_selected_orders_are_detected() {
    let bounds = Rect::<3>::new([0, 0, 0], [3, 4, 5]);
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 4)], 0).unwrap();
    for (order, row, col) in [([2, 1, 0], true, false), ([0, 1, 2], false, true), ([1, 0, 2], false, false)] {
        let layout = InstanceLayout::choose(IndexSpace::dense(bounds), &constraints, &order).unwrap();
        let instance = RegionInstance::new_local(Arc::new(layout));
        let field = AffineAccessor::<f32, 3>::new(&instance, 0, 0);
        assert_eq!(field.is_dense_row_major(&bounds), row, "{order:?}");
        assert_eq!(field.is_dense_col_major(&bounds), col, "{order:?}");
        assert!(field.is_dense_arbitrary(&bounds), "{order:?}");
        // a single plane of dimension 2 is contiguous only when dimension 2 is slowest
        let slab = Rect::new([0, 0, 0], [3, 4, 0]);
        assert_eq!(field.is_dense_arbitrary(&slab), order[2] == 2, "{order:?}");
    }
}
