mod common;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_layout::InstanceLayoutConstraints;

#[test]
fn test_relocation_commutes() {
    let mut rng = StdRng::seed_from_u64(3);
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 8), (1, 4)], 0).unwrap();
    for _ in 0..20 {
        let (layout, _) = common::random_layout::<2>(&mut rng, &constraints);
        let d1: usize = rng.r#gen();
        let d2: usize = rng.gen_range(0..1 << 20);

        let mut stepwise = layout.clone();
        stepwise.relocate(d1);
        stepwise.relocate(d2);
        let at_once = layout.relocated(d1.wrapping_add(d2));
        assert_eq!(stepwise, at_once);
        assert_eq!(stepwise.bytes_used(), layout.bytes_used());

        for p in layout.space().bounds().points() {
            let before = layout.calculate_offset(&p, 1).unwrap();
            let after = at_once.calculate_offset(&p, 1).unwrap();
            assert_eq!(after, before.wrapping_add(d1).wrapping_add(d2));
        }
    }
}

#[test]
fn test_relocated_program_matches_direct_offsets() {
    let mut rng = StdRng::seed_from_u64(4);
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 16)], 0).unwrap();
    let (mut layout, _) = common::random_layout::<3>(&mut rng, &constraints);
    let bounds = *layout.space().bounds();

    let before = layout.lookup_program().unwrap().calculate_offset(0, &bounds.lo);
    layout.relocate(1 << 30);
    let program = layout.lookup_program().unwrap();
    assert_eq!(
        program.calculate_offset(0, &bounds.lo),
        before.map(|offset| offset + (1 << 30))
    );
    for p in bounds.points() {
        assert_eq!(program.calculate_offset(0, &p), layout.calculate_offset(&p, 0));
    }
}
