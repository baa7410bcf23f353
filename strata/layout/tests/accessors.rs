//! The three accessor tiers agree with each other

mod common;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_layout::{
    AccessorError, AffineAccessor, GenericAccessor, IndexSpace, InstanceLayout,
    InstanceLayoutConstraints, MultiAffineAccessor, Point, Rect, RegionInstance, RemoteMemory,
};

struct VecMemory(Mutex<Vec<u8>>);

impl RemoteMemory for VecMemory {
    fn read(&self, offset: usize, out: &mut [u8]) {
        let bytes = self.0.lock().unwrap();
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.0.lock().unwrap();
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }
}

fn random_instance(rng: &mut StdRng) -> RegionInstance<2> {
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 8), (1, 4)], 1).unwrap();
    let (layout, _) = common::random_layout::<2>(rng, &constraints);
    RegionInstance::new_local(Arc::new(layout))
}

#[test]
fn test_generic_and_multi_affine_agree() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let instance = random_instance(&mut rng);
        let bounds = *instance.layout().space().bounds();
        let mut generic = GenericAccessor::<f64, 2>::new(&instance, 0, 0);
        let mut multi = MultiAffineAccessor::<f64, 2>::new(&instance, 0, 0);
        let mut narrow = MultiAffineAccessor::<u32, 2>::new(&instance, 1, 0);

        for p in bounds.points() {
            generic.write(&p, p[0] as f64 * 0.5 + p[1] as f64);
            narrow.write(&p, (p[0] * 1000 + p[1]) as u32);
        }
        for _ in 0..200 {
            let p = common::random_point(&mut rng, &bounds);
            assert_eq!(multi.read(&p), generic.read(&p));
            assert_eq!(multi.read_shared(&p), generic.read(&p));
            assert_eq!(narrow.read(&p), (p[0] * 1000 + p[1]) as u32);
        }
    }
}

#[test]
fn test_affine_agrees_on_single_piece_subrects() {
    let space = IndexSpace::dense(Rect::<2>::new([0, 0], [9, 9]));
    let covering = [Rect::new([0, 0], [4, 9]), Rect::new([5, 0], [9, 9])];
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 4)], 0).unwrap();
    let layout = InstanceLayout::choose_with_covering(space, &covering, &constraints, &[1, 0]).unwrap();
    let instance = RegionInstance::new_local(Arc::new(layout));

    let mut generic = GenericAccessor::<i32, 2>::new(&instance, 0, 0);
    for p in instance.layout().space().bounds().points() {
        generic.write(&p, p[0] * 100 + p[1]);
    }

    for half in covering {
        let affine = AffineAccessor::<i32, 2>::new_in(&instance, 0, &half, 0);
        let mut multi = MultiAffineAccessor::<i32, 2>::new_in(&instance, 0, &half, 0);
        for p in half.points() {
            assert_eq!(affine.read(&p), generic.read(&p));
            assert_eq!(affine.ptr(&p), multi.ptr(&p));
        }
        assert!(affine.is_dense_row_major(&half));
    }
}

#[test]
fn test_multi_affine_cache_is_transparent() {
    let mut rng = StdRng::seed_from_u64(12);
    let instance = random_instance(&mut rng);
    let bounds = *instance.layout().space().bounds();
    let mut cached = MultiAffineAccessor::<u64, 2>::new(&instance, 0, 0);
    let fresh = MultiAffineAccessor::<u64, 2>::new(&instance, 0, 0);
    let lo_offset = instance.layout().calculate_offset(&bounds.lo, 0).unwrap();
    let base = fresh.ptr_shared(&bounds.lo) as usize - lo_offset;
    for _ in 0..500 {
        let p = common::random_point(&mut rng, &bounds);
        let expected = instance.layout().calculate_offset(&p, 0).unwrap();
        let ptr = cached.ptr(&p);
        assert_eq!(ptr, fresh.ptr_shared(&p));
        assert_eq!(ptr, cached.ptr_shared(&p));
        assert_eq!(ptr as usize - base, expected);
        if rng.gen_bool(0.5) {
            cached.write(&p, rng.r#gen());
        }
    }
}

#[test]
fn test_generic_accessor_on_remote_memory() {
    let space = IndexSpace::dense(Rect::<1>::new([0], [31]));
    let covering = [Rect::new([0], [15]), Rect::new([16], [31])];
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 2), (1, 8)], 0).unwrap();
    let layout = Arc::new(
        InstanceLayout::choose_with_covering(space, &covering, &constraints, &[0]).unwrap(),
    );
    let memory = Arc::new(VecMemory(Mutex::new(vec![0; layout.bytes_used()])));
    let instance = RegionInstance::new_remote(layout.clone(), memory.clone());
    assert!(!instance.is_local());

    let mut field = GenericAccessor::<u16, 1>::new(&instance, 0, 0);
    for i in 0..32 {
        field.write(&Point::new([i]), i as u16 * 7);
    }
    for i in 0..32 {
        assert_eq!(field.read(&Point::new([i])), i as u16 * 7);
    }
    let offset = layout.calculate_offset(&Point::new([20]), 0).unwrap();
    let bytes = memory.0.lock().unwrap();
    assert_eq!(u16::from_le_bytes([bytes[offset], bytes[offset + 1]]), 140);
    drop(bytes);

    assert_eq!(
        AffineAccessor::<u16, 1>::try_new(&instance, 0, 0).unwrap_err(),
        AccessorError::NotLocal
    );
    assert_eq!(
        MultiAffineAccessor::<u16, 1>::try_new(&instance, 0, 0).unwrap_err(),
        AccessorError::NotLocal
    );
    assert!(!MultiAffineAccessor::<u16, 1>::is_compatible(&instance, 0, 0));
}

#[test]
fn test_broken_layout_is_reported_by_multi_affine() {
    let space = IndexSpace::dense(Rect::<1>::new([0], [31]));
    // the covering leaves a gap, which only the compiler checks
    let covering = [Rect::new([0], [15]), Rect::new([20], [31])];
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 4)], 0).unwrap();
    let layout = InstanceLayout::choose_with_covering(space, &covering, &constraints, &[0]).unwrap();
    let instance = RegionInstance::new_local(Arc::new(layout));
    assert!(matches!(
        MultiAffineAccessor::<u32, 1>::try_new(&instance, 0, 0),
        Err(AccessorError::Compile(_))
    ));
    assert!(GenericAccessor::<u32, 1>::is_compatible(&instance, 0, 0));
}

#[test]
#[should_panic(expected = "incompatible with the instance")]
fn test_affine_new_panics_on_multiple_pieces() {
    let space = IndexSpace::dense(Rect::<1>::new([0], [31]));
    let covering = [Rect::new([0], [15]), Rect::new([16], [31])];
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 4)], 0).unwrap();
    let layout = InstanceLayout::choose_with_covering(space, &covering, &constraints, &[0]).unwrap();
    let instance = RegionInstance::new_local(Arc::new(layout));
    let _ = AffineAccessor::<u32, 1>::new(&instance, 0, 0);
}

#[test]
#[should_panic(expected = "is not covered by any piece")]
fn test_generic_miss_panics() {
    let space = IndexSpace::dense(Rect::<1>::new([0], [31]));
    let covering = [Rect::new([0], [15])];
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 4)], 0).unwrap();
    let layout = InstanceLayout::choose_with_covering(space, &covering, &constraints, &[0]).unwrap();
    let instance = RegionInstance::new_local(Arc::new(layout));
    let mut field = GenericAccessor::<u32, 1>::new(&instance, 0, 0);
    field.read(&Point::new([20]));
}
