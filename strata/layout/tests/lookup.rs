//! Compiled lookup programs agree with walking the piece lists

mod common;

use std::sync::Arc;

use enumset::EnumSet;
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use strata_layout::lookup::{InstructionRef, SPLIT_PLANE_SIZE, affine_piece_size};
use strata_layout::{
    AllocError, CompileError, CompileOptions, FieldLayout, HostProgramMemory, IndexSpace,
    InstanceLayout, InstanceLayoutConstraints, InstanceLayoutPiece, InstancePieceList, Opcode,
    Point, Rect,
};

/// `[0,0]..[3,3]` split at x = 2 into two column major pieces with strides `{1, 4}`.
fn two_piece_square() -> InstanceLayout<2> {
    let list = InstancePieceList::new(vec![
        InstanceLayoutPiece::affine(Rect::new([0, 0], [1, 3]), 0, [1, 4]),
        InstanceLayoutPiece::affine(Rect::new([2, 0], [3, 3]), 0, [1, 4]),
    ]);
    let mut fields = FxHashMap::default();
    fields.insert(
        3,
        FieldLayout {
            list_idx: 0,
            rel_offset: 0,
            size_in_bytes: 1,
        },
    );
    InstanceLayout::from_parts(IndexSpace::dense(Rect::new([0, 0], [3, 3])), vec![list], fields, 16, 1)
}

#[test]
fn test_two_piece_square() {
    let layout = two_piece_square();
    let program = layout.lookup_program().unwrap();
    let entry = program.entry(3).unwrap();
    let split = entry.split_plane().unwrap();
    assert_eq!((split.dim, split.plane), (0, 2));

    let a = Point::new([1, 2]);
    let b = Point::new([3, 0]);
    assert_eq!(program.lookup(3, &a).unwrap().bounds, Rect::new([0, 0], [1, 3]));
    assert_eq!(program.lookup(3, &b).unwrap().bounds, Rect::new([2, 0], [3, 3]));
    assert_eq!(program.calculate_offset(3, &a), Some(9));
    assert_eq!(layout.calculate_offset(&a, 3), Some(9));
    assert_eq!(program.calculate_offset(3, &b), Some(3));
    assert_eq!(layout.calculate_offset(&b, 3), Some(3));
    assert_eq!(program.lookup(3, &Point::new([4, 0])), None);
    assert_eq!(program.lookup(3, &Point::new([0, -1])), None);
}

#[test]
fn test_random_layouts_match_direct_lookup() {
    let mut rng = StdRng::seed_from_u64(42);
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 8), (1, 4), (2, 1)], 1).unwrap();
    let option_sets = [
        CompileOptions::default(),
        CompileOptions::default().with_chain_limit(3),
        CompileOptions::default().with_allowed_opcodes(Opcode::AffinePiece.into()),
    ];
    for _ in 0..30 {
        let (layout, _) = common::random_layout::<3>(&mut rng, &constraints);
        let bounds = *layout.space().bounds();
        for options in &option_sets {
            let program = layout
                .compile_lookup_program(HostProgramMemory::new(), options)
                .unwrap();
            for field in program.fields().values() {
                assert!(field.supports(options.allowed));
            }
            for _ in 0..200 {
                let p = common::random_point(&mut rng, &bounds);
                for field_id in 0..3 {
                    assert_eq!(
                        program.calculate_offset(field_id, &p),
                        layout.calculate_offset(&p, field_id),
                        "{p} field {field_id}"
                    );
                }
            }
        }
    }
}

#[test]
fn test_chain_without_split_planes() {
    let layout = two_piece_square();
    let program = layout
        .compile_lookup_program(
            HostProgramMemory::new(),
            &CompileOptions::default().with_allowed_opcodes(Opcode::AffinePiece.into()),
        )
        .unwrap();
    let field = program.field(3).unwrap();
    assert_eq!(field.inst_usage_mask, EnumSet::only(Opcode::AffinePiece));
    assert!(!field.supports(EnumSet::only(Opcode::SplitPlane)));

    let leaf = affine_piece_size::<2, i32>();
    assert_eq!(program.bytes().len(), 2 * leaf);
    let first = InstructionRef::<2>::at(program.bytes(), 0).unwrap();
    let (_, next) = first.affine_piece().unwrap();
    assert_eq!(next as usize * 16, leaf);
    let (_, last) = first.jump(next).unwrap().affine_piece().unwrap();
    assert_eq!(last, 0);
    assert_eq!(program.calculate_offset(3, &Point::new([3, 3])), Some(15));
}

#[test]
fn test_chain_limit_keeps_small_nodes_flat() {
    let layout = two_piece_square();
    let program = layout
        .compile_lookup_program(
            HostProgramMemory::new(),
            &CompileOptions::default().with_chain_limit(2),
        )
        .unwrap();
    assert_eq!(
        program.field(3).unwrap().inst_usage_mask,
        EnumSet::only(Opcode::AffinePiece)
    );

    let split = layout
        .compile_lookup_program(HostProgramMemory::new(), &CompileOptions::default())
        .unwrap();
    assert_eq!(
        split.bytes().len(),
        SPLIT_PLANE_SIZE + 2 * affine_piece_size::<2, i32>()
    );
}

#[test]
fn test_allocation_limit() {
    let layout = two_piece_square();
    let err = layout
        .compile_lookup_program(HostProgramMemory::with_limit(64), &CompileOptions::default())
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::Allocation(AllocError::Exhausted {
            requested: 112,
            available: 64
        })
    );
}

#[test]
fn test_fields_share_their_list_program() {
    let space = IndexSpace::dense(Rect::<1>::new([0], [99]));
    let covering = [Rect::new([0], [49]), Rect::new([50], [99])];
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 8), (1, 8), (2, 4)], 1).unwrap();
    let layout = InstanceLayout::choose_with_covering(space, &covering, &constraints, &[0]).unwrap();
    let program = layout.lookup_program().unwrap();
    let starts: Vec<_> = (0..3).map(|id| program.field(id).unwrap().start_inst).collect();
    assert_eq!(starts, vec![Some(0); 3]);
    assert_eq!(program.field(1).unwrap().field_offset, 8);
    assert_eq!(program.field(2).unwrap().field_offset, 16);
}

#[test]
fn test_other_coordinate_types() {
    let space = IndexSpace::dense(Rect::<2, i64>::new([-(1 << 40), 0], [-(1 << 40) + 9, 9]));
    let covering = [
        Rect::<2, i64>::new([-(1 << 40), 0], [-(1 << 40) + 4, 9]),
        Rect::<2, i64>::new([-(1 << 40) + 5, 0], [-(1 << 40) + 9, 9]),
    ];
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 4)], 0).unwrap();
    let layout = InstanceLayout::choose_with_covering(space, &covering, &constraints, &[0, 1]).unwrap();
    let program = layout.lookup_program().unwrap();
    for p in layout.space().bounds().points() {
        assert_eq!(program.calculate_offset(0, &p), layout.calculate_offset(&p, 0));
    }

    let space = IndexSpace::dense(Rect::<1, u32>::new([u32::MAX - 15], [u32::MAX]));
    let covering = [
        Rect::<1, u32>::new([u32::MAX - 15], [u32::MAX - 8]),
        Rect::<1, u32>::new([u32::MAX - 7], [u32::MAX]),
    ];
    let layout = InstanceLayout::choose_with_covering(space, &covering, &constraints, &[0]).unwrap();
    let program = layout.lookup_program().unwrap();
    assert_eq!(program.calculate_offset(0, &Point::new([u32::MAX])), Some(60));
    assert_eq!(program.calculate_offset(0, &Point::new([u32::MAX - 8])), Some(28));
}

#[test]
fn test_concurrent_readers() {
    let mut rng = StdRng::seed_from_u64(99);
    let constraints = InstanceLayoutConstraints::from_field_sizes([(0, 8)], 0).unwrap();
    let (layout, _) = common::random_layout::<2>(&mut rng, &constraints);
    let layout = Arc::new(layout);
    let bounds = *layout.space().bounds();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let layout = layout.clone();
            scope.spawn(move || {
                // every thread races to compile the cached program first
                let program = layout.lookup_program().unwrap();
                for p in bounds.points() {
                    assert_eq!(program.calculate_offset(0, &p), layout.calculate_offset(&p, 0));
                }
            });
        }
    });
}
