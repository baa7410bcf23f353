//! Random coverings shared by the integration tests

#![allow(dead_code)]

use rand::Rng;
use rand::rngs::StdRng;
use strata_layout::{IndexSpace, InstanceLayout, InstanceLayoutConstraints, Point, Rect};

/// Split `rect` recursively along random planes until pieces are small or the depth runs out.
pub fn bisect<const N: usize>(rng: &mut StdRng, rect: Rect<N>, depth: usize, out: &mut Vec<Rect<N>>) {
    let splittable: Vec<usize> = (0..N).filter(|&d| rect.extent(d) > 1).collect();
    if depth == 0 || splittable.is_empty() || rng.gen_bool(0.2) {
        out.push(rect);
        return;
    }
    let dim = splittable[rng.gen_range(0..splittable.len())];
    let plane = rng.gen_range(rect.lo[dim] + 1..=rect.hi[dim]);
    let (below, above) = rect.split(dim, plane);
    bisect(rng, below, depth - 1, out);
    bisect(rng, above, depth - 1, out);
}

pub fn random_rect<const N: usize>(rng: &mut StdRng, max_extent: i32) -> Rect<N> {
    let lo: [i32; N] = std::array::from_fn(|_| rng.gen_range(-20..20));
    let hi: [i32; N] = std::array::from_fn(|d| lo[d] + rng.gen_range(0..max_extent));
    Rect::new(lo, hi)
}

pub fn random_dim_order<const N: usize>(rng: &mut StdRng) -> [usize; N] {
    let mut order: [usize; N] = std::array::from_fn(|d| d);
    for i in (1..N).rev() {
        order.swap(i, rng.gen_range(0..=i));
    }
    order
}

/// A dense layout over a random rectangle with a random bisection covering.
pub fn random_layout<const N: usize>(
    rng: &mut StdRng,
    constraints: &InstanceLayoutConstraints,
) -> (InstanceLayout<N>, Vec<Rect<N>>) {
    let bounds = random_rect::<N>(rng, 9);
    let mut covering = Vec::new();
    bisect(rng, bounds, 5, &mut covering);
    let order = random_dim_order::<N>(rng);
    let layout = InstanceLayout::choose_with_covering(
        IndexSpace::dense(bounds),
        &covering,
        constraints,
        &order,
    )
    .unwrap();
    (layout, covering)
}

pub fn random_point<const N: usize>(rng: &mut StdRng, rect: &Rect<N>) -> Point<N> {
    Point::new(std::array::from_fn(|d| rng.gen_range(rect.lo[d]..=rect.hi[d])))
}
