//! Affine fields survive the full map exactly: the multilinear reference
//! bases reproduce affine functions, so apply must return `f(t)` at every
//! mapped target point to floating-point accuracy.

mod util;

use mesh_transfer::data::{FieldView, VecField};
use mesh_transfer::mesh::{MeshBlock, MeshManager};
use mesh_transfer::prelude::*;
use util::AffineEvaluator;

#[test]
fn affine_round_trip_through_a_hex() {
    let comm = NoComm;
    let source = util::hex_manager(0, 55);
    let points = [
        [0.1, 0.2, 0.3],
        [0.9, 0.8, 0.7],
        [0.5, 0.5, 0.5],
        [0.0, 0.0, 0.0],
    ];
    let coords = util::block_strided(&points, 3);
    let targets = VecField::new(3, coords.clone()).unwrap();

    let mut map = SharedDomainMap::new(3, false);
    map.setup(&comm, Some(&source), Some(&targets), 1.0e-9)
        .unwrap();

    let evaluator = AffineEvaluator {
        coeff: [2.0, -3.0, 0.5],
        offset: 1.25,
    };
    let mut received = VecField::zeros(1, points.len());
    map.apply(&comm, Some(&evaluator), Some(&mut received))
        .unwrap();

    for (i, p) in points.iter().enumerate() {
        let expect = 1.25 + 2.0 * p[0] - 3.0 * p[1] + 0.5 * p[2];
        let got = received.values()[i];
        assert!((got - expect).abs() < 1e-12, "point {i}: {got} vs {expect}");
    }
}

#[test]
fn triangle_mesh_two_dimensional_transfer() {
    let comm = NoComm;
    // unit square split along the v1-v3 diagonal into two triangles
    let block = MeshBlock::new(
        2,
        ElementTopology::Tri,
        vec![1, 2, 3, 4],
        // block-strided: x of 1..4, then y of 1..4
        vec![0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        vec![20, 21],
        // tri 20 = (1,2,4), tri 21 = (2,3,4); block-strided by vertex slot
        vec![1, 2, 2, 3, 4, 4],
        MeshBlock::identity_permutation(ElementTopology::Tri),
    )
    .unwrap();
    let source = MeshManager::new(vec![Box::new(block)], 2).unwrap();

    let points = [[0.6, 0.1, 0.0], [0.3, 0.8, 0.0]];
    let targets = VecField::new(2, util::block_strided(&points, 2)).unwrap();

    let mut map = SharedDomainMap::new(2, false);
    map.setup(&comm, Some(&source), Some(&targets), 1.0e-9)
        .unwrap();

    let mut elements = map.source_elements().to_vec();
    elements.sort_unstable();
    assert_eq!(elements, vec![20, 21]);

    let evaluator = AffineEvaluator {
        coeff: [1.0, 2.0, 0.0],
        offset: 0.0,
    };
    let mut received = VecField::zeros(1, 2);
    map.apply(&comm, Some(&evaluator), Some(&mut received))
        .unwrap();
    assert!((received.values()[0] - (0.6 + 2.0 * 0.1)).abs() < 1e-12);
    assert!((received.values()[1] - (0.3 + 2.0 * 0.8)).abs() < 1e-12);
}
