//! Missed-point semantics: points outside the shared domain are recorded
//! when asked for and silently receive zero at apply time.

mod util;

use mesh_transfer::data::{FieldView, VecField};
use mesh_transfer::prelude::*;
use util::AffineEvaluator;

#[test]
fn out_of_box_target_is_recorded_and_zeroed() {
    let comm = NoComm;
    let source = util::hex_manager(0, 7); // [0,1]^3
    let targets = VecField::new(3, util::block_strided(&[[2.0, 2.0, 2.0]], 3)).unwrap();

    let mut map = SharedDomainMap::new(3, true);
    map.setup(&comm, Some(&source), Some(&targets), 1.0e-9)
        .unwrap();
    assert_eq!(map.missed_target_points().unwrap(), &[0]);
    assert!(map.source_elements().is_empty());

    let evaluator = AffineEvaluator {
        coeff: [1.0, 1.0, 1.0],
        offset: 5.0,
    };
    let mut received = VecField::new(1, vec![123.0]).unwrap();
    map.apply(&comm, Some(&evaluator), Some(&mut received))
        .unwrap();
    assert_eq!(received.values(), &[0.0]);
}

#[test]
fn hits_and_misses_coexist() {
    let comm = NoComm;
    let source = util::hex_manager(0, 7);
    let coords = util::block_strided(&[[0.25, 0.25, 0.25], [5.0, 0.5, 0.5]], 3);
    let targets = VecField::new(3, coords).unwrap();

    let mut map = SharedDomainMap::new(3, true);
    map.setup(&comm, Some(&source), Some(&targets), 1.0e-9)
        .unwrap();
    assert_eq!(map.missed_target_points().unwrap(), &[1]);

    let evaluator = AffineEvaluator {
        coeff: [0.0, 0.0, 0.0],
        offset: 4.0,
    };
    let mut received = VecField::zeros(1, 2);
    map.apply(&comm, Some(&evaluator), Some(&mut received))
        .unwrap();
    assert!((received.values()[0] - 4.0).abs() < 1e-12);
    assert_eq!(received.values()[1], 0.0);
}

#[test]
fn missed_points_require_opt_in() {
    let comm = NoComm;
    let source = util::hex_manager(0, 7);
    let targets = VecField::new(3, util::block_strided(&[[0.5, 0.5, 0.5]], 3)).unwrap();

    let mut map = SharedDomainMap::new(3, false);
    map.setup(&comm, Some(&source), Some(&targets), 1.0e-9)
        .unwrap();
    assert!(matches!(
        map.missed_target_points(),
        Err(TransferError::NotEnabled(_))
    ));
}
