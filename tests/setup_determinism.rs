//! Two setups over identical inputs must cache byte-identical state: the
//! partitioner has no random inputs and every tie-break is fixed.

mod util;

use mesh_transfer::data::VecField;
use mesh_transfer::prelude::*;

fn run_setup(comm: &RayonComm, rank: usize) -> (Vec<u64>, Vec<f64>, Vec<usize>, Vec<usize>) {
    let source = util::hex_manager(rank as u64, 100 + rank as u64);
    let coords = util::block_strided(
        &[
            [0.25, 0.5, rank as f64 + 0.25],
            [0.75, 0.5, rank as f64 + 0.75],
        ],
        3,
    );
    let targets = VecField::new(3, coords).unwrap();

    let mut map = SharedDomainMap::new(3, false);
    map.setup(comm, Some(&source), Some(&targets), 1.0e-9)
        .unwrap();
    let (images, lengths) = map.exporter_images().unwrap();
    (
        map.source_elements().to_vec(),
        map.cached_target_coords().to_vec(),
        images.to_vec(),
        lengths.to_vec(),
    )
}

#[test]
fn repeated_setup_is_bit_identical() {
    let run_rank = |rank: usize| {
        let comm = RayonComm::new(rank, 2);
        let first = run_setup(&comm, rank);
        let second = run_setup(&comm, rank);
        (first, second)
    };

    let t0 = std::thread::spawn(move || run_rank(0));
    let t1 = std::thread::spawn(move || run_rank(1));
    for handle in [t0, t1] {
        let (first, second) = handle.join().unwrap();
        assert_eq!(first.0, second.0, "source_elements must match exactly");
        assert!(
            first.1.iter().zip(&second.1).all(|(a, b)| a == b),
            "target_coords must match exactly"
        );
        assert_eq!(first.2, second.2, "exporter images must match");
        assert_eq!(first.3, second.3, "exporter lengths must match");
    }
}
