//! Distributed spline interpolation: source centers split across two ranks,
//! targets near the rank boundary so the ghost layer matters.

use mesh_transfer::prelude::*;

#[test]
fn constant_reproduction_across_the_rank_boundary() {
    let run_rank = |rank: usize| {
        let comm = RayonComm::new(rank, 2);
        // rank 0 owns x in {0.0 .. 0.9}, rank 1 owns {1.0 .. 1.9}
        let sources: Vec<f64> = (0..10)
            .map(|i| rank as f64 + i as f64 * 0.1)
            .collect();
        // targets straddle the boundary on both ranks
        let targets: Vec<f64> = if rank == 0 {
            vec![0.45, 0.95]
        } else {
            vec![1.05, 1.55]
        };
        let basis = WendlandC2::new(0.35);

        let interp = SplineInterpolator::new(
            &comm,
            1,
            &sources,
            &targets,
            &basis,
            0.0,
            SplineParams::default(),
        )
        .unwrap();

        let data = vec![-1.75; 10];
        let mut out = vec![0.0; 2];
        interp.interpolate(&comm, &data, 1, &mut out).unwrap();
        out
    };

    let t0 = std::thread::spawn(move || run_rank(0));
    let t1 = std::thread::spawn(move || run_rank(1));
    for handle in [t0, t1] {
        let out = handle.join().unwrap();
        for &y in &out {
            assert!((y + 1.75).abs() < 1e-6, "interpolated {y}");
        }
    }
}
