use dval_core::DvalError;
use dval_parallel::{chunkify, MapReduceJob, ParallelBackend};
use proptest::prelude::*;

fn backends() -> Vec<ParallelBackend> {
    vec![
        ParallelBackend::sequential(),
        ParallelBackend::distributed(Some(2)).unwrap(),
    ]
}

fn concat_job(
    inputs: Vec<u32>,
    backend: ParallelBackend,
    n_jobs: isize,
) -> MapReduceJob<u32, Vec<u32>, Vec<u32>> {
    MapReduceJob::new(
        inputs,
        |chunk: Vec<u32>, _job_id| Ok(chunk),
        |parts: Vec<Vec<u32>>| Ok(parts.concat()),
        backend,
        Some(n_jobs),
    )
    .unwrap()
}

#[test]
fn single_job_returns_reduced_inputs_per_run() {
    for backend in backends() {
        for n_runs in [1, 2] {
            let job = concat_job(vec![1, 2, 3], backend.clone(), 1);
            assert_eq!(job.run(n_runs).unwrap(), vec![vec![1, 2, 3]; n_runs]);

            let empty = concat_job(vec![], backend.clone(), 1);
            assert_eq!(empty.run(n_runs).unwrap(), vec![Vec::<u32>::new(); n_runs]);
        }
    }
}

#[test]
fn chunkified_inputs_are_split_across_jobs() {
    for backend in backends() {
        let job = concat_job((0..10).collect(), backend.clone(), 2).chunkify_inputs(true);
        assert_eq!(job.n_jobs(), 2);
        assert_eq!(job.run(2).unwrap(), vec![(0..10).collect::<Vec<_>>(); 2]);

        let sums = MapReduceJob::new(
            (0..10u64).collect(),
            |chunk: Vec<u64>, _| Ok(chunk.iter().sum::<u64>()),
            |partials: Vec<u64>| Ok(partials.iter().sum::<u64>()),
            backend,
            Some(2),
        )
        .unwrap()
        .chunkify_inputs(true);
        assert_eq!(sums.run(1).unwrap(), vec![45]);
    }
}

#[test]
fn replicated_inputs_reach_every_job_with_distinct_ids() {
    let job = MapReduceJob::new(
        vec![7u32],
        |chunk: Vec<u32>, job_id| Ok((chunk, job_id)),
        |outputs: Vec<(Vec<u32>, usize)>| Ok(outputs),
        ParallelBackend::sequential(),
        Some(3),
    )
    .unwrap();
    let runs = job.run(2).unwrap();
    let ids: Vec<usize> = runs.iter().flatten().map(|(_, id)| *id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    assert!(runs.iter().flatten().all(|(chunk, _)| chunk == &vec![7]));
}

#[test]
fn map_errors_propagate() {
    for backend in backends() {
        let job = MapReduceJob::new(
            vec![1u32, 2],
            |_chunk: Vec<u32>, job_id| {
                if job_id == 1 {
                    Err(DvalError::config("bad-input", "refusing job 1"))
                } else {
                    Ok(0u32)
                }
            },
            |parts: Vec<u32>| Ok(parts.len()),
            backend,
            Some(2),
        )
        .unwrap();
        let err = job.run(1).unwrap_err();
        assert_eq!(err.info().code, "bad-input");
    }
}

#[test]
fn zero_jobs_is_rejected() {
    let err = MapReduceJob::new(
        vec![1u32],
        |chunk: Vec<u32>, _| Ok(chunk),
        |parts: Vec<Vec<u32>>| Ok(parts),
        ParallelBackend::sequential(),
        Some(0),
    )
    .unwrap_err();
    assert!(matches!(err, DvalError::Config(_)));
}

proptest! {
    #[test]
    fn chunks_are_contiguous_and_balanced(len in 0usize..60, n_chunks in 1usize..10) {
        let inputs: Vec<usize> = (0..len).collect();
        let chunks = chunkify(&inputs, n_chunks);
        prop_assert!(chunks.len() <= n_chunks.max(1));
        prop_assert_eq!(chunks.concat(), inputs);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        let (min, max) = (sizes.iter().min().copied().unwrap_or(0), sizes.iter().max().copied().unwrap_or(0));
        prop_assert!(max - min <= 1);
    }
}
