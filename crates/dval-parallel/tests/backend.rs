use std::thread::sleep;
use std::time::Duration;

use dval_core::DvalError;
use dval_parallel::{
    BackendKind, DistributedBackend, ParallelBackend, ParallelConfig, RemoteExecutor,
    SequentialBackend,
};

#[test]
fn put_and_get_round_trip_on_every_backend() {
    for backend in [
        ParallelBackend::sequential(),
        ParallelBackend::distributed(Some(2)).unwrap(),
    ] {
        let handle = backend.put(vec![1, 2, 3]);
        assert!(handle.is_ready());
        assert_eq!(backend.get(&handle).unwrap(), vec![1, 2, 3]);
    }
}

#[test]
fn wrapped_functions_run_as_tasks() {
    for backend in [
        ParallelBackend::sequential(),
        ParallelBackend::distributed(Some(3)).unwrap(),
    ] {
        let square = backend.wrap(|x: u64| x * x);
        let handles: Vec<_> = (0..10).map(|x| square.call(x)).collect();
        let values = backend.get_all(&handles).unwrap();
        assert_eq!(values, (0..10).map(|x| x * x).collect::<Vec<_>>());
    }
}

#[test]
fn effective_n_jobs_resolution() {
    let sequential = SequentialBackend;
    assert_eq!(sequential.effective_n_jobs(None).unwrap(), 1);
    assert_eq!(sequential.effective_n_jobs(Some(-1)).unwrap(), 1);
    assert_eq!(sequential.effective_n_jobs(Some(4)).unwrap(), 4);
    assert!(matches!(
        sequential.effective_n_jobs(Some(0)),
        Err(DvalError::Config(_))
    ));

    let distributed = DistributedBackend::new(Some(2), None).unwrap();
    assert_eq!(distributed.n_threads(), 2);
    assert_eq!(distributed.effective_n_jobs(None).unwrap(), 2);
    assert_eq!(distributed.effective_n_jobs(Some(-3)).unwrap(), 2);
    assert_eq!(distributed.effective_n_jobs(Some(1)).unwrap(), 1);
    assert_eq!(distributed.effective_n_jobs(Some(16)).unwrap(), 2);
    assert!(distributed.effective_n_jobs(Some(0)).is_err());
    assert!(DistributedBackend::new(Some(0), None).is_err());
}

#[test]
fn slow_tasks_time_out_retryably_and_resolve_later() {
    let backend = DistributedBackend::new(Some(1), Some(Duration::from_millis(10))).unwrap();
    let handle = backend.spawn(|| {
        sleep(Duration::from_millis(200));
        42
    });
    let err = backend.get(&handle).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.info().code, "get-timeout");
    assert_eq!(handle.wait(None).unwrap(), 42);
    assert!(handle.is_ready());
    assert_eq!(backend.get(&handle.clone()).unwrap(), 42);
}

#[test]
fn panicking_tasks_become_backend_errors() {
    for backend in [
        ParallelBackend::sequential(),
        ParallelBackend::distributed(Some(1)).unwrap(),
    ] {
        let handle = backend.spawn(|| -> u32 { panic!("utility exploded") });
        let err = handle.wait(Some(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, DvalError::Backend(_)));
        assert_eq!(err.info().code, "remote-panic");
        assert!(err.info().context["panic"].contains("utility exploded"));
        assert!(!err.is_retryable());
    }
}

#[test]
fn backend_from_yaml_config() {
    let config: ParallelConfig =
        serde_yaml::from_str("backend: distributed\nn_workers: 2\nget_timeout_secs: 1.5\n")
            .unwrap();
    let backend = ParallelBackend::from_config(&config).unwrap();
    assert_eq!(backend.kind(), BackendKind::Distributed);
    assert_eq!(backend.effective_n_jobs(None).unwrap(), 2);

    let defaults: ParallelConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(defaults, ParallelConfig::default());
    assert_eq!(
        ParallelBackend::from_config(&defaults).unwrap().kind(),
        BackendKind::Sequential
    );

    let bad = ParallelConfig {
        get_timeout_secs: Some(-1.0),
        ..ParallelConfig::distributed(Some(1))
    };
    assert!(ParallelBackend::from_config(&bad).is_err());
}
