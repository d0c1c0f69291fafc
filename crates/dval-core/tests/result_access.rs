use dval_core::{DvalError, SortKey, ValuationResult};

fn sample() -> ValuationResult {
    ValuationResult::builder(vec![3.0, 1.0, 2.0, 0.5])
        .variances(vec![0.4, 0.1, 0.3, 0.2])
        .counts(vec![4, 1, 9, 16])
        .indices(vec![10, 20, 30, 40])
        .names(vec!["d".into(), "b".into(), "c".into(), "a".into()])
        .algorithm("test")
        .build()
        .unwrap()
}

#[test]
fn construction_rejects_mismatched_lengths() {
    let err = ValuationResult::builder(vec![1.0, 2.0])
        .variances(vec![0.0])
        .build()
        .unwrap_err();
    assert!(matches!(err, DvalError::Shape(_)));
    assert_eq!(err.info().code, "length-mismatch");
}

#[test]
fn construction_rejects_duplicate_indices() {
    let err = ValuationResult::builder(vec![1.0, 2.0])
        .indices(vec![3, 3])
        .build()
        .unwrap_err();
    assert_eq!(err.info().code, "duplicate-index");
}

#[test]
fn defaults_fill_missing_arrays() {
    let result = ValuationResult::builder(vec![1.0, 2.0]).build().unwrap();
    assert_eq!(result.indices(), vec![0, 1]);
    assert_eq!(result.counts(), vec![1, 1]);
    assert_eq!(result.variances(), vec![0.0, 0.0]);
    assert_eq!(result.names(), vec!["0".to_string(), "1".to_string()]);
}

#[test]
fn sort_round_trip_reverses_order() {
    let mut result = sample();
    result.sort(SortKey::Value, false);
    let ascending: Vec<_> = result.iter().map(|item| item.index).collect();
    assert_eq!(ascending, vec![40, 20, 30, 10]);
    assert_eq!(result.values(), vec![0.5, 1.0, 2.0, 3.0]);
    assert_eq!(result.names(), vec!["a", "b", "c", "d"]);
    assert_eq!(result.counts(), vec![16, 1, 9, 4]);
    assert_eq!(result.sort_order(), Some(false));

    result.sort(SortKey::Value, true);
    let mut descending: Vec<_> = result.iter().map(|item| item.index).collect();
    descending.reverse();
    assert_eq!(descending, ascending);
    assert_eq!(result.indices(), vec![10, 30, 20, 40]);
    assert_eq!(result.counts(), vec![4, 9, 1, 16]);
}

#[test]
fn sort_by_other_keys() {
    let mut result = sample();
    result.sort(SortKey::Variance, false);
    assert_eq!(result.indices(), vec![20, 40, 30, 10]);
    result.sort(SortKey::Name, false);
    assert_eq!(result.indices(), vec![40, 20, 30, 10]);
    result.sort(SortKey::Index, true);
    assert_eq!(result.indices(), vec![40, 30, 20, 10]);
    assert_eq!(result.raw_values(), &[3.0, 1.0, 2.0, 0.5]);
}

#[test]
fn positional_access_follows_sort_order() {
    let mut result = sample();
    result.sort(SortKey::Value, false);
    assert_eq!(result.item(0).unwrap().index, 40);
    assert_eq!(result.item(-1).unwrap().index, 10);
    assert!(matches!(result.item(4), Err(DvalError::Index(_))));
    assert!(result.item(-5).is_err());

    let slice: Vec<_> = result.slice(1..3).into_iter().map(|item| item.index).collect();
    assert_eq!(slice, vec![20, 30]);
    assert_eq!(result.slice(2..).len(), 2);
    assert_eq!(result.slice(3..10).len(), 1);

    let picked: Vec<_> = result
        .select(&[0, -1])
        .unwrap()
        .into_iter()
        .map(|item| item.index)
        .collect();
    assert_eq!(picked, vec![40, 10]);
    assert!(result.select(&[0, 7]).is_err());
}

#[test]
fn index_access_ignores_sort_order() {
    let mut result = sample();
    result.sort(SortKey::Value, true);
    let item = result.get(30).unwrap();
    assert_eq!(item.value, 2.0);
    assert_eq!(item.name, "c");
    assert!((item.stderr().unwrap() - (0.3f64 / 9.0).sqrt()).abs() < 1e-12);
    assert!(matches!(result.get(99), Err(DvalError::Index(_))));
    assert!(result.update(99, 1.0).is_err());
}

#[test]
fn stderr_uses_counts() {
    let result = sample();
    let stderr = result.stderr();
    assert!((stderr[0] - (0.4f64 / 4.0).sqrt()).abs() < 1e-12);
    assert!((stderr[3] - (0.2f64 / 16.0).sqrt()).abs() < 1e-12);
}

#[test]
fn items_order_by_value() {
    let result = sample();
    let best = result.iter().max().unwrap();
    assert_eq!(best.index, 10);
    let worst = result.iter().min().unwrap();
    assert_eq!(worst.index, 40);
}

#[test]
fn table_projection_honours_sort_and_keys() {
    let mut result = sample();
    result.sort(SortKey::Value, true);
    let table = result.to_table(None, true);
    assert_eq!(table.column, "test");
    assert_eq!(table.rows[0].key, "d");
    assert!((table.rows[0].stderr - (0.4f64 / 4.0).sqrt()).abs() < 1e-12);

    let mut buffer = Vec::new();
    result.to_table(Some("shapley"), false).write_csv(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("index,shapley,shapley_stderr"));
    assert!(lines.next().unwrap().starts_with("10,3,"));
}

#[test]
fn zeros_and_random_constructors() {
    let names = vec!["x".to_string(), "y".to_string()];
    let zeros = ValuationResult::zeros("algo", &[5, 7], Some(&names)).unwrap();
    assert_eq!(zeros.raw_counts(), &[0, 0]);
    assert_eq!(zeros.get(7).unwrap().name, "y");
    assert!(ValuationResult::zeros("algo", &[5], Some(&names)).is_err());

    let mut rng = dval_core::RngHandle::from_seed(3);
    let random = ValuationResult::from_random(6, &mut rng);
    assert_eq!(random.len(), 6);
    assert!(random.status().is_converged());
    assert!(random.raw_values().iter().all(|v| (-1.0..=1.0).contains(v)));
}
