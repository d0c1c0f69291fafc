use dval_core::errors::{DvalError, ErrorInfo};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("index", 3)
        .with_context("reason", "example")
}

#[test]
fn only_timeouts_are_retryable() {
    let timeout = DvalError::Timeout(sample_info("get-timeout", "waited too long"));
    assert!(timeout.is_retryable());
    for err in [
        DvalError::Shape(sample_info("length-mismatch", "bad lengths")),
        DvalError::Backend(sample_info("remote-panic", "task panicked")),
        DvalError::config("bad-param", "n must be positive"),
    ] {
        assert!(!err.is_retryable());
    }
}

#[test]
fn display_includes_context_and_hint() {
    let err = DvalError::Index(
        sample_info("unknown-index", "index 3 not found").with_hint("check the utility indices"),
    );
    let text = err.to_string();
    assert!(text.starts_with("index error: index 3 not found (code: unknown-index)"));
    assert!(text.contains("index=3"));
    assert!(text.contains("hint: check the utility indices"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = DvalError::backend("remote-panic", "worker panicked");
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["family"], "Backend");
    assert_eq!(json["detail"]["code"], "remote-panic");
    let back: DvalError = serde_json::from_value(json).unwrap();
    assert_eq!(back, err);
}
