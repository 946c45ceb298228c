use evalgrid_core::{ErrorInfo, EvalError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("job", "X@A")
        .with_context("group", "G1")
}

#[test]
fn fatal_wraps_once() {
    let err = EvalError::fatal(EvalError::Task(sample_info("task_failed", "boom")));
    let again = EvalError::fatal(err.clone());
    assert_eq!(err, again);
    assert_eq!(err.info().code, "task_failed");
    assert!(matches!(err.root_cause(), EvalError::Task(_)));
}

#[test]
fn suppressed_errors_never_replace_the_cause() {
    let primary = EvalError::fatal(EvalError::Build(sample_info("build_failed", "no model")));
    let err = primary
        .suppress(EvalError::Io(sample_info("sink_close", "disk full")))
        .suppress(EvalError::Io(sample_info("sink_close", "still full")));
    assert_eq!(err.info().code, "build_failed");
    assert_eq!(err.suppressed().len(), 2);
    assert!(matches!(err.suppressed()[0], EvalError::Io(_)));
}

#[test]
fn suppressing_on_a_bare_error_wraps_it() {
    let err = EvalError::Task(sample_info("task_failed", "boom"))
        .suppress(EvalError::Io(sample_info("sink_close", "closed")));
    assert!(matches!(err, EvalError::Evaluation { .. }));
    assert_eq!(err.info().code, "task_failed");
}

#[test]
fn cancellation_is_detected_through_wrappers() {
    let err = EvalError::fatal(EvalError::Cancelled(ErrorInfo::new("interrupted", "stop")));
    assert!(err.is_cancellation());
    assert!(!EvalError::Io(ErrorInfo::new("x", "y")).is_cancellation());
}

#[test]
fn display_includes_context_and_hint() {
    let info = sample_info("sink_write", "row rejected").with_hint("broken pipe");
    let rendered = EvalError::Io(info).to_string();
    assert_eq!(
        rendered,
        "io error: row rejected [sink_write] at group=G1, job=X@A: broken pipe"
    );
    assert_eq!(
        ErrorInfo::new("interrupted", "run interrupted").to_string(),
        "run interrupted [interrupted]"
    );
}

#[test]
fn context_accepts_displayable_values() {
    let info = ErrorInfo::new("row_limit", "too many rows")
        .with_context("rows", 12)
        .with_context("rows", 13);
    assert_eq!(info.context.get("rows").map(String::as_str), Some("13"));
}
