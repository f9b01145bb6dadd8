//! Panic guards for caller-supplied validators

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::FutureExt;
use thiserror::Error;
use tracing::error;

use crate::error::{
    ErrorDetail, MessageDetail, StackFrame, ValidationError, ValidationFailureType,
    ValidationResult,
};

/// Inner error of a `*ValidatorThrew` failure
#[derive(Debug, Clone, Error)]
#[error("validator '{validator}' panicked: {message}")]
pub struct ValidatorPanic {
    /// Which validator panicked
    pub validator: &'static str,
    /// Panic payload, when it was a string
    pub message: String,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn panic_error(
    origin: StackFrame,
    validator: &'static str,
    failure_type: ValidationFailureType,
    detail: ErrorDetail,
    payload: &(dyn Any + Send),
) -> ValidationError {
    let panic = ValidatorPanic {
        validator,
        message: panic_message(payload),
    };
    error!(validator, panic = %panic.message, "Custom validator panicked");

    ValidationError::new_at(
        origin,
        MessageDetail::new("The {0} validator threw an exception.").arg(validator),
        failure_type,
        detail,
    )
    .with_inner_error(panic)
}

/// Run a synchronous override, converting a panic into a `failure_type` error
///
/// `detail` builds the payload reported when the override panics.
#[track_caller]
pub(crate) fn guard<T>(
    validator: &'static str,
    failure_type: ValidationFailureType,
    detail: impl FnOnce() -> ErrorDetail,
    call: impl FnOnce() -> ValidationResult<T>,
) -> ValidationResult<T> {
    let origin = StackFrame::current();
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(panic_error(
            origin,
            validator,
            failure_type,
            detail(),
            payload.as_ref(),
        )),
    }
}

/// Async counterpart of [`guard`]; the origin frame is supplied by the caller
pub(crate) async fn guard_async<T, F>(
    origin: StackFrame,
    validator: &'static str,
    failure_type: ValidationFailureType,
    detail: impl FnOnce() -> ErrorDetail,
    call: F,
) -> ValidationResult<T>
where
    F: Future<Output = ValidationResult<T>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panic_error(
            origin,
            validator,
            failure_type,
            detail(),
            payload.as_ref(),
        )),
    }
}
