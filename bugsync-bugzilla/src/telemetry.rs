use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{info, warn};

pub fn emit_success(op: &str, section: &str, elapsed: Duration, count: usize) {
    info!(
        op,
        section,
        status = "ok",
        duration_ms = elapsed.as_millis() as u64,
        count,
        "bugzilla call finished"
    );
}

pub fn emit_failure(op: &str, section: &str, elapsed: Duration, error: &anyhow::Error) {
    warn!(
        op,
        section,
        status = "error",
        duration_ms = elapsed.as_millis() as u64,
        error = %format!("{error:#}"),
        "bugzilla call failed"
    );
}

pub fn timed<T>(op: &str, section: &str, call: impl FnOnce() -> Result<Vec<T>>) -> Result<Vec<T>> {
    let started = Instant::now();
    let result = call();
    match &result {
        Ok(items) => emit_success(op, section, started.elapsed(), items.len()),
        Err(error) => emit_failure(op, section, started.elapsed(), error),
    }
    result
}
