use thiserror::Error;

/// First slot of a completed page that does not follow the recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unexpected value at index {index}: expected {expected} got {actual}")]
pub struct RecurrenceError {
    pub index: usize,
    pub expected: u64,
    pub actual: u64,
}

/// Returns the first `len` terms: `1, 1, 2, 3, 5, ...` with wrapping `u64` addition.
pub fn fibonacci(len: usize) -> Vec<u64> {
    let mut out: Vec<u64> = Vec::with_capacity(len);
    for i in 0..len {
        let next = if i < 2 {
            1
        } else {
            out[i - 1].wrapping_add(out[i - 2])
        };
        out.push(next);
    }
    out
}

/// Checks `values[0] = values[1] = 1` and `values[i] = values[i-1] + values[i-2]` (mod 2^64).
///
/// The check is relative: each slot is compared against its two predecessors as stored, so the
/// reported `expected` is what the page itself implies at that index.
pub fn verify_recurrence(values: &[u64]) -> Result<(), RecurrenceError> {
    for (index, &actual) in values.iter().enumerate().take(2) {
        if actual != 1 {
            return Err(RecurrenceError {
                index,
                expected: 1,
                actual,
            });
        }
    }
    for index in 2..values.len() {
        let expected = values[index - 1].wrapping_add(values[index - 2]);
        if values[index] != expected {
            return Err(RecurrenceError {
                index,
                expected,
                actual: values[index],
            });
        }
    }
    Ok(())
}
