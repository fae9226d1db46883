use serde::{Serialize, Serializer};
use std::fmt;
use std::time::{Duration, Instant};

/// Elapsed wall-clock time of a measured operation
///
/// Displays and serializes as decimal milliseconds with exactly six
/// fractional digits, e.g. `"0.123456"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProcessingTime(Duration);

impl ProcessingTime {
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Milliseconds as a float, for logging
    pub fn as_millis_f64(&self) -> f64 {
        self.0.as_secs_f64() * 1000.0
    }
}

impl fmt::Display for ProcessingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Integer arithmetic keeps the digit count exact on every platform.
        let nanos = self.0.as_nanos();
        write!(f, "{}.{:06}", nanos / 1_000_000, nanos % 1_000_000)
    }
}

impl Serialize for ProcessingTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A computed value paired with the time it took to compute
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedResult<T> {
    pub data: T,
    pub processing_time: ProcessingTime,
}

/// Runs `operation` once on the calling thread and measures it with a
/// monotonic clock.
///
/// Nesting is allowed: an operation may itself call
/// `measure_execution_time`, and the outer duration then includes the inner
/// one. Panics inside `operation` unwind through this function untouched.
///
/// # Examples
///
/// ```
/// use echoservice::echo::timing::measure_execution_time;
///
/// let timed = measure_execution_time(|| 2 + 2);
/// assert_eq!(timed.data, 4);
/// assert!(timed.processing_time.to_string().contains('.'));
/// ```
pub fn measure_execution_time<T, F>(operation: F) -> TimedResult<T>
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let data = operation();
    let processing_time = ProcessingTime(start.elapsed());

    TimedResult {
        data,
        processing_time,
    }
}

/// Fallible variant of [`measure_execution_time`]
///
/// An error from `operation` is returned as-is and no `TimedResult` is
/// produced.
pub fn try_measure_execution_time<T, E, F>(operation: F) -> Result<TimedResult<T>, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let TimedResult {
        data,
        processing_time,
    } = measure_execution_time(operation);

    Ok(TimedResult {
        data: data?,
        processing_time,
    })
}
