mod errors;
mod bytes;
mod coarse_clock;
mod metrics;

pub use self::errors::{Error, ErrorKind, Result};
pub use self::bytes::{bytes_to_slice_mut, unsplit_bytes, bytes_are_contiguous};
pub use self::coarse_clock::{coarse_monotonic_now, coarse_monotonic_clock_updater};
pub use self::metrics::{Metrics, METRICS};
