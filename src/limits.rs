// Hard limits. Requests that exceed them fail with BadRequest rather than
// growing server memory without bound.

use std::time::Duration;

/// Largest datagram either side will read. UDP payload ceiling.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

pub const MAX_FACILITY_NAME_LEN: usize = 256;
pub const MAX_USER_NAME_LEN: usize = 256;

pub const MAX_FACILITIES: usize = 10_000;

/// A facility cannot hold more non-overlapping one-minute bookings than this anyway.
pub const MAX_BOOKINGS_PER_FACILITY: usize = 10_080;

pub const MAX_MONITORS: usize = 10_000;

/// One week.
pub const MAX_MONITOR_WINDOW_SECS: u32 = 7 * 24 * 3600;

/// Longer reply-cache lifetimes are cut down to one week.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Longest a client waits for one reply before retransmitting.
pub const MAX_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3600);
