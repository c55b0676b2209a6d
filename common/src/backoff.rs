// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry policies for polling providers
//!
//! Every polling loop in the provisioning workflow is a
//! retry-with-backoff over a describe call, with the deadline expressed
//! as the policy's `max_elapsed_time`.  When the deadline elapses the
//! retry surfaces the last transient error, which callers map to
//! [`crate::api::Error::TimedOut`].

use std::time::Duration;

pub use ::backoff::Error as BackoffError;
pub use ::backoff::future::{retry, retry_notify};
pub use ::backoff::{ExponentialBackoff, Notify, backoff::Backoff};

/// Return a short policy for teardown paths that contend with
/// still-terminating instances (e.g. deleting a placement group that the
/// provider briefly reports as in use).
pub fn cleanup_retry_policy(deadline: Duration) -> ::backoff::ExponentialBackoff {
    const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
    const MAX_INTERVAL: Duration = Duration::from_secs(3);
    poll_policy(INITIAL_INTERVAL, MAX_INTERVAL, deadline)
}

/// Build a bounded-interval polling policy with a hard deadline.
pub fn poll_policy(
    initial_interval: Duration,
    max_interval: Duration,
    deadline: Duration,
) -> ::backoff::ExponentialBackoff {
    ::backoff::ExponentialBackoff {
        current_interval: initial_interval,
        initial_interval,
        multiplier: 2.0,
        max_interval,
        max_elapsed_time: Some(deadline),
        ..::backoff::ExponentialBackoff::default()
    }
}
