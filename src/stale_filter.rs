// Picks the freshest in-window sample from a container's buffered stats stream.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::time::{Duration, Instant, timeout_at};

use crate::engine::SampleStream;
use crate::error::EngineError;
use crate::models::RawSample;

/// Consume `stream` until a sample read in the same whole second as `now` (or later)
/// shows up; older buffered samples are discarded.
///
/// Returns `Ok(None)` when the stream ends or nothing fresh arrives within `wait`;
/// the caller treats that as a cue to rebuild the registry.
pub async fn next_fresh_sample(
    stream: &mut SampleStream,
    now: DateTime<Utc>,
    wait: Duration,
) -> Result<Option<RawSample>, EngineError> {
    let window_start = now.timestamp();
    let deadline = Instant::now() + wait;
    let mut skipped = 0usize;

    loop {
        match timeout_at(deadline, stream.next()).await {
            Err(_) => {
                tracing::debug!(skipped, "no fresh stats sample before timeout");
                return Ok(None);
            }
            Ok(None) => {
                tracing::debug!(skipped, "stats stream ended");
                return Ok(None);
            }
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(sample))) => {
                if sample.read.timestamp() >= window_start {
                    return Ok(Some(sample));
                }
                skipped += 1;
            }
        }
    }
}
