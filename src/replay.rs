//! Replay Engine
//!
//! Plays a recorded motion trace back through a connected session at the
//! original cadence. Delta-times are accumulated across skipped samples, so
//! a stride larger than one still waits the sum of the skipped intervals
//! rather than just the last one.

use crate::domain::command::Command;
use crate::domain::motion::MotionSample;
use crate::error::GloveError;
use crate::infrastructure::bluetooth::session::GloveSession;
use crate::infrastructure::bluetooth::transport::Transport;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of one replay run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    /// Number of movement commands issued (excluding the final reset).
    pub commands_sent: usize,
    /// Recorded time covered, in seconds.
    pub total_elapsed: f64,
    /// True when the run stopped on a cancellation request.
    pub aborted: bool,
}

#[derive(Debug)]
pub struct ReplayEngine {
    stride: usize,
}

impl ReplayEngine {
    /// A send decision is made once every `stride` samples; sample 0 is
    /// always sent.
    pub fn new(stride: usize) -> Result<Self, GloveError> {
        if stride == 0 {
            return Err(GloveError::InvalidArgument(
                "replay stride must be at least 1".to_string(),
            ));
        }
        Ok(Self { stride })
    }

    /// Drive the session through the sample sequence.
    ///
    /// Cancellation is observed between sends and during the inter-sample
    /// wait, never mid-write. Whether the run completes or aborts, a single
    /// neutral-reset command returns the glove to an open posture as long as
    /// the session is still operational.
    pub async fn run<T: Transport>(
        &self,
        session: &mut GloveSession<T>,
        samples: &[MotionSample],
        cancel: &CancellationToken,
    ) -> Result<ReplaySummary, GloveError> {
        info!(
            "replaying {} samples, one command every {} sample(s)",
            samples.len(),
            self.stride
        );

        let mut time_to_wait = 0.0f64;
        let mut total_elapsed = 0.0f64;
        let mut commands_sent = 0usize;
        let mut aborted = false;

        for (index, sample) in samples.iter().enumerate() {
            if cancel.is_cancelled() {
                aborted = true;
                break;
            }

            // Accumulate the time of every sample for faithful playback speed,
            // even for samples the stride skips.
            time_to_wait += sample.delta_time;
            total_elapsed += sample.delta_time;

            if index % self.stride != 0 {
                continue;
            }

            let angles = sample.servo_angles();
            session
                .send(&Command::SetAllServos {
                    angles: angles.to_vec(),
                })
                .await?;
            commands_sent += 1;
            info!(
                "t={:6.2}s angles={:?} waiting {:.4}s",
                total_elapsed, angles, time_to_wait
            );

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(time_to_wait)) => {}
                _ = cancel.cancelled() => {
                    aborted = true;
                }
            }
            time_to_wait = 0.0;

            if aborted {
                break;
            }
        }

        if aborted {
            warn!("replay aborted after {} command(s)", commands_sent);
        } else {
            info!("replay finished, resetting servos to open posture");
        }

        // Best-effort reset; a failure here must not mask the run outcome.
        if session.is_operational() {
            if let Err(e) = session.send(&Command::neutral()).await {
                warn!("neutral reset failed: {}", e);
            }
        }

        Ok(ReplaySummary {
            commands_sent,
            total_elapsed,
            aborted,
        })
    }
}
