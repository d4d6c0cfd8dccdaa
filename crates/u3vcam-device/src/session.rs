//! One image acquisition, from register configuration to pixel grid.
//!
//! ```text
//! Idle -> Configuring -> Exposing -> Draining -> Complete
//!            \______________\___________\_____-> Error
//! ```
//!
//! The stop write and, for laser illumination, the laser-disable write run
//! after every attempt, including failed and cancelled ones. Framing errors
//! and detaches mark the attachment detached; no partial frame is returned.

use std::fmt;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use u3vcam_frame::{AcquisitionFrame, FrameAssembler, ImageLeader, ImageTrailer, PixelGrid};
use u3vcam_transport::{BulkTransport, Channel, TransportError};

use crate::config::{AcquireParams, Illumination, SessionConfig};
use crate::error::{DeviceError, Result};
use crate::laser::LaserControl;
use crate::monitor::DeviceLease;
use crate::profile::{stop_write, StreamLayout};
use crate::regmap::{SBRM_POINTER, SBRM_SIRM_ADDRESS, SIRM_MAX_LEADER_SIZE, SIRM_MAX_TRAILER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Exposing,
    Draining,
    Complete,
    Error,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::Exposing => "exposing",
            SessionState::Draining => "draining",
            SessionState::Complete => "complete",
            SessionState::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reconstructed image and how it was taken.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub grid: PixelGrid,
    pub width: u32,
    pub height: u32,
    pub exposure: u32,
    pub illumination: Illumination,
    /// Parsed leader, when the device sent a well-formed one.
    pub leader: Option<ImageLeader>,
    pub trailer: Option<ImageTrailer>,
    pub payload_chunks: usize,
    /// Stream reads that failed and were retried.
    pub retries: u32,
}

/// Drives one acquisition over a leased device.
pub struct AcquisitionSession<'a, T> {
    lease: &'a DeviceLease<T>,
    config: &'a SessionConfig,
    state: SessionState,
    laser_requested: bool,
    retries: u32,
}

impl<'a, T: BulkTransport> AcquisitionSession<'a, T> {
    pub fn new(lease: &'a DeviceLease<T>, config: &'a SessionConfig) -> Self {
        Self {
            lease,
            config,
            state: SessionState::Idle,
            laser_requested: false,
            retries: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the acquisition to a terminal state.
    ///
    /// Cancelling `cancel` aborts between register writes and stream reads
    /// with [`DeviceError::Cancelled`] after cleanup has run.
    pub async fn run(
        &mut self,
        params: &AcquireParams,
        cancel: &CancellationToken,
    ) -> Result<CapturedImage> {
        if self.state != SessionState::Idle {
            return Err(DeviceError::Config(format!(
                "acquisition session already {}",
                self.state
            )));
        }
        self.config.validate()?;

        let drained = self.acquire(params, cancel).await;
        let cleanup = self.cleanup().await;

        let result = match (drained, cleanup) {
            (Ok(frame), Ok(())) => self.reconstruct(&frame, params),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(error = %cleanup_err, "cleanup after failed acquisition also failed");
                }
                Err(err)
            }
        };

        match &result {
            Ok(image) => {
                self.transition(SessionState::Complete);
                info!(
                    width = image.width,
                    height = image.height,
                    retries = image.retries,
                    "acquisition complete"
                );
            }
            Err(err) => {
                self.transition(SessionState::Error);
                warn!(error = %err, kind = %err.kind(), "acquisition failed");
                if err.is_fatal_to_attachment() {
                    self.lease.mark_detached();
                }
            }
        }
        result
    }

    async fn acquire(
        &mut self,
        params: &AcquireParams,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionFrame> {
        let lease = self.lease;
        let client = lease.client();

        self.transition(SessionState::Configuring);
        let sbrm = client.read_register(SBRM_POINTER).await? as u64;
        let sirm = client
            .read_register(sbrm.wrapping_add(SBRM_SIRM_ADDRESS))
            .await? as u64;
        let layout = StreamLayout {
            sirm,
            leader_size: client
                .read_block_size(sirm.wrapping_add(SIRM_MAX_LEADER_SIZE))
                .await?,
            trailer_size: client
                .read_block_size(sirm.wrapping_add(SIRM_MAX_TRAILER_SIZE))
                .await?,
        };
        debug!(
            sbrm = format_args!("{sbrm:#x}"),
            sirm = format_args!("{sirm:#x}"),
            leader_size = layout.leader_size,
            trailer_size = layout.trailer_size,
            "stream layout read"
        );

        let profile = self.config.profile;
        let writes = profile.configuration_writes(&layout, &self.config.shape(), params.exposure)?;
        for write in &writes {
            check_cancelled(cancel)?;
            client
                .write_logged(write.register, write.address, write.value)
                .await?;
        }

        if params.illumination == Illumination::Laser {
            check_cancelled(cancel)?;
            self.laser_requested = true;
            LaserControl::new(client).set_state(true).await?;
        }

        self.transition(SessionState::Exposing);
        for write in &profile.arm_writes(&layout) {
            check_cancelled(cancel)?;
            client
                .write_logged(write.register, write.address, write.value)
                .await?;
        }

        self.transition(SessionState::Draining);
        self.drain(cancel).await
    }

    async fn drain(&mut self, cancel: &CancellationToken) -> Result<AcquisitionFrame> {
        let mut assembler = FrameAssembler::for_image(self.config.width, self.config.height)?;
        let max_transfer = self.lease.client().max_stream_transfer();
        while !assembler.is_complete() {
            check_cancelled(cancel)?;
            let min_len = assembler.min_payload_transfer(max_transfer);
            let chunk = self.read_chunk(min_len, cancel).await?;
            let len = chunk.len();
            let role = assembler.push(chunk);
            trace!(?role, len, accumulated = assembler.accumulated(), "stream chunk");
        }
        Ok(assembler.finish()?)
    }

    /// Read one stream transfer, retrying transient failures per the policy.
    ///
    /// A transfer shorter than `min_len` is truncated; it is dropped and
    /// read again.
    async fn read_chunk(
        &mut self,
        min_len: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let client = self.lease.client();
        let policy = self.config.retry;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeviceError::Cancelled),
                result = client.read_stream() => result,
            };
            let err = match result {
                Ok(chunk) if chunk.is_empty() => TransportError::Transient {
                    channel: Channel::StreamIn,
                    reason: "zero-length transfer".into(),
                },
                Ok(chunk) => match min_len {
                    Some(expected) if chunk.len() < expected => TransportError::PartialTransfer {
                        channel: Channel::StreamIn,
                        expected,
                        received: chunk.len(),
                    },
                    _ => return Ok(chunk),
                },
                Err(DeviceError::Transport(err)) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            if !policy.allows_retry(attempts) {
                return Err(DeviceError::RetriesExhausted {
                    attempts,
                    source: err,
                });
            }
            self.retries += 1;
            let delay = policy.delay_for(attempts);
            warn!(
                attempt = attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "stream read failed; retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeviceError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Stop acquisition and switch the laser off if it was requested.
    ///
    /// Both writes are attempted; the first failure is returned.
    async fn cleanup(&mut self) -> Result<()> {
        let client = self.lease.client();
        let stop = stop_write();
        let stopped = client
            .write_logged(stop.register, stop.address, stop.value)
            .await
            .map(|_| ());

        let laser_off = if self.laser_requested {
            LaserControl::new(client).set_state(false).await
        } else {
            Ok(())
        };
        debug!(
            stopped = stopped.is_ok(),
            laser_off = laser_off.is_ok(),
            "acquisition cleanup done"
        );
        stopped.and(laser_off)
    }

    fn reconstruct(
        &self,
        frame: &AcquisitionFrame,
        params: &AcquireParams,
    ) -> Result<CapturedImage> {
        let (width, height) = (self.config.width, self.config.height);
        let leader = frame.leader_info().ok();
        let trailer = frame.trailer_info().ok();
        if let Some(leader) = &leader {
            if (leader.size_x, leader.size_y) != (width, height) {
                warn!(
                    leader_width = leader.size_x,
                    leader_height = leader.size_y,
                    width,
                    height,
                    "leader geometry differs from configuration"
                );
            }
        }

        Ok(CapturedImage {
            grid: frame.unpack(width, height)?,
            width,
            height,
            exposure: params.exposure,
            illumination: params.illumination,
            leader,
            trailer,
            payload_chunks: frame.payload_chunks.len(),
            retries: self.retries,
        })
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "acquisition state");
        self.state = next;
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(DeviceError::Cancelled);
    }
    Ok(())
}
