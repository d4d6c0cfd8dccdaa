use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use u3vcam_transport::BulkTransport;

use crate::config::{AcquireParams, CameraConfig};
use crate::error::{DeviceError, Result};
use crate::laser::LaserControl;
use crate::monitor::{DeviceEvent, DeviceMonitor};
use crate::session::{AcquisitionSession, CapturedImage};

/// The only laser supported devices carry.
pub const LASER_INDEX: u8 = 0;

/// High-level handle: one monitored device plus its configuration.
pub struct Camera<T> {
    monitor: DeviceMonitor<T>,
    config: CameraConfig,
}

impl<T: BulkTransport> Camera<T> {
    pub fn new(config: CameraConfig) -> Self {
        let monitor = DeviceMonitor::with_pending_ack_limit(
            config.filter.clone(),
            config.interfaces.layout(),
            config.session.pending_ack_limit,
        );
        Self { monitor, config }
    }

    pub fn monitor(&self) -> &DeviceMonitor<T> {
        &self.monitor
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn image_width(&self) -> u32 {
        self.config.session.width
    }

    pub fn image_height(&self) -> u32 {
        self.config.session.height
    }

    pub fn is_attached(&self) -> bool {
        self.monitor.is_attached()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.monitor.subscribe()
    }

    /// Take one image.
    pub async fn acquire(
        &self,
        params: &AcquireParams,
        cancel: &CancellationToken,
    ) -> Result<CapturedImage> {
        let lease = self.monitor.lease()?;
        AcquisitionSession::new(&lease, &self.config.session)
            .run(params, cancel)
            .await
    }

    pub async fn set_laser_state(&self, laser: u8, enabled: bool) -> Result<()> {
        check_laser(laser)?;
        let lease = self.monitor.lease()?;
        let result = LaserControl::new(lease.client()).set_state(enabled).await;
        if matches!(&result, Err(err) if err.is_fatal_to_attachment()) {
            lease.mark_detached();
        }
        result
    }

    pub async fn laser_enabled(&self, laser: u8) -> Result<bool> {
        check_laser(laser)?;
        let lease = self.monitor.lease()?;
        let result = LaserControl::new(lease.client()).is_enabled().await;
        if matches!(&result, Err(err) if err.is_fatal_to_attachment()) {
            lease.mark_detached();
        }
        result
    }
}

fn check_laser(laser: u8) -> Result<()> {
    if laser != LASER_INDEX {
        return Err(DeviceError::UnknownLaser(laser));
    }
    Ok(())
}
