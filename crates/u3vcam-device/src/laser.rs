use tracing::info;
use u3vcam_transport::BulkTransport;

use crate::error::{DeviceError, Result};
use crate::registers::RegisterClient;
use crate::regmap::{LASER_ENABLE, LASER_GPIO_CONFIG, LASER_GPIO_OUTPUT};

/// Laser illumination control.
///
/// Unlike configuration writes, a rejected laser write is always an error.
#[derive(Debug)]
pub struct LaserControl<'a, T> {
    client: &'a RegisterClient<T>,
}

impl<'a, T: BulkTransport> LaserControl<'a, T> {
    pub fn new(client: &'a RegisterClient<T>) -> Self {
        Self { client }
    }

    /// Configure the laser line as an output, then switch it.
    pub async fn set_state(&self, enabled: bool) -> Result<()> {
        let gpio = self
            .client
            .write_register(LASER_GPIO_CONFIG, LASER_GPIO_OUTPUT)
            .await?;
        let enable = self
            .client
            .write_register(LASER_ENABLE, i32::from(enabled))
            .await?;

        let status = i32::from(gpio) | i32::from(enable);
        if status != 0 {
            return Err(DeviceError::LaserStateRejected { enabled, status });
        }
        info!(enabled, "laser state set");
        Ok(())
    }

    pub async fn is_enabled(&self) -> Result<bool> {
        Ok(self.client.read_block_size(LASER_ENABLE).await? != 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;
    use u3vcam_frame::decode_write;
    use u3vcam_transport::MockTransport;

    use super::*;
    use crate::registers::tests::{block_ack, write_ack};

    fn client(mock: &Arc<MockTransport>) -> RegisterClient<MockTransport> {
        RegisterClient::new(Arc::clone(mock), CancellationToken::new())
    }

    #[tokio::test]
    async fn enable_writes_gpio_then_enable() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(write_ack(0));
        mock.push_control(write_ack(0));
        let client = client(&mock);
        LaserControl::new(&client).set_state(true).await.unwrap();

        let writes: Vec<_> = mock
            .sent()
            .iter()
            .map(|cmd| {
                let (_, payload) = decode_write(cmd).unwrap();
                (payload.address, payload.data)
            })
            .collect();
        assert_eq!(writes, vec![(0xC0264, 1), (0xC02E4, 1)]);
    }

    #[tokio::test]
    async fn rejected_status_is_hard_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(write_ack(0));
        mock.push_control(write_ack(2));
        let client = client(&mock);
        let laser = LaserControl::new(&client);
        let err = laser.set_state(false).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::LaserStateRejected {
                enabled: false,
                status: 2
            }
        ));
    }

    #[tokio::test]
    async fn reads_enable_register() {
        let mock = Arc::new(MockTransport::new());
        mock.push_control(block_ack(1));
        mock.push_control(block_ack(0));
        let client = client(&mock);
        let laser = LaserControl::new(&client);
        assert!(laser.is_enabled().await.unwrap());
        assert!(!laser.is_enabled().await.unwrap());
    }
}
