//! Device attach/detach tracking and pipe ownership.
//!
//! The host enumerator reports devices; the monitor filters them, binds the
//! three bulk pipes and owns the resulting attachment. Sessions borrow it
//! through a [`DeviceLease`], one at a time. A detach cancels the
//! attachment's token so every register or stream call in flight fails with
//! [`DeviceError::Detached`].

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use u3vcam_transport::{BulkTransport, InterfaceLayout, PipeBinding, UsbInterface};

use crate::config::DeviceFilter;
use crate::error::{DeviceError, Result};
use crate::registers::{RegisterClient, DEFAULT_PENDING_ACK_LIMIT};

const EVENT_CAPACITY: usize = 16;

/// A device as reported by the host enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Host-assigned id, stable for one attachment.
    pub id: String,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub enabled: bool,
    pub interfaces: Vec<UsbInterface>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAttachmentState {
    Detached,
    Attached,
}

/// Attach/detach notification. `generation` increases with every attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Attached { device_id: String, generation: u64 },
    Detached { device_id: String, generation: u64 },
}

/// Input to [`DeviceMonitor::watch`], fed by the host enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(DeviceInfo),
    Removed { id: String },
}

/// Opens a transport over pipes the monitor has bound.
pub trait DeviceOpener: Send + Sync {
    type Transport: BulkTransport;

    fn open(
        &self,
        device: &DeviceInfo,
        binding: PipeBinding,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;
}

struct Attachment<T> {
    device: DeviceInfo,
    binding: PipeBinding,
    generation: u64,
    client: Arc<RegisterClient<T>>,
    detached: CancellationToken,
}

struct Slot<T> {
    generation: u64,
    attachment: Option<Attachment<T>>,
}

struct Shared<T> {
    filter: DeviceFilter,
    layout: InterfaceLayout,
    pending_ack_limit: u32,
    slot: Mutex<Slot<T>>,
    events: broadcast::Sender<DeviceEvent>,
    session_gate: Arc<Semaphore>,
}

/// Tracks the one device this host drives.
pub struct DeviceMonitor<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for DeviceMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: BulkTransport> DeviceMonitor<T> {
    pub fn new(filter: DeviceFilter, layout: InterfaceLayout) -> Self {
        Self::with_pending_ack_limit(filter, layout, DEFAULT_PENDING_ACK_LIMIT)
    }

    /// Create a monitor whose register clients give up after `limit`
    /// consecutive pending acknowledgments.
    pub fn with_pending_ack_limit(
        filter: DeviceFilter,
        layout: InterfaceLayout,
        pending_ack_limit: u32,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                filter,
                layout,
                pending_ack_limit,
                slot: Mutex::new(Slot {
                    generation: 0,
                    attachment: None,
                }),
                events,
                session_gate: Arc::new(Semaphore::new(1)),
            }),
        }
    }

    pub fn filter(&self) -> &DeviceFilter {
        &self.shared.filter
    }

    /// Handle a device reported by the enumerator.
    ///
    /// Returns `Ok(false)` when the filter rejects the device.
    pub async fn device_added<O>(&self, device: DeviceInfo, opener: &O) -> Result<bool>
    where
        O: DeviceOpener<Transport = T>,
    {
        if !self.shared.filter.matches(&device) {
            debug!(device_id = %device.id, name = %device.name, "device ignored by filter");
            return Ok(false);
        }
        let binding = PipeBinding::bind(&device.interfaces, &self.shared.layout)?;
        let transport = opener.open(&device, binding).await?;
        self.attach(device, binding, transport);
        Ok(true)
    }

    /// Install an opened transport as the current attachment.
    ///
    /// Any previous attachment is detached first.
    pub fn attach(&self, device: DeviceInfo, binding: PipeBinding, transport: T) -> u64 {
        let detached = CancellationToken::new();
        let client = RegisterClient::new(Arc::new(transport), detached.clone())
            .with_pending_ack_limit(self.shared.pending_ack_limit);

        let (previous, generation) = {
            let mut slot = self.slot();
            let previous = slot.attachment.take();
            slot.generation += 1;
            let generation = slot.generation;
            slot.attachment = Some(Attachment {
                device: device.clone(),
                binding,
                generation,
                client: Arc::new(client),
                detached,
            });
            (previous, generation)
        };

        if let Some(previous) = previous {
            self.announce_detach(previous);
        }
        info!(device_id = %device.id, name = %device.name, generation, "device attached");
        let _ = self.shared.events.send(DeviceEvent::Attached {
            device_id: device.id,
            generation,
        });
        generation
    }

    /// Handle a removal reported by the enumerator.
    pub fn device_removed(&self, device_id: &str) -> bool {
        let removed = {
            let mut slot = self.slot();
            match &slot.attachment {
                Some(current) if current.device.id == device_id => slot.attachment.take(),
                _ => None,
            }
        };
        match removed {
            Some(attachment) => {
                self.announce_detach(attachment);
                true
            }
            None => false,
        }
    }

    /// Drop the attachment of `generation` after a fatal error on it.
    ///
    /// A later attachment is left alone.
    pub fn mark_detached(&self, generation: u64) -> bool {
        let removed = {
            let mut slot = self.slot();
            match &slot.attachment {
                Some(current) if current.generation == generation => slot.attachment.take(),
                _ => None,
            }
        };
        match removed {
            Some(attachment) => {
                warn!(generation, "marking device detached after fatal error");
                self.announce_detach(attachment);
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot().attachment.is_some()
    }

    pub fn state(&self) -> DeviceAttachmentState {
        if self.is_attached() {
            DeviceAttachmentState::Attached
        } else {
            DeviceAttachmentState::Detached
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.shared.events.subscribe()
    }

    pub fn binding(&self) -> Option<PipeBinding> {
        self.slot().attachment.as_ref().map(|a| a.binding)
    }

    pub fn device(&self) -> Option<DeviceInfo> {
        self.slot().attachment.as_ref().map(|a| a.device.clone())
    }

    /// Borrow the attached device exclusively.
    pub fn lease(&self) -> Result<DeviceLease<T>> {
        let permit = Arc::clone(&self.shared.session_gate)
            .try_acquire_owned()
            .map_err(|_| DeviceError::Busy)?;
        let slot = self.slot();
        let attachment = slot.attachment.as_ref().ok_or(DeviceError::Detached)?;
        Ok(DeviceLease {
            client: Arc::clone(&attachment.client),
            binding: attachment.binding,
            generation: attachment.generation,
            monitor: self.clone(),
            _permit: permit,
        })
    }

    /// Drive attach/detach from enumerator events until the channel closes.
    pub async fn watch<O>(&self, mut events: mpsc::Receiver<WatchEvent>, opener: O)
    where
        O: DeviceOpener<Transport = T>,
    {
        while let Some(event) = events.recv().await {
            match event {
                WatchEvent::Added(device) => {
                    let device_id = device.id.clone();
                    if let Err(err) = self.device_added(device, &opener).await {
                        warn!(%device_id, error = %err, "failed to attach device");
                    }
                }
                WatchEvent::Removed { id } => {
                    self.device_removed(&id);
                }
            }
        }
        debug!("device watcher stopped");
    }

    fn announce_detach(&self, attachment: Attachment<T>) {
        attachment.detached.cancel();
        info!(
            device_id = %attachment.device.id,
            generation = attachment.generation,
            "device detached"
        );
        let _ = self.shared.events.send(DeviceEvent::Detached {
            device_id: attachment.device.id,
            generation: attachment.generation,
        });
    }

    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.shared
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive, attachment-scoped access to the device.
///
/// Once the attachment it came from is detached, every call through the
/// lease fails with [`DeviceError::Detached`].
pub struct DeviceLease<T> {
    client: Arc<RegisterClient<T>>,
    binding: PipeBinding,
    generation: u64,
    monitor: DeviceMonitor<T>,
    _permit: OwnedSemaphorePermit,
}

impl<T: BulkTransport> DeviceLease<T> {
    pub fn client(&self) -> &RegisterClient<T> {
        &self.client
    }

    pub fn binding(&self) -> PipeBinding {
        self.binding
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_detached(&self) -> bool {
        self.client.is_detached()
    }

    /// Report a fatal error on this attachment to the monitor.
    pub fn mark_detached(&self) -> bool {
        self.monitor.mark_detached(self.generation)
    }
}

#[cfg(test)]
mod tests {
    use u3vcam_frame::PENDING_ACK;
    use u3vcam_transport::MockTransport;

    use super::*;
    use crate::registers::tests::ack;

    struct MockOpener;

    impl DeviceOpener for MockOpener {
        type Transport = MockTransport;

        async fn open(&self, _device: &DeviceInfo, _binding: PipeBinding) -> Result<MockTransport> {
            Ok(MockTransport::new())
        }
    }

    fn camera(id: &str) -> DeviceInfo {
        DeviceInfo {
            id: id.into(),
            name: "acA1920-40um".into(),
            vendor_id: 0x2676,
            product_id: 0xBA02,
            enabled: true,
            interfaces: vec![
                UsbInterface {
                    number: 0,
                    bulk_in: vec![0x81],
                    bulk_out: vec![0x01],
                },
                UsbInterface {
                    number: 1,
                    bulk_in: vec![0x82],
                    bulk_out: Vec::new(),
                },
            ],
        }
    }

    fn monitor() -> DeviceMonitor<MockTransport> {
        DeviceMonitor::new(DeviceFilter::default(), InterfaceLayout::default())
    }

    async fn add(monitor: &DeviceMonitor<MockTransport>, id: &str) -> bool {
        monitor.device_added(camera(id), &MockOpener).await.unwrap()
    }

    #[tokio::test]
    async fn attach_binds_pipes_and_notifies() {
        let monitor = monitor();
        let mut events = monitor.subscribe();
        assert_eq!(monitor.state(), DeviceAttachmentState::Detached);

        assert!(add(&monitor, "a").await);
        assert!(monitor.is_attached());
        assert_eq!(
            monitor.binding(),
            Some(PipeBinding {
                control_out: 0x01,
                control_in: 0x81,
                stream_in: 0x82,
            })
        );
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::Attached {
                device_id: "a".into(),
                generation: 1,
            }
        );

        assert!(!monitor.device_removed("other"));
        assert!(monitor.device_removed("a"));
        assert_eq!(monitor.state(), DeviceAttachmentState::Detached);
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::Detached {
                device_id: "a".into(),
                generation: 1,
            }
        );
    }

    #[tokio::test]
    async fn filtered_and_disabled_devices_are_ignored() {
        let monitor = monitor();
        let mut disabled = camera("a");
        disabled.enabled = false;
        assert!(!monitor.device_added(disabled, &MockOpener).await.unwrap());

        let mut foreign = camera("b");
        foreign.vendor_id = 0x1234;
        assert!(!monitor.device_added(foreign, &MockOpener).await.unwrap());
        assert!(!monitor.is_attached());
    }

    #[tokio::test]
    async fn missing_stream_interface_fails_attach() {
        let monitor = monitor();
        let mut device = camera("a");
        device.interfaces.truncate(1);
        let err = monitor.device_added(device, &MockOpener).await.unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));
        assert!(!monitor.is_attached());
    }

    #[tokio::test]
    async fn pending_ack_limit_reaches_clients_attached_through_clones() {
        let monitor = DeviceMonitor::<MockTransport>::with_pending_ack_limit(
            DeviceFilter::default(),
            InterfaceLayout::default(),
            1,
        );
        let handle = monitor.clone();
        add(&handle, "a").await;

        let lease = monitor.lease().unwrap();
        let mock = lease.client().transport();
        mock.push_control(ack(PENDING_ACK, 0, 1, &[0; 4]));
        mock.push_control(ack(PENDING_ACK, 0, 1, &[0; 4]));
        let err = lease.client().write_register(0x40024, 1).await.unwrap_err();
        assert!(matches!(err, DeviceError::PendingAckLimit(1)));
    }

    #[tokio::test]
    async fn lease_is_exclusive_and_requires_attachment() {
        let monitor = monitor();
        assert!(matches!(monitor.lease(), Err(DeviceError::Detached)));

        add(&monitor, "a").await;
        let lease = monitor.lease().unwrap();
        assert!(matches!(monitor.lease(), Err(DeviceError::Busy)));
        drop(lease);
        assert!(monitor.lease().is_ok());
    }

    #[tokio::test]
    async fn detach_invalidates_outstanding_lease() {
        let monitor = monitor();
        add(&monitor, "a").await;
        let lease = monitor.lease().unwrap();

        monitor.device_removed("a");
        assert!(lease.is_detached());
        assert!(matches!(
            lease.client().read_register(0x1D8).await,
            Err(DeviceError::Detached)
        ));
    }

    #[tokio::test]
    async fn stale_generation_does_not_detach_new_attachment() {
        let monitor = monitor();
        add(&monitor, "a").await;
        let stale = monitor.lease().unwrap();
        drop(stale);
        monitor.device_removed("a");
        add(&monitor, "a").await;

        assert!(!monitor.mark_detached(1));
        assert!(monitor.is_attached());
        assert!(monitor.mark_detached(2));
        assert!(!monitor.is_attached());
    }

    #[tokio::test]
    async fn watch_follows_enumerator_events() {
        let monitor = monitor();
        let mut events = monitor.subscribe();
        let (tx, rx) = mpsc::channel(4);

        tx.send(WatchEvent::Added(camera("a"))).await.unwrap();
        let removed = WatchEvent::Removed { id: "a".into() };
        tx.send(removed).await.unwrap();
        drop(tx);
        monitor.watch(rx, MockOpener).await;

        assert!(matches!(
            events.recv().await.unwrap(),
            DeviceEvent::Attached { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            DeviceEvent::Detached { .. }
        ));
        assert!(!monitor.is_attached());
    }
}
