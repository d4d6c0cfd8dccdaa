//! A register-aware USB3 Vision device model.
//!
//! [`SimulatedCamera`] answers READMEM/WRITEMEM commands from a register
//! table and, once the stream is enabled and acquisition is started, queues
//! one frame (leader, payload chunks, trailer) on its stream pipe. Faults can
//! be injected per stream chunk. It backs the `simulate` CLI command and the
//! session tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;
use u3vcam_frame::codec::PREFIX;
use u3vcam_frame::stream::{IMAGE_LEADER_SIZE, IMAGE_TRAILER_SIZE, PAYLOAD_TYPE_IMAGE};
use u3vcam_frame::{
    decode_read, decode_write, AckHeader, ImageLeader, ImageTrailer, PixelGrid, PENDING_ACK,
    READMEM_ACK, WRITEMEM_ACK,
};
use u3vcam_transport::{BulkTransport, Channel, PipeBinding, TransportError, UsbInterface};

use crate::config::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use crate::error::Result;
use crate::monitor::{DeviceInfo, DeviceOpener};
use crate::regmap::{
    ACQUISITION_START, EXECUTE, SBRM_POINTER, SBRM_SIRM_ADDRESS, SIRM_CONTROL,
    SIRM_MAX_LEADER_SIZE, SIRM_MAX_TRAILER_SIZE, STREAM_ENABLE,
};

/// Mono12 packed into 16 bits.
const PIXEL_FORMAT_MONO12: u32 = 0x0110_0005;
const CONTROL_MAX_TRANSFER: usize = 1024;

/// Shape of the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub device_id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Stream transfer size; the payload is split into chunks of this size.
    pub chunk_size: usize,
    pub sbrm: u64,
    pub sirm: u64,
    /// Pending acknowledgments sent before each real one.
    pub pending_acks: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device_id: "sim-0".into(),
            name: "acA1920-40um (simulated)".into(),
            width: 1920,
            height: 1200,
            chunk_size: 1920 * 1200,
            sbrm: 0x1_0000,
            sirm: 0x2_0000,
            pending_acks: 0,
        }
    }
}

/// A failure injected in place of one stream transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFault {
    /// The read completes short with `received` bytes.
    Partial { received: usize },
    /// The host stack reports a recoverable error.
    Transient,
    /// A zero-length transfer.
    Empty,
    /// The device is unplugged.
    Detach,
}

#[derive(Debug, Default)]
struct SimState {
    registers: HashMap<u64, i64>,
    rejections: HashMap<u64, i16>,
    writes: Vec<(u64, i32)>,
    control: VecDeque<Bytes>,
    stream: VecDeque<Bytes>,
    faults: HashMap<usize, VecDeque<StreamFault>>,
    delivered: usize,
    stall_after: Option<usize>,
    frames: u64,
    detached: bool,
}

enum StreamOutcome {
    Ready(u3vcam_transport::Result<Bytes>),
    Stall,
}

/// A simulated acA1920-40um. Clones share one device.
#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    config: Arc<SimConfig>,
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimulatedCamera {
    pub fn new(config: SimConfig) -> Self {
        let mut state = SimState::default();
        state.registers.insert(SBRM_POINTER, config.sbrm as i64);
        state.registers.insert(
            config.sbrm.wrapping_add(SBRM_SIRM_ADDRESS),
            config.sirm as i64,
        );
        state.registers.insert(
            config.sirm.wrapping_add(SIRM_MAX_LEADER_SIZE),
            IMAGE_LEADER_SIZE as i64,
        );
        state.registers.insert(
            config.sirm.wrapping_add(SIRM_MAX_TRAILER_SIZE),
            IMAGE_TRAILER_SIZE as i64,
        );
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// How the host enumerator would report this device.
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.config.device_id.clone(),
            name: self.config.name.clone(),
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
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

    /// Answer writes to `address` with `status`.
    pub fn reject_writes(&self, address: u64, status: i16) {
        self.lock().rejections.insert(address, status);
    }

    /// Fail stream transfer number `chunk` (0 is the leader) once with `fault`.
    ///
    /// Several faults on one chunk fire in order.
    pub fn inject_stream_fault(&self, chunk: usize, fault: StreamFault) {
        let mut state = self.lock();
        state.faults.entry(chunk).or_default().push_back(fault);
    }

    /// Stop answering stream reads after `chunks` transfers.
    pub fn stall_after(&self, chunks: usize) {
        self.lock().stall_after = Some(chunks);
    }

    /// Unplug the device; every later call fails with `Detached`.
    pub fn detach(&self) {
        self.lock().detached = true;
    }

    /// Register writes received, in order.
    pub fn writes(&self) -> Vec<(u64, i32)> {
        self.lock().writes.clone()
    }

    pub fn register(&self, address: u64) -> Option<i64> {
        self.lock().registers.get(&address).copied()
    }

    /// Frames queued on the stream pipe so far.
    pub fn frames_started(&self) -> u64 {
        self.lock().frames
    }

    /// The image every frame carries.
    pub fn test_pattern(&self) -> u3vcam_frame::Result<PixelGrid> {
        let (width, height) = (self.config.width as usize, self.config.height as usize);
        let pixels = (0..height)
            .flat_map(|row| (0..width).map(move |col| pattern_value(row, col)))
            .collect();
        PixelGrid::new(width, height, pixels)
    }

    fn handle_command(&self, cmd: &[u8]) -> u3vcam_transport::Result<usize> {
        let mut state = self.lock();
        if state.detached {
            return Err(TransportError::Detached);
        }

        let (request_id, reply) = if let Ok((header, payload)) = decode_read(cmd) {
            let value = state.registers.get(&payload.address).copied().unwrap_or(0);
            let len = usize::from(payload.byte_count).min(8);
            let bytes = value.to_le_bytes();
            (header.request_id, ack(READMEM_ACK, 0, header.request_id, &bytes[..len]))
        } else if let Ok((header, payload)) = decode_write(cmd) {
            state.writes.push((payload.address, payload.data));
            state
                .registers
                .insert(payload.address, i64::from(payload.data));
            let status = state.rejections.get(&payload.address).copied().unwrap_or(0);
            if payload.address == ACQUISITION_START && payload.data == EXECUTE {
                let stream_on = state
                    .registers
                    .get(&self.config.sirm.wrapping_add(SIRM_CONTROL))
                    .is_some_and(|v| *v == i64::from(STREAM_ENABLE));
                if stream_on {
                    self.queue_frame(&mut state);
                }
            }
            (header.request_id, ack(WRITEMEM_ACK, status, header.request_id, &[]))
        } else {
            debug!(len = cmd.len(), "simulated device ignored unknown command");
            return Ok(cmd.len());
        };

        for _ in 0..self.config.pending_acks {
            state
                .control
                .push_back(ack(PENDING_ACK, 0, request_id, &[0; 4]));
        }
        state.control.push_back(reply);
        Ok(cmd.len())
    }

    fn queue_frame(&self, state: &mut SimState) {
        state.frames += 1;
        let block_id = state.frames;
        let (width, height) = (self.config.width as usize, self.config.height as usize);
        let mut wire = BytesMut::with_capacity(width * height * 2);
        for row in 0..height {
            for col in 0..width {
                wire.put_u16_le(pattern_value(row, col));
            }
        }
        let payload = wire.freeze();

        let mut leader = BytesMut::new();
        ImageLeader {
            leader_size: IMAGE_LEADER_SIZE as u16,
            block_id,
            payload_type: PAYLOAD_TYPE_IMAGE,
            timestamp: block_id * 1_000,
            pixel_format: PIXEL_FORMAT_MONO12,
            size_x: self.config.width,
            size_y: self.config.height,
            offset_x: 0,
            offset_y: 0,
            padding_x: 0,
        }
        .encode(&mut leader);
        state.stream.push_back(leader.freeze());

        let chunk_size = self.config.chunk_size.max(1);
        let mut rest = payload.clone();
        while !rest.is_empty() {
            let take = chunk_size.min(rest.len());
            state.stream.push_back(rest.split_to(take));
        }

        let mut trailer = BytesMut::new();
        ImageTrailer {
            trailer_size: IMAGE_TRAILER_SIZE as u16,
            block_id,
            status: 0,
            valid_payload_size: payload.len() as u64,
            size_y: self.config.height,
        }
        .encode(&mut trailer);
        state.stream.push_back(trailer.freeze());
        debug!(
            block_id,
            chunks = state.stream.len(),
            "simulated frame queued"
        );
    }

    fn next_stream(&self) -> StreamOutcome {
        let mut state = self.lock();
        if state.detached {
            return StreamOutcome::Ready(Err(TransportError::Detached));
        }
        if state.stall_after.is_some_and(|n| state.delivered >= n) {
            return StreamOutcome::Stall;
        }

        let index = state.delivered;
        if let Some(fault) = state.faults.get_mut(&index).and_then(VecDeque::pop_front) {
            let expected = state.stream.front().map_or(0, Bytes::len);
            let outcome = match fault {
                StreamFault::Partial { received } => Err(TransportError::PartialTransfer {
                    channel: Channel::StreamIn,
                    expected,
                    received,
                }),
                StreamFault::Transient => Err(TransportError::Transient {
                    channel: Channel::StreamIn,
                    reason: "simulated transfer error".into(),
                }),
                StreamFault::Empty => Ok(Bytes::new()),
                StreamFault::Detach => {
                    state.detached = true;
                    Err(TransportError::Detached)
                }
            };
            return StreamOutcome::Ready(outcome);
        }

        match state.stream.pop_front() {
            Some(chunk) => {
                state.delivered += 1;
                StreamOutcome::Ready(Ok(chunk))
            }
            None => StreamOutcome::Ready(Err(TransportError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "no stream data",
            )))),
        }
    }

    fn next_control(&self) -> u3vcam_transport::Result<Bytes> {
        let mut state = self.lock();
        if state.detached {
            return Err(TransportError::Detached);
        }
        state.control.pop_front().ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "no acknowledgment queued",
            ))
        })
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn pattern_value(row: usize, col: usize) -> u16 {
    ((row * 7 + col * 3) & 0x0FFF) as u16
}

fn ack(command_code: u16, status: i16, request_id: u16, data: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    AckHeader {
        prefix: PREFIX,
        status,
        command_code,
        payload_length: data.len() as u16,
        request_id,
    }
    .encode(&mut dst);
    dst.extend_from_slice(data);
    dst.freeze()
}

impl BulkTransport for SimulatedCamera {
    fn send(&self, data: &[u8]) -> impl Future<Output = u3vcam_transport::Result<usize>> + Send {
        let outcome = self.handle_command(data);
        async move {
            tokio::task::yield_now().await;
            outcome
        }
    }

    fn receive(
        &self,
        channel: Channel,
    ) -> impl Future<Output = u3vcam_transport::Result<Bytes>> + Send {
        let outcome = match channel {
            Channel::ControlIn => StreamOutcome::Ready(self.next_control()),
            Channel::StreamIn => self.next_stream(),
            Channel::ControlOut => StreamOutcome::Ready(Err(TransportError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "control-out is write-only",
            )))),
        };
        async move {
            match outcome {
                StreamOutcome::Ready(result) => {
                    tokio::task::yield_now().await;
                    result
                }
                StreamOutcome::Stall => std::future::pending().await,
            }
        }
    }

    fn max_transfer_size(&self, channel: Channel) -> usize {
        match channel {
            Channel::StreamIn => self.config.chunk_size,
            Channel::ControlIn | Channel::ControlOut => CONTROL_MAX_TRANSFER,
        }
    }
}

impl DeviceOpener for SimulatedCamera {
    type Transport = SimulatedCamera;

    async fn open(&self, device: &DeviceInfo, binding: PipeBinding) -> Result<SimulatedCamera> {
        debug!(device_id = %device.id, ?binding, "opening simulated device");
        Ok(self.clone())
    }
}
