use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use u3vcam_device::{
    AcquireParams, Camera, CameraConfig, CapturedImage, Illumination, SimConfig, SimulatedCamera,
};
use u3vcam_frame::{image_size, PixelStats, BYTES_PER_PIXEL};

use crate::cmd::SimulateArgs;
use crate::exit::{device_error, io_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_record, OutputFormat, Record};

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args)?;
    let sim = SimulatedCamera::new(sim_config(&args, &config)?);
    for (chunk, fault) in &args.faults {
        sim.inject_stream_fault(*chunk, *fault);
    }
    for (address, status) in &args.rejections {
        sim.reject_writes(*address, *status);
    }
    if let Some(chunks) = args.stall_after {
        sim.stall_after(chunks);
    }

    let params = AcquireParams {
        exposure: args.exposure,
        illumination: if args.laser {
            Illumination::Laser
        } else {
            Illumination::Ambient
        },
    };
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;

    let cancel = CancellationToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    let profile = config.session.profile;
    let image = runtime.block_on(acquire(&sim, config, params, cancel, timeout))?;

    if let Some(path) = &args.output {
        std::fs::write(path, image.grid.to_wire_bytes())
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
        info!(path = %path.display(), "image written");
    }

    let record = CaptureRecord::new(&sim, &image, profile.as_str());
    print_record(&record, format);
    Ok(SUCCESS)
}

async fn acquire(
    sim: &SimulatedCamera,
    config: CameraConfig,
    params: AcquireParams,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> CliResult<CapturedImage> {
    let camera = Camera::new(config);
    let attached = camera
        .monitor()
        .device_added(sim.device_info(), sim)
        .await
        .map_err(|err| device_error("attach failed", err))?;
    if !attached {
        return Err(CliError::new(
            USAGE,
            "simulated device does not match the configured device filter",
        ));
    }

    let deadline = CancellationToken::new();
    if let Some(limit) = timeout {
        let deadline = deadline.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            deadline.cancel();
            cancel.cancel();
        });
    }

    match camera.acquire(&params, &cancel).await {
        Ok(image) => Ok(image),
        Err(err) if deadline.is_cancelled() => Err(CliError::new(
            TIMEOUT,
            format!("acquisition timed out: {err}"),
        )),
        Err(err) => Err(device_error("acquisition failed", err)),
    }
}

fn load_config(args: &SimulateArgs) -> CliResult<CameraConfig> {
    let mut config = match &args.config {
        Some(path) => CameraConfig::from_json_file(path)
            .map_err(|err| device_error(&format!("failed loading {}", path.display()), err))?,
        None => CameraConfig::default(),
    };
    if let Some(width) = args.width {
        config.session.width = width;
    }
    if let Some(height) = args.height {
        config.session.height = height;
    }
    if let Some(profile) = args.profile {
        config.session.profile = profile.into();
    }
    if let Some(attempts) = args.max_attempts {
        config.session.retry.max_attempts = attempts;
    }
    config
        .session
        .validate()
        .map_err(|err| device_error("invalid configuration", err))?;
    Ok(config)
}

/// Shape the simulated device after the session so the frame it streams is
/// the one the session expects.
fn sim_config(args: &SimulateArgs, config: &CameraConfig) -> CliResult<SimConfig> {
    let session = &config.session;
    let image_bytes = image_size(session.width, session.height)
        .map_err(|err| CliError::new(USAGE, format!("invalid geometry: {err}")))?;
    let per_transfer = image_bytes.div_ceil(session.payload_transfer_count as usize);
    let chunk_size = args.chunk_size.unwrap_or(per_transfer);
    if chunk_size == 0 {
        return Err(CliError::new(
            USAGE,
            "--chunk-size must be greater than zero",
        ));
    }
    debug!(chunk_size, image_bytes, "simulated stream shape");

    Ok(SimConfig {
        width: session.width,
        height: session.height,
        chunk_size,
        pending_acks: args.pending_acks,
        ..SimConfig::default()
    })
}

fn install_ctrlc_handler(cancel: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[derive(Serialize)]
struct CaptureRecord {
    device: String,
    profile: &'static str,
    width: u32,
    height: u32,
    exposure: u32,
    illumination: Illumination,
    block_id: Option<u64>,
    timestamp: Option<u64>,
    payload_chunks: usize,
    payload_bytes: usize,
    retries: u32,
    register_writes: usize,
    pixel_min: u16,
    pixel_max: u16,
    pixel_mean: f64,
    #[serde(skip)]
    pixels: Vec<u8>,
}

impl CaptureRecord {
    fn new(sim: &SimulatedCamera, image: &CapturedImage, profile: &'static str) -> Self {
        let PixelStats { min, max, mean } = image.grid.stats();
        Self {
            device: sim.config().name.clone(),
            profile,
            width: image.width,
            height: image.height,
            exposure: image.exposure,
            illumination: image.illumination,
            block_id: image.leader.map(|leader| leader.block_id),
            timestamp: image.leader.map(|leader| leader.timestamp),
            payload_chunks: image.payload_chunks,
            payload_bytes: image.grid.len() * BYTES_PER_PIXEL,
            retries: image.retries,
            register_writes: sim.writes().len(),
            pixel_min: min,
            pixel_max: max,
            pixel_mean: mean,
            pixels: image.grid.to_wire_bytes().to_vec(),
        }
    }
}

impl Record for CaptureRecord {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let optional = |value: Option<u64>| value.map_or("-".to_string(), |v| v.to_string());
        vec![
            ("device", self.device.clone()),
            ("profile", self.profile.to_string()),
            ("size", format!("{}x{}", self.width, self.height)),
            ("exposure", self.exposure.to_string()),
            (
                "illumination",
                match self.illumination {
                    Illumination::Ambient => "ambient".to_string(),
                    Illumination::Laser => "laser".to_string(),
                },
            ),
            ("block_id", optional(self.block_id)),
            ("timestamp", optional(self.timestamp)),
            ("payload_chunks", self.payload_chunks.to_string()),
            ("payload_bytes", self.payload_bytes.to_string()),
            ("retries", self.retries.to_string()),
            ("register_writes", self.register_writes.to_string()),
            ("pixel_min", self.pixel_min.to_string()),
            ("pixel_max", self.pixel_max.to_string()),
            ("pixel_mean", format!("{:.2}", self.pixel_mean)),
        ]
    }

    fn raw(&self) -> &[u8] {
        &self.pixels
    }
}
