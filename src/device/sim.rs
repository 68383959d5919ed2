//! Simulated camera backend.
//!
//! Stands in for the vendor transport when the node runs without hardware
//! attached and backs the test suite with deterministic frames. The device
//! carries a GenICam-style parameter table and a bounded grab queue fed by a
//! producer task at the configured frame rate.

use super::{CameraBackend, CameraDevice, DeviceError, DeviceInfo, GrabOutcome, ParamValue};
use crate::frame::{RawFrame, SensorFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One entry in the device parameter table.
#[derive(Debug, Clone)]
pub(crate) struct ParamEntry {
    pub value: ParamValue,
    pub writable: bool,
    pub int_range: Option<(i64, i64)>,
    pub float_range: Option<(f64, f64)>,
}

impl ParamEntry {
    fn integer(value: i64, range: (i64, i64), writable: bool) -> Self {
        Self {
            value: ParamValue::Integer(value),
            writable,
            int_range: Some(range),
            float_range: None,
        }
    }

    fn float(value: f64, range: (f64, f64), writable: bool) -> Self {
        Self {
            value: ParamValue::Float(value),
            writable,
            int_range: None,
            float_range: Some(range),
        }
    }

    fn enumeration(value: &str, writable: bool) -> Self {
        Self {
            value: ParamValue::Enumeration(value.to_string()),
            writable,
            int_range: None,
            float_range: None,
        }
    }
}

/// Parameter table mirroring the nodes a GigE area-scan camera exposes.
pub(crate) fn gige_param_table() -> HashMap<String, ParamEntry> {
    let mut params = HashMap::new();
    params.insert(
        "Width".to_string(),
        ParamEntry::integer(640, (16, 1920), true),
    );
    params.insert(
        "Height".to_string(),
        ParamEntry::integer(480, (16, 1200), true),
    );
    params.insert(
        "OffsetX".to_string(),
        ParamEntry::integer(0, (0, 1904), true),
    );
    params.insert(
        "OffsetY".to_string(),
        ParamEntry::integer(0, (0, 1184), true),
    );
    params.insert(
        "AcquisitionFrameRateAbs".to_string(),
        ParamEntry::float(24.0, (1.0, 120.0), true),
    );
    params.insert(
        "ResultingFrameRateAbs".to_string(),
        ParamEntry::float(24.0, (1.0, 120.0), false),
    );
    params.insert(
        "PixelFormat".to_string(),
        ParamEntry::enumeration("Mono8", true),
    );
    params.insert(
        "GevSCPSPacketSize".to_string(),
        ParamEntry::integer(1500, (220, 16404), true),
    );
    params.insert(
        "AutoFunctionAOISelector".to_string(),
        ParamEntry::enumeration("AOI1", true),
    );
    params.insert(
        "AutoFunctionAOIOffsetX".to_string(),
        ParamEntry::integer(0, (0, 1904), true),
    );
    params.insert(
        "AutoFunctionAOIOffsetY".to_string(),
        ParamEntry::integer(0, (0, 1184), true),
    );
    params.insert(
        "AutoFunctionAOIWidth".to_string(),
        ParamEntry::integer(640, (16, 1920), true),
    );
    params.insert(
        "AutoFunctionAOIHeight".to_string(),
        ParamEntry::integer(480, (16, 1200), true),
    );
    params.insert(
        "AutoTargetValue".to_string(),
        ParamEntry::integer(100, (0, 255), true),
    );
    params.insert(
        "AutoFunctionProfile".to_string(),
        ParamEntry::enumeration("GainMinimum", true),
    );
    params.insert("GainAuto".to_string(), ParamEntry::enumeration("Off", true));
    params.insert(
        "ExposureAuto".to_string(),
        ParamEntry::enumeration("Off", true),
    );
    params.insert(
        "GainRaw".to_string(),
        ParamEntry::integer(36, (0, 1023), true),
    );
    params.insert(
        "AutoGainRawLowerLimit".to_string(),
        ParamEntry::integer(0, (0, 1023), true),
    );
    params.insert(
        "AutoGainRawUpperLimit".to_string(),
        ParamEntry::integer(1023, (0, 1023), true),
    );
    params
}

/// Simulated transport layer announcing a fixed device list.
pub struct SimBackend {
    devices: Vec<DeviceInfo>,
}

impl SimBackend {
    /// Backend announcing a single simulated camera with the given serial.
    pub fn with_serial(serial: &str) -> Self {
        Self {
            devices: vec![DeviceInfo {
                id: serial.to_string(),
                model: "simGigE-1300".to_string(),
                full_name: format!("sim://gige/{}", serial),
            }],
        }
    }

    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }
}

impl CameraBackend for SimBackend {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.clone())
    }

    fn connect(&self, info: &DeviceInfo) -> Result<Box<dyn CameraDevice>, DeviceError> {
        if !self.devices.contains(info) {
            return Err(DeviceError::Transport(format!(
                "device '{}' is not attached",
                info.id
            )));
        }
        debug!("Connecting simulated device {}", info.id);
        Ok(Box::new(SimDevice::new(info.clone())))
    }
}

struct QueueState {
    items: VecDeque<GrabOutcome>,
    capacity: usize,
}

/// Bounded grab-result queue shared between the producer task and the device.
struct GrabQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    overruns: AtomicU64,
}

impl GrabQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                capacity: 0,
            }),
            notify: Notify::new(),
            overruns: AtomicU64::new(0),
        }
    }

    fn reset(&self, capacity: usize) {
        let mut state = self.state.lock();
        state.items.clear();
        state.capacity = capacity;
    }

    fn push(&self, outcome: GrabOutcome) {
        {
            let mut state = self.state.lock();
            if state.items.len() >= state.capacity {
                // Oldest result is dropped when the pool is exhausted
                state.items.pop_front();
                self.overruns.fetch_add(1, Ordering::Relaxed);
            }
            state.items.push_back(outcome);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<GrabOutcome> {
        self.state.lock().items.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    fn clear(&self) {
        self.state.lock().items.clear();
    }
}

/// Simulated capture device producing deterministic pattern frames.
pub struct SimDevice {
    info: DeviceInfo,
    open: bool,
    params: HashMap<String, ParamEntry>,
    queue: Arc<GrabQueue>,
    producer: Option<JoinHandle<()>>,
}

impl SimDevice {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            open: false,
            params: gige_param_table(),
            queue: Arc::new(GrabQueue::new()),
            producer: None,
        }
    }

    /// Grab results dropped because the buffer pool was exhausted.
    pub fn queue_overruns(&self) -> u64 {
        self.queue.overruns.load(Ordering::Relaxed)
    }

    fn entry(&self, name: &str) -> Result<&ParamEntry, DeviceError> {
        self.params
            .get(name)
            .ok_or_else(|| DeviceError::UnknownParameter(name.to_string()))
    }
}

/// Deterministic test pattern keyed by position and sequence number.
fn pattern_frame(width: u32, height: u32, sequence: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height as u64 {
        for x in 0..width as u64 {
            data.push(((x + y + sequence) % 256) as u8);
        }
    }
    data
}

#[async_trait]
impl CameraDevice for SimDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        debug!("Opening simulated device {}", self.info.id);
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.is_grabbing() {
            self.stop_grabbing();
        }
        debug!("Closing simulated device {}", self.info.id);
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn parameter(&self, name: &str) -> Result<ParamValue, DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        Ok(self.entry(name)?.value.clone())
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        let entry = self.entry(name)?;
        if !entry.writable {
            return Err(DeviceError::ReadOnly(name.to_string()));
        }

        match (&entry.value, &value) {
            (ParamValue::Integer(_), ParamValue::Integer(v)) => {
                let (min, max) = entry.int_range.unwrap_or((i64::MIN, i64::MAX));
                if *v < min || *v > max {
                    return Err(DeviceError::ParameterRejected {
                        name: name.to_string(),
                        value: value.to_string(),
                        details: format!("outside range [{}, {}]", min, max),
                    });
                }
            }
            (ParamValue::Float(_), ParamValue::Float(v)) => {
                let (min, max) = entry.float_range.unwrap_or((f64::MIN, f64::MAX));
                if *v < min || *v > max {
                    return Err(DeviceError::ParameterRejected {
                        name: name.to_string(),
                        value: value.to_string(),
                        details: format!("outside range [{}, {}]", min, max),
                    });
                }
            }
            (ParamValue::Enumeration(_), ParamValue::Enumeration(_)) => {}
            _ => {
                return Err(DeviceError::ParameterRejected {
                    name: name.to_string(),
                    value: value.to_string(),
                    details: "type mismatch".to_string(),
                });
            }
        }

        self.params.get_mut(name).expect("entry checked above").value = value.clone();

        // The grab engine recomputes the achievable rate whenever the
        // requested rate changes.
        if name == "AcquisitionFrameRateAbs" {
            if let Some(resulting) = self.params.get_mut("ResultingFrameRateAbs") {
                resulting.value = value;
            }
        }

        Ok(())
    }

    fn is_writable(&self, name: &str) -> bool {
        self.params.get(name).map(|e| e.writable).unwrap_or(false)
    }

    fn integer_range(&self, name: &str) -> Result<(i64, i64), DeviceError> {
        self.entry(name)?
            .int_range
            .ok_or_else(|| DeviceError::NoRange(name.to_string()))
    }

    fn float_range(&self, name: &str) -> Result<(f64, f64), DeviceError> {
        self.entry(name)?
            .float_range
            .ok_or_else(|| DeviceError::NoRange(name.to_string()))
    }

    fn start_grabbing(&mut self, buffer_count: usize) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        if self.producer.is_some() {
            return Err(DeviceError::AlreadyGrabbing);
        }

        // Settings are latched when grabbing starts, as on real hardware
        let width = self
            .parameter("Width")?
            .as_integer()
            .expect("Width is integer") as u32;
        let height = self
            .parameter("Height")?
            .as_integer()
            .expect("Height is integer") as u32;
        let rate = self
            .parameter("ResultingFrameRateAbs")?
            .as_float()
            .expect("frame rate is float");
        let format = self
            .parameter("PixelFormat")?
            .as_enumeration()
            .and_then(SensorFormat::from_param_str)
            .unwrap_or(SensorFormat::Mono8);

        self.queue.reset(buffer_count);
        let queue = Arc::clone(&self.queue);
        let period = Duration::from_secs_f64(1.0 / rate.max(1.0));

        info!(
            "Simulated device {} grabbing {}x{} {} at {:.1} fps ({} buffers)",
            self.info.id,
            width,
            height,
            format.as_param_str(),
            rate,
            buffer_count
        );

        self.producer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut sequence = 0u64;
            loop {
                interval.tick().await;
                let frame = RawFrame::new(
                    sequence,
                    SystemTime::now(),
                    width,
                    height,
                    format,
                    pattern_frame(width, height, sequence),
                );
                queue.push(GrabOutcome::Frame(frame));
                sequence += 1;
            }
        }));

        Ok(())
    }

    fn stop_grabbing(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
            self.queue.clear();
            debug!("Simulated device {} stopped grabbing", self.info.id);
        }
    }

    fn is_grabbing(&self) -> bool {
        self.producer.is_some()
    }

    fn retrieve(&mut self) -> Option<GrabOutcome> {
        self.queue.pop()
    }

    async fn wait_grab_ready(&self) -> Result<(), DeviceError> {
        loop {
            let notified = self.queue.notify.notified();
            if !self.queue.is_empty() {
                return Ok(());
            }
            notified.await;
        }
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.stop_grabbing();
    }
}
