//! Scripted camera device for tests.
//!
//! Replays a fixed sequence of grab outcomes and records lifecycle calls so
//! tests can assert on open/stop counts and applied parameters after the
//! device has been moved into the acquisition task.

use super::sim::gige_param_table;
use super::{CameraBackend, CameraDevice, DeviceError, DeviceInfo, GrabOutcome, ParamValue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Grab sequence and wait behavior for one scripted session.
#[derive(Debug, Default)]
pub(crate) struct Script {
    /// Outcomes delivered in order by `retrieve`
    pub outcomes: Vec<GrabOutcome>,
    /// Ready signals where `retrieve` then yields nothing
    pub spurious_wakes: usize,
    /// After exhaustion, fail the wait instead of pending forever
    pub fail_wait_when_drained: bool,
}

/// Record of lifecycle calls made against a scripted device.
#[derive(Debug, Default)]
pub(crate) struct DeviceLog {
    pub opens: u64,
    pub closes: u64,
    pub grab_starts: u64,
    pub grab_stops: u64,
    pub buffer_count: Option<usize>,
    pub params_set: Vec<(String, ParamValue)>,
}

struct ScriptState {
    spurious: usize,
    queue: VecDeque<GrabOutcome>,
    fail_wait_when_drained: bool,
}

pub(crate) struct ScriptedDevice {
    info: DeviceInfo,
    open: bool,
    grabbing: bool,
    params: std::collections::HashMap<String, super::sim::ParamEntry>,
    state: Mutex<ScriptState>,
    log: Arc<Mutex<DeviceLog>>,
}

impl ScriptedDevice {
    pub fn new(info: DeviceInfo, script: Script) -> Self {
        Self {
            info,
            open: false,
            grabbing: false,
            params: gige_param_table(),
            state: Mutex::new(ScriptState {
                spurious: script.spurious_wakes,
                queue: script.outcomes.into(),
                fail_wait_when_drained: script.fail_wait_when_drained,
            }),
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }

    pub fn log_handle(&self) -> Arc<Mutex<DeviceLog>> {
        Arc::clone(&self.log)
    }

    /// Override the reported writability of a parameter.
    pub fn set_param_writable(&mut self, name: &str, writable: bool) {
        if let Some(entry) = self.params.get_mut(name) {
            entry.writable = writable;
        }
    }
}

#[async_trait]
impl CameraDevice for ScriptedDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        self.log.lock().opens += 1;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().closes += 1;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn parameter(&self, name: &str) -> Result<ParamValue, DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        self.params
            .get(name)
            .map(|e| e.value.clone())
            .ok_or_else(|| DeviceError::UnknownParameter(name.to_string()))
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        let entry = self
            .params
            .get_mut(name)
            .ok_or_else(|| DeviceError::UnknownParameter(name.to_string()))?;
        if !entry.writable {
            return Err(DeviceError::ReadOnly(name.to_string()));
        }
        if let (ParamValue::Integer(_), ParamValue::Integer(v)) = (&entry.value, &value) {
            let (min, max) = entry.int_range.unwrap_or((i64::MIN, i64::MAX));
            if *v < min || *v > max {
                return Err(DeviceError::ParameterRejected {
                    name: name.to_string(),
                    value: value.to_string(),
                    details: format!("outside range [{}, {}]", min, max),
                });
            }
        }
        entry.value = value.clone();
        if name == "AcquisitionFrameRateAbs" {
            if let Some(resulting) = self.params.get_mut("ResultingFrameRateAbs") {
                resulting.value = value.clone();
            }
        }
        self.log.lock().params_set.push((name.to_string(), value));
        Ok(())
    }

    fn is_writable(&self, name: &str) -> bool {
        self.params.get(name).map(|e| e.writable).unwrap_or(false)
    }

    fn integer_range(&self, name: &str) -> Result<(i64, i64), DeviceError> {
        self.params
            .get(name)
            .ok_or_else(|| DeviceError::UnknownParameter(name.to_string()))?
            .int_range
            .ok_or_else(|| DeviceError::NoRange(name.to_string()))
    }

    fn float_range(&self, name: &str) -> Result<(f64, f64), DeviceError> {
        self.params
            .get(name)
            .ok_or_else(|| DeviceError::UnknownParameter(name.to_string()))?
            .float_range
            .ok_or_else(|| DeviceError::NoRange(name.to_string()))
    }

    fn start_grabbing(&mut self, buffer_count: usize) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        if self.grabbing {
            return Err(DeviceError::AlreadyGrabbing);
        }
        self.grabbing = true;
        let mut log = self.log.lock();
        log.grab_starts += 1;
        log.buffer_count = Some(buffer_count);
        Ok(())
    }

    fn stop_grabbing(&mut self) {
        if self.grabbing {
            self.grabbing = false;
            self.log.lock().grab_stops += 1;
        }
    }

    fn is_grabbing(&self) -> bool {
        self.grabbing
    }

    fn retrieve(&mut self) -> Option<GrabOutcome> {
        let mut state = self.state.lock();
        if state.spurious > 0 {
            state.spurious -= 1;
            return None;
        }
        state.queue.pop_front()
    }

    async fn wait_grab_ready(&self) -> Result<(), DeviceError> {
        let drained = {
            let state = self.state.lock();
            state.spurious == 0 && state.queue.is_empty()
        };
        if !drained {
            return Ok(());
        }
        if self.state.lock().fail_wait_when_drained {
            return Err(DeviceError::WaitObject(
                "scripted wait source destroyed".to_string(),
            ));
        }
        // Script exhausted: no further grab will ever be signalled, only
        // cancellation can end the wait.
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Backend over a fixed device list, optionally seeding one scripted device.
pub(crate) struct ScriptedBackend {
    devices: Vec<DeviceInfo>,
    seed: Mutex<Option<(Script, Arc<Mutex<DeviceLog>>)>>,
}

impl ScriptedBackend {
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            seed: Mutex::new(None),
        }
    }

    /// Backend announcing `device` and handing the given script to the first
    /// `connect` call. Returns the log handle for post-run assertions.
    pub fn with_script(device: DeviceInfo, script: Script) -> (Self, Arc<Mutex<DeviceLog>>) {
        let log = Arc::new(Mutex::new(DeviceLog::default()));
        let backend = Self {
            devices: vec![device],
            seed: Mutex::new(Some((script, Arc::clone(&log)))),
        };
        (backend, log)
    }
}

impl CameraBackend for ScriptedBackend {
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
        let device = match self.seed.lock().take() {
            Some((script, log)) => {
                // Share the pre-issued log handle
                ScriptedDevice {
                    log,
                    ..ScriptedDevice::new(info.clone(), script)
                }
            }
            None => ScriptedDevice::new(info.clone(), Script::default()),
        };
        Ok(Box::new(device))
    }
}

/// Device identity used across the test suite.
pub(crate) fn scripted_info(id: &str) -> DeviceInfo {
    DeviceInfo {
        id: id.to_string(),
        model: "scripted-cam".to_string(),
        full_name: format!("scripted://{}", id),
    }
}
