//! Frame acquisition state machine.
//!
//! One session runs `Idle → Opened → Configured → Grabbing → Draining →
//! Stopped`. While grabbing, the loop blocks on a two-way multiplexed wait
//! (termination signal vs. grab-ready), retrieves with zero timeout,
//! converts the buffer to the configured output format, and hands it to the
//! publisher. Cancellation is cooperative, checked once per iteration.

use crate::config::CameraConfig;
use crate::configurator::Configurator;
use crate::convert::convert;
use crate::device::{
    find_device, CameraBackend, CameraDevice, DeviceError, DeviceInfo, GrabOutcome,
};
use crate::error::{GigecamError, Result};
use crate::frame::RawFrame;
use crate::publish::FramePublisher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle states of one acquisition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Opened,
    Configured,
    Grabbing,
    Draining,
    Stopped,
}

/// Outcome of one multiplexed wait while grabbing.
enum WaitOutcome {
    /// The termination signal fired
    Terminate,
    /// The device signalled a retrievable grab result
    GrabReady,
    /// The wait primitive itself failed, an internal-consistency violation
    Unexpected(DeviceError),
}

/// Per-session counters, shared with the lifecycle controller and tests.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    pub frames_published: AtomicU64,
    pub frames_discarded: AtomicU64,
    pub grab_failures: AtomicU64,
    pub failures_logged: AtomicU64,
    pub spurious_wakes: AtomicU64,
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct AcquisitionReport {
    pub frames_published: u64,
    pub grab_failures: u64,
    /// Frame rate the device reported it would achieve
    pub resulting_frame_rate: f64,
}

/// Drives one camera session from device lookup to orderly shutdown.
pub struct AcquisitionTask {
    config: CameraConfig,
    publisher: Arc<dyn FramePublisher>,
    cancel: CancellationToken,
    stats: Arc<AcquisitionStats>,
    state: AcquisitionState,
}

impl AcquisitionTask {
    pub fn new(
        config: CameraConfig,
        publisher: Arc<dyn FramePublisher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            publisher,
            cancel,
            stats: Arc::new(AcquisitionStats::default()),
            state: AcquisitionState::Idle,
        }
    }

    /// Shared handle to the session counters.
    pub fn stats(&self) -> Arc<AcquisitionStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Always leaves the device stopped and closed, whether the session ends
    /// by cancellation or by error.
    pub async fn run(mut self, backend: Arc<dyn CameraBackend>) -> Result<AcquisitionReport> {
        let info = find_device(backend.as_ref(), &self.config.id)?;
        let mut device = backend.connect(&info)?;

        device.open()?;
        self.set_state(AcquisitionState::Opened);
        log_device_details(device.info());

        let applied = match Configurator::new(&self.config).configure(device.as_mut()) {
            Ok(applied) => applied,
            Err(err) => {
                device.close();
                self.set_state(AcquisitionState::Stopped);
                return Err(err);
            }
        };
        self.set_state(AcquisitionState::Configured);

        if let Err(err) = device.start_grabbing(self.config.buffer_count) {
            device.close();
            self.set_state(AcquisitionState::Stopped);
            return Err(err.into());
        }
        self.set_state(AcquisitionState::Grabbing);
        info!(
            "Acquisition started on channel '{}' ({} grab buffers)",
            self.publisher.channel(),
            self.config.buffer_count
        );

        let loop_result = self.grab_loop(device.as_mut()).await;

        self.set_state(AcquisitionState::Draining);
        device.stop_grabbing();
        device.close();
        self.set_state(AcquisitionState::Stopped);

        let report = AcquisitionReport {
            frames_published: self.stats.frames_published.load(Ordering::Relaxed),
            grab_failures: self.stats.grab_failures.load(Ordering::Relaxed),
            resulting_frame_rate: applied.resulting_frame_rate,
        };
        info!(
            "Acquisition stopped: {} frames published, {} grab failures",
            report.frames_published, report.grab_failures
        );

        loop_result.map(|_| report)
    }

    /// The grabbing loop proper. Returns `Ok` on a requested termination,
    /// `Err` only on an internal-consistency violation.
    async fn grab_loop(&mut self, device: &mut dyn CameraDevice) -> Result<()> {
        let mut failure_logged = false;

        loop {
            match Self::wait_next(&self.cancel, &*device).await {
                WaitOutcome::Terminate => {
                    info!("Termination requested, draining acquisition");
                    return Ok(());
                }
                WaitOutcome::Unexpected(err) => {
                    error!(
                        "Unexpected wait result, exiting acquisition loop: {}",
                        err
                    );
                    return Err(GigecamError::UnexpectedWaitResult {
                        details: err.to_string(),
                    });
                }
                WaitOutcome::GrabReady => {
                    // Zero-timeout retrieval; an empty queue despite the
                    // signal is a tolerated spurious wake.
                    let Some(outcome) = device.retrieve() else {
                        self.stats.spurious_wakes.fetch_add(1, Ordering::Relaxed);
                        continue;
                    };

                    match outcome {
                        GrabOutcome::Frame(frame) => self.handle_frame(frame),
                        GrabOutcome::Failed(grab_error) => {
                            self.stats.grab_failures.fetch_add(1, Ordering::Relaxed);
                            if !failure_logged {
                                error!(
                                    "Frame grab failed: {}. Further failures will be suppressed",
                                    grab_error
                                );
                                failure_logged = true;
                                self.stats.failures_logged.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Block until either event source is ready. Termination takes
    /// precedence when both are.
    async fn wait_next(cancel: &CancellationToken, device: &dyn CameraDevice) -> WaitOutcome {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => WaitOutcome::Terminate,
            ready = device.wait_grab_ready() => match ready {
                Ok(()) => WaitOutcome::GrabReady,
                Err(err) => WaitOutcome::Unexpected(err),
            },
        }
    }

    /// Convert and publish one frame; the raw buffer is released when this
    /// returns.
    fn handle_frame(&self, frame: RawFrame) {
        match convert(&frame, self.config.output_format) {
            Ok(image) => {
                trace!(
                    sequence = image.sequence,
                    width = image.width,
                    height = image.height,
                    "Publishing converted frame"
                );
                self.publisher.publish(image);
                self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!("Discarding frame {}: {}", frame.sequence, err);
                self.stats.frames_discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn set_state(&mut self, next: AcquisitionState) {
        debug!(from = ?self.state, to = ?next, "Acquisition state transition");
        self.state = next;
    }
}

fn log_device_details(info: &DeviceInfo) {
    info!("FullName: {}", info.full_name);
    info!("ModelName: {}", info.model);
    info!("SerialNumber: {}", info.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GigecamConfig, OutputFormat};
    use crate::device::scripted::{scripted_info, Script, ScriptedBackend};
    use crate::device::GrabError;
    use crate::frame::{ImageFormat, SensorFormat};
    use crate::publish::OutputChannel;
    use std::time::SystemTime;
    use tokio::time::{timeout, Duration};

    const SERIAL: &str = "21441234";

    fn camera_config(output_format: OutputFormat) -> CameraConfig {
        let mut config = GigecamConfig::default().camera;
        config.id = SERIAL.to_string();
        config.output_format = output_format;
        config
    }

    fn mono_frame(sequence: u64, payload: Vec<u8>) -> GrabOutcome {
        GrabOutcome::Frame(RawFrame::new(
            sequence,
            SystemTime::now(),
            8,
            8,
            SensorFormat::Mono8,
            payload,
        ))
    }

    fn bayer_frame(sequence: u64) -> GrabOutcome {
        GrabOutcome::Frame(RawFrame::new(
            sequence,
            SystemTime::now(),
            8,
            8,
            SensorFormat::BayerBG8,
            vec![128u8; 64],
        ))
    }

    fn failed_grab() -> GrabOutcome {
        GrabOutcome::Failed(GrabError {
            code: 0xE100_0014,
            description: "The buffer was incompletely grabbed".to_string(),
        })
    }

    struct Session {
        channel: Arc<OutputChannel>,
        receiver: tokio::sync::broadcast::Receiver<crate::publish::ImageMessage>,
        cancel: CancellationToken,
        stats: Arc<AcquisitionStats>,
        handle: tokio::task::JoinHandle<Result<AcquisitionReport>>,
        log: Arc<parking_lot::Mutex<crate::device::scripted::DeviceLog>>,
    }

    fn spawn_session(config: CameraConfig, script: Script) -> Session {
        let (backend, log) = ScriptedBackend::with_script(scripted_info(SERIAL), script);
        let channel = Arc::new(OutputChannel::new("gigecam-image", 64));
        let receiver = channel.subscribe();
        let cancel = CancellationToken::new();
        let task = AcquisitionTask::new(config, channel.clone(), cancel.clone());
        let stats = task.stats();
        let handle = tokio::spawn(task.run(Arc::new(backend)));
        Session {
            channel,
            receiver,
            cancel,
            stats,
            handle,
            log,
        }
    }

    async fn recv_image(session: &mut Session) -> crate::publish::ImageMessage {
        timeout(Duration::from_secs(2), session.receiver.recv())
            .await
            .expect("timed out waiting for a published image")
            .expect("channel closed")
    }

    #[test]
    fn test_new_task_starts_idle() {
        let channel = Arc::new(OutputChannel::new("gigecam-image", 4));
        let task = AcquisitionTask::new(
            camera_config(OutputFormat::GrayU8),
            channel,
            CancellationToken::new(),
        );
        assert_eq!(task.state(), AcquisitionState::Idle);
    }

    #[tokio::test]
    async fn test_gray_frames_pass_through_byte_identical() {
        let payload: Vec<u8> = (0..64u8).collect();
        let script = Script {
            outcomes: vec![
                mono_frame(0, payload.clone()),
                mono_frame(1, payload.clone()),
                mono_frame(2, payload.clone()),
            ],
            ..Script::default()
        };
        let mut session = spawn_session(camera_config(OutputFormat::GrayU8), script);

        for expected_sequence in 0..3u64 {
            let message = recv_image(&mut session).await;
            assert_eq!(message.image.sequence, expected_sequence);
            assert_eq!(message.image.format, ImageFormat::Gray8);
            assert_eq!(*message.image.data, payload);
        }

        session.cancel.cancel();
        let report = session.handle.await.unwrap().unwrap();
        assert_eq!(report.frames_published, 3);
        assert_eq!(report.grab_failures, 0);
    }

    #[tokio::test]
    async fn test_bayer_frame_publishes_three_channel_rgb() {
        let config = camera_config(OutputFormat::RgbU8);
        let script = Script {
            outcomes: vec![bayer_frame(0)],
            ..Script::default()
        };
        let mut session = spawn_session(config, script);

        let message = recv_image(&mut session).await;
        assert_eq!(message.image.format, ImageFormat::Rgb8);
        assert_eq!(message.image.data.len(), 8 * 8 * 3);

        session.cancel.cancel();
        session.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failures_between_successes_log_once_and_preserve_order() {
        // k = 2 successes, m = 4 failures, j = 3 successes
        let mut outcomes = vec![
            mono_frame(0, vec![0u8; 64]),
            mono_frame(1, vec![1u8; 64]),
        ];
        outcomes.extend((0..4).map(|_| failed_grab()));
        outcomes.extend((2..5).map(|s| mono_frame(s, vec![s as u8; 64])));
        let script = Script {
            outcomes,
            ..Script::default()
        };
        let mut session = spawn_session(camera_config(OutputFormat::GrayU8), script);

        for expected_sequence in [0u64, 1, 2, 3, 4] {
            let message = recv_image(&mut session).await;
            assert_eq!(message.image.sequence, expected_sequence);
        }

        session.cancel.cancel();
        let report = session.handle.await.unwrap().unwrap();
        assert_eq!(report.frames_published, 5);
        assert_eq!(report.grab_failures, 4);
        assert_eq!(session.stats.failures_logged.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_spurious_wakes_are_tolerated() {
        let script = Script {
            outcomes: vec![mono_frame(0, vec![7u8; 64])],
            spurious_wakes: 2,
            ..Script::default()
        };
        let mut session = spawn_session(camera_config(OutputFormat::GrayU8), script);

        let message = recv_image(&mut session).await;
        assert_eq!(message.image.sequence, 0);

        session.cancel.cancel();
        session.handle.await.unwrap().unwrap();
        assert_eq!(session.stats.spurious_wakes.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_repeated_cancellation_drains_exactly_once() {
        let script = Script::default();
        let session = spawn_session(camera_config(OutputFormat::GrayU8), script);

        session.cancel.cancel();
        session.cancel.cancel();
        session.cancel.cancel();

        session.handle.await.unwrap().unwrap();
        let log = session.log.lock();
        assert_eq!(log.opens, 1);
        assert_eq!(log.grab_starts, 1);
        assert_eq!(log.grab_stops, 1);
        assert_eq!(log.closes, 1);
        assert_eq!(log.buffer_count, Some(50));
        assert_eq!(session.channel.published_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_failure_exits_defensively() {
        let script = Script {
            outcomes: vec![mono_frame(0, vec![0u8; 64])],
            fail_wait_when_drained: true,
            ..Script::default()
        };
        let mut session = spawn_session(camera_config(OutputFormat::GrayU8), script);

        recv_image(&mut session).await;

        let err = session.handle.await.unwrap().unwrap_err();
        assert!(matches!(err, GigecamError::UnexpectedWaitResult { .. }));

        // The device is still drained and closed on the defensive exit
        let log = session.log.lock();
        assert_eq!(log.grab_stops, 1);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_zero_devices_end_session_without_publishing() {
        let backend = ScriptedBackend::with_devices(vec![]);
        let channel = Arc::new(OutputChannel::new("gigecam-image", 16));
        let cancel = CancellationToken::new();
        let task = AcquisitionTask::new(
            camera_config(OutputFormat::GrayU8),
            channel.clone(),
            cancel,
        );

        let err = task.run(Arc::new(backend)).await.unwrap_err();
        assert!(matches!(err, GigecamError::DeviceNotFound { .. }));
        assert_eq!(channel.published_count(), 0);
    }

    #[tokio::test]
    async fn test_configuration_failure_closes_device_without_grabbing() {
        let mut config = camera_config(OutputFormat::GrayU8);
        config.width = 4096; // outside the device range
        let (backend, log) =
            ScriptedBackend::with_script(scripted_info(SERIAL), Script::default());
        let channel = Arc::new(OutputChannel::new("gigecam-image", 16));
        let task = AcquisitionTask::new(config, channel.clone(), CancellationToken::new());

        let err = task.run(Arc::new(backend)).await.unwrap_err();
        assert!(matches!(err, GigecamError::ConfigurationFailed { .. }));

        let log = log.lock();
        assert_eq!(log.grab_starts, 0);
        assert_eq!(log.closes, 1);
        assert_eq!(channel.published_count(), 0);
    }
}
