use super::types::ShutdownReason;
use crate::acquisition::{AcquisitionReport, AcquisitionStats, AcquisitionTask};
use crate::config::GigecamConfig;
use crate::device::sim::SimBackend;
use crate::device::CameraBackend;
use crate::error::{GigecamError, Result};
use crate::publish::OutputChannel;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Lifecycle controller owning the termination signal, the acquisition
/// task, and the output channel.
pub struct GigecamOrchestrator {
    pub(super) config: GigecamConfig,
    pub(super) output: Arc<OutputChannel>,
    pub(super) backend: Arc<dyn CameraBackend>,
    pub(super) stats: Option<Arc<AcquisitionStats>>,

    // Lifecycle management
    pub(super) acquisition: Option<JoinHandle<Result<AcquisitionReport>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl GigecamOrchestrator {
    /// Create an orchestrator over the default transport.
    ///
    /// Without vendor hardware attached this node runs against the
    /// simulated backend, which announces one camera carrying the
    /// configured id.
    pub fn new(config: GigecamConfig) -> Self {
        info!("Using simulated camera backend");
        let backend = Arc::new(SimBackend::with_serial(&config.camera.id));
        Self::with_backend(config, backend)
    }

    /// Create an orchestrator over a specific device backend.
    pub fn with_backend(config: GigecamConfig, backend: Arc<dyn CameraBackend>) -> Self {
        let output = Arc::new(OutputChannel::new(
            &config.output.channel,
            config.output.capacity,
        ));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            output,
            backend,
            stats: None,
            acquisition: None,
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// The node's output channel, for downstream subscription.
    pub fn output(&self) -> Arc<OutputChannel> {
        Arc::clone(&self.output)
    }

    /// Counters of the running session, available after `start`.
    pub fn stats(&self) -> Option<Arc<AcquisitionStats>> {
        self.stats.as_ref().map(Arc::clone)
    }

    /// Spawn the acquisition task.
    pub fn start(&mut self) -> Result<()> {
        if self.acquisition.is_some() {
            return Err(GigecamError::system("Acquisition task already started"));
        }

        info!(
            "Starting acquisition for camera '{}' on channel '{}'",
            self.config.camera.id, self.config.output.channel
        );

        let task = AcquisitionTask::new(
            self.config.camera.clone(),
            self.output(),
            self.cancellation_token.clone(),
        );
        self.stats = Some(task.stats());

        let backend = Arc::clone(&self.backend);
        self.acquisition = Some(tokio::spawn(task.run(backend)));

        Ok(())
    }
}
