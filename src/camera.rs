//! Camera stream lifecycle and the overall AR session state.
//!
//! A [`CameraSession`] owns exactly one [`MediaStream`], the [`VideoSink`] showing it and the
//! orientation [`Subscription`] feeding the projector. All three are released together by
//! [`CameraSession::teardown`], which also runs when the session is dropped.

use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::CameraConfig;
use crate::error::{Capability, Error, Result};
use crate::orientation::{OrientationSample, OrientationTracker, PermissionState, Subscription};

/// Which camera to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FacingMode {
    /// The rear camera, facing away from the user.
    #[default]
    Environment,
    /// The front camera, facing the user.
    User,
}

/// The size of the element the camera feed is rendered into, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// What to ask the platform for when opening the camera.
///
/// The resolution is a hint; platforms pick the closest mode they support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl StreamConstraints {
    #[must_use]
    pub fn for_viewport(facing: FacingMode, viewport: Viewport) -> Self {
        Self {
            facing,
            ideal_width: viewport.width,
            ideal_height: viewport.height,
        }
    }
}

/// A single audio or video track of a [`MediaStream`].
pub trait MediaTrack {
    fn label(&self) -> &str;

    /// Stops the track and releases the underlying device.
    fn stop(&mut self) -> Result<()>;
}

/// An open camera stream.
pub struct MediaStream {
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Box<dyn MediaTrack>] {
        &self.tracks
    }

    /// Stops every track, including those after one that fails to stop. Failures are logged.
    ///
    /// Returns the number of tracks that failed to stop.
    pub fn stop_all(&mut self) -> usize {
        let mut failed = 0;
        for track in &mut self.tracks {
            if let Err(e) = track.stop() {
                warn!(track = track.label(), error = %e, "failed to stop media track");
                failed += 1;
            }
        }
        failed
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tracks.iter().map(|track| track.label()))
            .finish()
    }
}

/// The platform camera API.
#[async_trait(?Send)]
pub trait CameraDevice {
    fn is_supported(&self) -> bool;

    /// Opens a camera stream, prompting for permission if needed.
    ///
    /// Implementations report a refused prompt as [`Error::PermissionDenied`].
    async fn open(&self, constraints: StreamConstraints) -> Result<MediaStream>;
}

/// Whatever renders the camera feed behind the marker, eg. a video element.
pub trait VideoSink {
    fn attach(&mut self, stream: &MediaStream) -> Result<()>;
    fn detach(&mut self) -> Result<()>;
}

/// Which of the platform features used by the AR view are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capabilities {
    /// Native AR support, which stands in for all the others.
    pub webxr: bool,
    pub orientation: bool,
    pub camera: bool,
    pub geolocation: bool,
}

impl Capabilities {
    #[must_use]
    pub fn supports_ar(&self) -> bool {
        self.missing().is_none()
    }

    /// Returns the first capability the AR view is missing, if any.
    #[must_use]
    pub fn missing(&self) -> Option<Capability> {
        if self.webxr {
            return None;
        }
        [
            (self.camera, Capability::Camera),
            (self.orientation, Capability::Orientation),
            (self.geolocation, Capability::Geolocation),
        ]
        .into_iter()
        .find_map(|(present, capability)| (!present).then_some(capability))
    }
}

/// Lifecycle of a [`CameraSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArSessionState {
    #[default]
    Uninitialized,
    Requesting,
    Active,
    /// Initialization failed; only [`CameraSession::retry`] leaves this state.
    Error,
}

/// Ties the camera stream and the orientation subscription of one AR view together.
pub struct CameraSession {
    camera: Rc<dyn CameraDevice>,
    orientation: Rc<OrientationTracker>,
    capabilities: Capabilities,
    config: CameraConfig,
    state: ArSessionState,
    last_error: Option<Error>,
    stream: Option<MediaStream>,
    sink: Option<Box<dyn VideoSink>>,
    subscription: Option<Subscription>,
}

impl CameraSession {
    pub fn new(
        camera: Rc<dyn CameraDevice>,
        orientation: Rc<OrientationTracker>,
        capabilities: Capabilities,
        config: CameraConfig,
    ) -> Self {
        Self {
            camera,
            orientation,
            capabilities,
            config,
            state: ArSessionState::Uninitialized,
            last_error: None,
            stream: None,
            sink: None,
            subscription: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ArSessionState {
        self.state
    }

    /// The cause of the most recent failure, while the session is in the error state.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn orientation(&self) -> &OrientationTracker {
        &self.orientation
    }

    /// Whether orientation samples are currently being delivered to the session's callback.
    #[must_use]
    pub fn has_heading(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(Subscription::is_live)
    }

    /// Opens the camera, shows it in `sink` and starts forwarding orientation samples to
    /// `on_sample`.
    ///
    /// Orientation access is requested as part of this. If the user refuses it the session
    /// still becomes active, just without heading updates, until
    /// [`resume_heading`](Self::resume_heading) succeeds. Any other failure moves the session
    /// to [`ArSessionState::Error`] and releases whatever had already been acquired.
    pub async fn initialize(
        &mut self,
        viewport: Viewport,
        sink: Box<dyn VideoSink>,
        on_sample: impl FnMut(OrientationSample) + 'static,
    ) -> Result<()> {
        match self.state {
            ArSessionState::Uninitialized => {}
            ArSessionState::Requesting | ArSessionState::Active => {
                return Err(Error::SessionActive);
            }
            ArSessionState::Error => return Err(Error::SessionFailed),
        }

        self.transition(ArSessionState::Requesting);
        match self.start(viewport, sink, on_sample).await {
            Ok(()) => {
                self.transition(ArSessionState::Active);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to start AR session");
                self.release();
                self.last_error = Some(e.clone());
                self.transition(ArSessionState::Error);
                Err(e)
            }
        }
    }

    async fn start(
        &mut self,
        viewport: Viewport,
        mut sink: Box<dyn VideoSink>,
        on_sample: impl FnMut(OrientationSample) + 'static,
    ) -> Result<()> {
        if let Some(missing) = self.capabilities.missing() {
            return Err(Error::DeviceUnsupported(missing));
        }
        if !self.camera.is_supported() {
            return Err(Error::DeviceUnsupported(Capability::Camera));
        }

        let constraints = StreamConstraints::for_viewport(self.config.facing, viewport);
        debug!(?constraints, "opening camera");
        let stream = self.camera.open(constraints).await?;
        let stream = self.stream.insert(stream);
        sink.attach(stream)?;
        self.sink = Some(sink);

        match self.orientation.request_access().await? {
            PermissionState::Granted => {
                self.subscription = Some(self.orientation.subscribe(on_sample)?);
            }
            state => {
                warn!(?state, "orientation access not granted, continuing without heading");
            }
        }
        Ok(())
    }

    /// Asks for orientation access again on an active session that runs without heading
    /// updates, and starts forwarding samples to `on_sample` if it is granted.
    ///
    /// Returns the resulting permission state. Does nothing unless the session is active and
    /// currently without heading. A failure here leaves the session active.
    pub async fn resume_heading(
        &mut self,
        on_sample: impl FnMut(OrientationSample) + 'static,
    ) -> Result<PermissionState> {
        if self.state != ArSessionState::Active || self.has_heading() {
            return Ok(self.orientation.state());
        }

        let state = match self.orientation.state() {
            PermissionState::Denied => self.orientation.retry_access().await?,
            _ => self.orientation.request_access().await?,
        };
        if state == PermissionState::Granted {
            self.subscription = Some(self.orientation.subscribe(on_sample)?);
            info!("orientation access granted, heading updates resumed");
        }
        Ok(state)
    }

    /// Releases the camera stream and the orientation subscription.
    ///
    /// This never fails: every resource is released even if releasing another one failed, and
    /// failures are logged. An active session returns to [`ArSessionState::Uninitialized`]; a
    /// failed one stays failed until [`retry`](Self::retry).
    pub fn teardown(&mut self) {
        self.release();
        match self.state {
            ArSessionState::Requesting | ArSessionState::Active => {
                self.transition(ArSessionState::Uninitialized);
            }
            ArSessionState::Uninitialized | ArSessionState::Error => {}
        }
    }

    /// Leaves the error state so that [`initialize`](Self::initialize) may be called again.
    ///
    /// Does nothing in any other state.
    pub fn retry(&mut self) {
        if self.state == ArSessionState::Error {
            self.release();
            self.last_error = None;
            self.transition(ArSessionState::Uninitialized);
        }
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let failed = stream.stop_all();
            debug!(failed, "camera stream released");
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.detach() {
                warn!(error = %e, "failed to detach video sink");
            }
        }
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.unsubscribe() {
                warn!(error = %e, "failed to remove orientation subscription");
            }
        }
    }

    fn transition(&mut self, to: ArSessionState) {
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            info!(?from, ?to, "AR session state changed");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("stream", &self.stream)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
