//! In-memory stand-ins for the platform collaborators, for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;

use crate::camera::{CameraDevice, MediaStream, MediaTrack, StreamConstraints, VideoSink};
use crate::config::PositionOptions;
use crate::error::{DeviceError, Error, Result};
use crate::orientation::{ListenerId, OrientationEvent, OrientationSensor, PermissionResponse};
use crate::position::{PositionCallback, PositionFailure, PositionFix, PositionProvider, WatchId};
use crate::target::{ShareCode, SharedTarget, TargetSource};

type OrientationListener = Box<dyn FnMut(&OrientationEvent)>;

pub(crate) struct FakeSensor {
    supported: bool,
    gate: Cell<Option<PermissionResponse>>,
    request_failure: RefCell<Option<String>>,
    fail_removals: Cell<bool>,
    requests: Cell<usize>,
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, OrientationListener)>>,
}

impl FakeSensor {
    fn new(supported: bool, gate: Option<PermissionResponse>) -> Self {
        Self {
            supported,
            gate: Cell::new(gate),
            request_failure: RefCell::new(None),
            fail_removals: Cell::new(false),
            requests: Cell::new(0),
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn ungated() -> Self {
        Self::new(true, None)
    }

    pub(crate) fn gated(response: PermissionResponse) -> Self {
        Self::new(true, Some(response))
    }

    pub(crate) fn unsupported() -> Self {
        Self::new(false, None)
    }

    pub(crate) fn set_response(&self, response: PermissionResponse) {
        self.gate.set(Some(response));
    }

    pub(crate) fn fail_next_request(&self, message: &str) {
        *self.request_failure.borrow_mut() = Some(message.to_owned());
    }

    pub(crate) fn fail_removals(&self) {
        self.fail_removals.set(true);
    }

    pub(crate) fn permission_requests(&self) -> usize {
        self.requests.get()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Delivers `event` to every registered listener.
    ///
    /// Listeners must not call back into the sensor.
    pub(crate) fn emit(&self, event: OrientationEvent) {
        for (_, listener) in self.listeners.borrow_mut().iter_mut() {
            listener(&event);
        }
    }
}

#[async_trait(?Send)]
impl OrientationSensor for FakeSensor {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn requires_permission(&self) -> bool {
        self.gate.get().is_some()
    }

    async fn request_permission(&self) -> Result<PermissionResponse> {
        self.requests.set(self.requests.get() + 1);
        if let Some(message) = self.request_failure.borrow_mut().take() {
            return Err(DeviceError::new(message).into());
        }
        Ok(self.gate.get().unwrap_or(PermissionResponse::Granted))
    }

    fn add_listener(&self, listener: Box<dyn FnMut(&OrientationEvent)>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> Result<()> {
        if self.fail_removals.get() {
            return Err(DeviceError::new("listener removal failed").into());
        }
        self.listeners.borrow_mut().retain(|(other, _)| *other != id);
        Ok(())
    }
}

struct FakeTrack {
    label: String,
    fail: bool,
    stopped: Rc<Cell<usize>>,
}

impl MediaTrack for FakeTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) -> Result<()> {
        if self.fail {
            return Err(DeviceError::new("track is wedged").into());
        }
        self.stopped.set(self.stopped.get() + 1);
        Ok(())
    }
}

pub(crate) struct FakeCamera {
    supported: bool,
    tracks: usize,
    failing_track: Cell<Option<usize>>,
    open_failure: RefCell<Option<Error>>,
    opened: Cell<usize>,
    stopped: Rc<Cell<usize>>,
    last_constraints: Cell<Option<StreamConstraints>>,
}

impl FakeCamera {
    pub(crate) fn with_tracks(tracks: usize) -> Self {
        Self {
            supported: true,
            tracks,
            failing_track: Cell::new(None),
            open_failure: RefCell::new(None),
            opened: Cell::new(0),
            stopped: Rc::new(Cell::new(0)),
            last_constraints: Cell::new(None),
        }
    }

    pub(crate) fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::with_tracks(1)
        }
    }

    pub(crate) fn fail_next_open(&self, error: Error) {
        *self.open_failure.borrow_mut() = Some(error);
    }

    pub(crate) fn fail_stopping_track(&self, index: usize) {
        self.failing_track.set(Some(index));
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opened.get()
    }

    pub(crate) fn stopped_tracks(&self) -> usize {
        self.stopped.get()
    }

    pub(crate) fn last_constraints(&self) -> Option<StreamConstraints> {
        self.last_constraints.get()
    }
}

#[async_trait(?Send)]
impl CameraDevice for FakeCamera {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn open(&self, constraints: StreamConstraints) -> Result<MediaStream> {
        self.last_constraints.set(Some(constraints));
        if let Some(error) = self.open_failure.borrow_mut().take() {
            return Err(error);
        }
        self.opened.set(self.opened.get() + 1);
        let tracks = (0..self.tracks)
            .map(|i| {
                Box::new(FakeTrack {
                    label: format!("camera track {i}"),
                    fail: self.failing_track.get() == Some(i),
                    stopped: Rc::clone(&self.stopped),
                }) as Box<dyn MediaTrack>
            })
            .collect();
        Ok(MediaStream::new(tracks))
    }
}

#[derive(Default)]
struct SinkState {
    attached: Cell<bool>,
    fail_attach: Cell<bool>,
    fail_detach: Cell<bool>,
}

/// A video sink whose clones all share the same state.
#[derive(Clone, Default)]
pub(crate) struct FakeSink {
    state: Rc<SinkState>,
}

impl FakeSink {
    pub(crate) fn is_attached(&self) -> bool {
        self.state.attached.get()
    }

    pub(crate) fn fail_attach(&self) {
        self.state.fail_attach.set(true);
    }

    pub(crate) fn fail_detach(&self) {
        self.state.fail_detach.set(true);
    }
}

impl VideoSink for FakeSink {
    fn attach(&mut self, stream: &MediaStream) -> Result<()> {
        if self.state.fail_attach.get() {
            return Err(DeviceError::new("video element is gone").into());
        }
        assert!(!stream.tracks().is_empty(), "attached an empty stream");
        self.state.attached.set(true);
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        if self.state.fail_detach.get() {
            return Err(DeviceError::new("video element is gone").into());
        }
        self.state.attached.set(false);
        Ok(())
    }
}

type WatchCallbacks = Vec<(WatchId, PositionCallback)>;

#[derive(Default)]
pub(crate) struct FakePositionProvider {
    unsupported: bool,
    response: RefCell<Option<std::result::Result<PositionFix, PositionFailure>>>,
    last_options: Cell<Option<PositionOptions>>,
    next_id: Cell<u64>,
    watches: RefCell<WatchCallbacks>,
    cleared: RefCell<Vec<WatchId>>,
}

impl FakePositionProvider {
    pub(crate) fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::default()
        }
    }

    pub(crate) fn respond_with(&self, response: std::result::Result<PositionFix, PositionFailure>) {
        *self.response.borrow_mut() = Some(response);
    }

    /// Delivers `update` to every live watch.
    pub(crate) fn push(&self, update: std::result::Result<PositionFix, PositionFailure>) {
        for (_, callback) in self.watches.borrow_mut().iter_mut() {
            callback(update);
        }
    }

    pub(crate) fn last_options(&self) -> Option<PositionOptions> {
        self.last_options.get()
    }

    pub(crate) fn cleared(&self) -> Vec<WatchId> {
        self.cleared.borrow().clone()
    }
}

#[async_trait(?Send)]
impl PositionProvider for FakePositionProvider {
    fn is_supported(&self) -> bool {
        !self.unsupported
    }

    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<PositionFix, PositionFailure> {
        self.last_options.set(Some(options));
        self.response
            .borrow()
            .unwrap_or(Err(PositionFailure::PositionUnavailable))
    }

    fn watch_position(&self, options: PositionOptions, callback: PositionCallback) -> WatchId {
        self.last_options.set(Some(options));
        let id = WatchId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.watches.borrow_mut().push((id, callback));
        id
    }

    fn clear_watch(&self, id: WatchId) {
        self.watches.borrow_mut().retain(|(other, _)| *other != id);
        self.cleared.borrow_mut().push(id);
    }
}

#[derive(Default)]
pub(crate) struct FakeTargetSource {
    targets: HashMap<ShareCode, SharedTarget>,
}

impl FakeTargetSource {
    pub(crate) fn with(mut self, target: SharedTarget) -> Self {
        self.targets.insert(target.code.clone(), target);
        self
    }
}

#[async_trait(?Send)]
impl TargetSource for FakeTargetSource {
    async fn fetch(&self, code: &ShareCode) -> Result<Option<SharedTarget>> {
        Ok(self.targets.get(code).cloned())
    }
}
