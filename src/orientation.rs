//! Compass heading from the device-orientation sensor.
//!
//! Access goes through a small state machine:
//!
//! ```text
//! Unrequested ──request_access──▶ Requested ──▶ Granted
//!      │                              │
//!      │ (no gate)                    └───────▶ Denied ──retry_access──▶ Requested
//!      └──────────────▶ Granted
//! ```
//!
//! Permission is settled exactly once, up front. Only a [`Granted`](PermissionState::Granted)
//! tracker hands out [`Subscription`]s, so event handlers never need to look at permissions.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::OrientationConfig;
use crate::error::{Capability, Error, Result};
use crate::geodesy::Bearing;
use crate::util::degrees;

/// Where the tracker is in acquiring sensor access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PermissionState {
    #[default]
    Unrequested,
    Requested,
    Granted,
    Denied,
}

/// The user's answer to a sensor permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionResponse {
    Granted,
    Denied,
}

/// A raw device-orientation reading as delivered by the platform.
///
/// `alpha` is the rotation about the vertical axis in degrees, which approximates the compass
/// heading. Platforms report `None` while the sensor is still settling.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationEvent {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    /// Whether `alpha` is referenced to magnetic north rather than an arbitrary start heading.
    pub absolute: bool,
    pub timestamp_ms: u64,
}

/// The most recent compass reading known to an [`OrientationTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrientationSample {
    /// The compass heading, or `None` if the sensor has not reported one yet.
    pub heading: Option<Bearing>,
    pub timestamp_ms: u64,
    pub is_absolute: bool,
}

/// Identifies a listener registered with an [`OrientationSensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The platform's device-orientation API.
#[async_trait(?Send)]
pub trait OrientationSensor {
    /// Whether the platform delivers orientation events at all.
    fn is_supported(&self) -> bool;

    /// Whether the platform gates orientation events behind an explicit permission prompt.
    fn requires_permission(&self) -> bool;

    /// Shows the permission prompt and waits for the user's answer.
    async fn request_permission(&self) -> Result<PermissionResponse>;

    fn add_listener(&self, listener: Box<dyn FnMut(&OrientationEvent)>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> Result<()>;
}

/// Acquires access to an [`OrientationSensor`] and turns its events into
/// [`OrientationSample`]s.
pub struct OrientationTracker {
    sensor: Rc<dyn OrientationSensor>,
    config: OrientationConfig,
    state: Cell<PermissionState>,
    latest: Rc<Cell<Option<OrientationSample>>>,
}

impl OrientationTracker {
    pub fn new(sensor: Rc<dyn OrientationSensor>, config: OrientationConfig) -> Self {
        Self {
            sensor,
            config,
            state: Cell::new(PermissionState::Unrequested),
            latest: Rc::new(Cell::new(None)),
        }
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.sensor.is_supported()
    }

    #[must_use]
    pub fn state(&self) -> PermissionState {
        self.state.get()
    }

    /// Returns the most recent sample received since the latest call to
    /// [`subscribe`](Self::subscribe).
    #[must_use]
    pub fn latest(&self) -> Option<OrientationSample> {
        self.latest.get()
    }

    /// Acquires access to the sensor, prompting the user if the platform requires it.
    ///
    /// At most one prompt is ever shown: once the state has left
    /// [`Unrequested`](PermissionState::Unrequested) this returns the current state without
    /// touching the sensor. A denial is sticky until [`retry_access`](Self::retry_access).
    ///
    /// If the platform has no orientation support at all, the tracker moves to
    /// [`Denied`](PermissionState::Denied) and this returns [`Error::DeviceUnsupported`].
    pub async fn request_access(&self) -> Result<PermissionState> {
        match self.state.get() {
            PermissionState::Unrequested => self.acquire().await,
            settled_or_pending => Ok(settled_or_pending),
        }
    }

    /// Asks again after the user previously denied access.
    ///
    /// Does nothing unless the tracker is currently [`Denied`](PermissionState::Denied).
    pub async fn retry_access(&self) -> Result<PermissionState> {
        match self.state.get() {
            PermissionState::Denied => self.acquire().await,
            other => Ok(other),
        }
    }

    async fn acquire(&self) -> Result<PermissionState> {
        if !self.sensor.is_supported() {
            self.transition(PermissionState::Denied);
            return Err(Error::DeviceUnsupported(Capability::Orientation));
        }

        if !self.sensor.requires_permission() {
            self.transition(PermissionState::Granted);
            return Ok(PermissionState::Granted);
        }

        self.transition(PermissionState::Requested);
        let next = match self.sensor.request_permission().await {
            Ok(PermissionResponse::Granted) => PermissionState::Granted,
            Ok(PermissionResponse::Denied) => PermissionState::Denied,
            Err(e) => {
                warn!(error = %e, "orientation permission request failed");
                self.transition(PermissionState::Denied);
                return Err(e);
            }
        };
        self.transition(next);
        Ok(next)
    }

    fn transition(&self, to: PermissionState) {
        let from = self.state.replace(to);
        if from != to {
            debug!(?from, ?to, "orientation permission changed");
        }
    }

    /// Starts forwarding orientation samples to `callback`.
    ///
    /// Every event produces a sample. Events without a heading reuse the last heading seen by
    /// this subscription; nothing is smoothed or filtered. Subscribing forgets samples from
    /// earlier subscriptions, which also restarts the [liveness](Self::check_liveness) check.
    ///
    /// The subscription stays live until the returned [`Subscription`] is unsubscribed or
    /// dropped.
    pub fn subscribe(
        &self,
        mut callback: impl FnMut(OrientationSample) + 'static,
    ) -> Result<Subscription> {
        match self.state.get() {
            PermissionState::Granted => {}
            PermissionState::Denied => {
                return Err(Error::PermissionDenied(Capability::Orientation));
            }
            PermissionState::Unrequested | PermissionState::Requested => {
                return Err(Error::PermissionRequired(Capability::Orientation));
            }
        }

        self.latest.set(None);
        let live = Rc::new(Cell::new(true));
        let listener_live = Rc::clone(&live);
        let latest = Rc::clone(&self.latest);
        let mut previous: Option<Bearing> = None;
        let id = self.sensor.add_listener(Box::new(move |event: &OrientationEvent| {
            if !listener_live.get() {
                return;
            }
            let heading = event
                .alpha
                .filter(|alpha| alpha.is_finite())
                .map(|alpha| Bearing::new(degrees(alpha)))
                .or(previous);
            previous = heading;
            let sample = OrientationSample {
                heading,
                timestamp_ms: event.timestamp_ms,
                is_absolute: event.absolute,
            };
            latest.set(Some(sample));
            callback(sample);
        }));
        debug!(listener = %id, "subscribed to orientation events");

        Ok(Subscription {
            sensor: Rc::clone(&self.sensor),
            id,
            live,
        })
    }

    /// Reports [`Error::SensorUnavailable`] if no event has arrived even though `elapsed` (time
    /// since subscribing) exceeds the configured sensor timeout.
    pub fn check_liveness(&self, elapsed: Duration) -> Result<()> {
        if self.latest.get().is_none() && elapsed >= self.config.sensor_timeout() {
            return Err(Error::SensorUnavailable { waited: elapsed });
        }
        Ok(())
    }
}

impl fmt::Debug for OrientationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrientationTracker")
            .field("state", &self.state.get())
            .field("latest", &self.latest.get())
            .finish_non_exhaustive()
    }
}

/// A live registration with the orientation sensor.
///
/// Dropping the subscription removes the listener. Once removed, no further samples are
/// delivered, even if the platform failed to drop the listener on its side.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    sensor: Rc<dyn OrientationSensor>,
    id: ListenerId,
    live: Rc<Cell<bool>>,
}

impl Subscription {
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.get()
    }

    /// Removes the listener, reporting any failure from the platform.
    pub fn unsubscribe(mut self) -> Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> Result<()> {
        if !self.live.replace(false) {
            return Ok(());
        }
        debug!(listener = %self.id, "unsubscribing from orientation events");
        self.sensor.remove_listener(self.id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!(listener = %self.id, error = %e, "failed to remove orientation listener");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("live", &self.live.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{OrientationEvent, OrientationTracker, PermissionResponse, PermissionState};
    use crate::config::OrientationConfig;
    use crate::error::{Capability, Error};
    use crate::geodesy::Bearing;
    use crate::testing::FakeSensor;
    use approx::assert_relative_eq;
    use futures::executor::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn event(alpha: Option<f64>, timestamp_ms: u64) -> OrientationEvent {
        OrientationEvent {
            alpha,
            beta: Some(80.),
            gamma: Some(0.),
            absolute: true,
            timestamp_ms,
        }
    }

    fn tracker(sensor: &Rc<FakeSensor>) -> OrientationTracker {
        OrientationTracker::new(sensor.clone(), OrientationConfig::default())
    }

    #[test]
    fn ungated_platform_is_granted_without_prompt() {
        let sensor = Rc::new(FakeSensor::ungated());
        let tracker = tracker(&sensor);
        assert_eq!(tracker.state(), PermissionState::Unrequested);

        assert_eq!(block_on(tracker.request_access()), Ok(PermissionState::Granted));
        assert_eq!(tracker.state(), PermissionState::Granted);
        assert_eq!(sensor.permission_requests(), 0);
    }

    #[test]
    fn gated_platform_prompts_exactly_once() {
        let sensor = Rc::new(FakeSensor::gated(PermissionResponse::Granted));
        let tracker = tracker(&sensor);

        assert_eq!(block_on(tracker.request_access()), Ok(PermissionState::Granted));
        assert_eq!(block_on(tracker.request_access()), Ok(PermissionState::Granted));
        assert_eq!(sensor.permission_requests(), 1);
    }

    #[test]
    fn denial_is_sticky_until_retried() {
        let sensor = Rc::new(FakeSensor::gated(PermissionResponse::Denied));
        let tracker = tracker(&sensor);

        assert_eq!(block_on(tracker.request_access()), Ok(PermissionState::Denied));
        assert_eq!(block_on(tracker.request_access()), Ok(PermissionState::Denied));
        assert_eq!(sensor.permission_requests(), 1);

        sensor.set_response(PermissionResponse::Granted);
        assert_eq!(block_on(tracker.retry_access()), Ok(PermissionState::Granted));
        assert_eq!(sensor.permission_requests(), 2);

        // retrying when not denied is a no-op
        assert_eq!(block_on(tracker.retry_access()), Ok(PermissionState::Granted));
        assert_eq!(sensor.permission_requests(), 2);
    }

    #[test]
    fn unsupported_platform_is_denied_with_error() {
        let sensor = Rc::new(FakeSensor::unsupported());
        let tracker = tracker(&sensor);

        assert!(!tracker.is_supported());
        assert_eq!(
            block_on(tracker.request_access()),
            Err(Error::DeviceUnsupported(Capability::Orientation))
        );
        assert_eq!(tracker.state(), PermissionState::Denied);
    }

    #[test]
    fn failed_prompt_is_denied_with_error() {
        let sensor = Rc::new(FakeSensor::gated(PermissionResponse::Granted));
        sensor.fail_next_request("prompt dismissed by the system");
        let tracker = tracker(&sensor);

        assert!(matches!(
            block_on(tracker.request_access()),
            Err(Error::Device(_))
        ));
        assert_eq!(tracker.state(), PermissionState::Denied);
    }

    #[test]
    fn subscribing_requires_a_grant() {
        let sensor = Rc::new(FakeSensor::gated(PermissionResponse::Denied));
        let tracker = tracker(&sensor);

        assert_eq!(
            tracker.subscribe(|_| {}).unwrap_err(),
            Error::PermissionRequired(Capability::Orientation)
        );
        block_on(tracker.request_access()).unwrap();
        assert_eq!(
            tracker.subscribe(|_| {}).unwrap_err(),
            Error::PermissionDenied(Capability::Orientation)
        );
        assert_eq!(sensor.listener_count(), 0);
    }

    #[test]
    fn samples_keep_the_last_heading_when_alpha_is_missing() {
        let sensor = Rc::new(FakeSensor::ungated());
        let tracker = tracker(&sensor);
        block_on(tracker.request_access()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _subscription = tracker
            .subscribe(move |sample| sink.borrow_mut().push(sample))
            .unwrap();

        sensor.emit(event(None, 1));
        sensor.emit(event(Some(90.), 2));
        sensor.emit(event(None, 3));
        sensor.emit(event(Some(-10.), 4));

        let headings: Vec<_> = seen
            .borrow()
            .iter()
            .map(|s| s.heading.map(|h| h.degrees()))
            .collect();
        assert_eq!(headings.len(), 4);
        assert_eq!(headings[0], None);
        assert_relative_eq!(headings[1].unwrap(), 90., epsilon = 1e-9);
        assert_relative_eq!(headings[2].unwrap(), 90., epsilon = 1e-9);
        assert_relative_eq!(headings[3].unwrap(), 350., epsilon = 1e-9);

        let latest = tracker.latest().unwrap();
        assert_eq!(latest.timestamp_ms, 4);
        assert!(latest.is_absolute);
    }

    #[test]
    fn resubscribing_forgets_the_previous_heading() {
        let sensor = Rc::new(FakeSensor::ungated());
        let tracker = tracker(&sensor);
        block_on(tracker.request_access()).unwrap();

        let first = tracker.subscribe(|_| {}).unwrap();
        sensor.emit(event(Some(123.), 1));
        first.unsubscribe().unwrap();

        let last = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&last);
        let _second = tracker
            .subscribe(move |sample| *sink.borrow_mut() = Some(sample))
            .unwrap();
        assert_eq!(tracker.latest(), None);
        assert!(tracker.check_liveness(Duration::from_secs(60)).is_err());

        sensor.emit(event(None, 2));
        assert_eq!(last.borrow().unwrap().heading, None);
    }

    #[test]
    fn raw_samples_are_forwarded_unfiltered() {
        let sensor = Rc::new(FakeSensor::ungated());
        let tracker = tracker(&sensor);
        block_on(tracker.request_access()).unwrap();

        let last = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&last);
        let _subscription = tracker
            .subscribe(move |sample| *sink.borrow_mut() = sample.heading)
            .unwrap();

        sensor.emit(event(Some(10.), 1));
        sensor.emit(event(Some(200.), 2));
        assert_eq!(*last.borrow(), Some(Bearing::new(crate::util::degrees(200.))));
    }

    #[test]
    fn unsubscribing_stops_delivery() {
        let sensor = Rc::new(FakeSensor::ungated());
        let tracker = tracker(&sensor);
        block_on(tracker.request_access()).unwrap();

        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let subscription = tracker.subscribe(move |_| *sink.borrow_mut() += 1).unwrap();
        assert!(subscription.is_live());
        assert_eq!(sensor.listener_count(), 1);

        sensor.emit(event(Some(1.), 1));
        subscription.unsubscribe().unwrap();
        sensor.emit(event(Some(2.), 2));

        assert_eq!(*count.borrow(), 1);
        assert_eq!(sensor.listener_count(), 0);
    }

    #[test]
    fn dropping_the_subscription_unsubscribes() {
        let sensor = Rc::new(FakeSensor::ungated());
        let tracker = tracker(&sensor);
        block_on(tracker.request_access()).unwrap();

        drop(tracker.subscribe(|_| {}).unwrap());
        assert_eq!(sensor.listener_count(), 0);
    }

    #[test]
    fn failed_removal_still_silences_the_listener() {
        let sensor = Rc::new(FakeSensor::ungated());
        sensor.fail_removals();
        let tracker = tracker(&sensor);
        block_on(tracker.request_access()).unwrap();

        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let subscription = tracker.subscribe(move |_| *sink.borrow_mut() += 1).unwrap();

        assert!(subscription.unsubscribe().is_err());
        // the platform still holds the listener, but it no longer forwards anything
        assert_eq!(sensor.listener_count(), 1);
        sensor.emit(event(Some(2.), 2));
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn silent_sensor_is_reported_after_the_timeout() {
        let sensor = Rc::new(FakeSensor::ungated());
        let tracker = tracker(&sensor);
        block_on(tracker.request_access()).unwrap();
        let _subscription = tracker.subscribe(|_| {}).unwrap();

        assert_eq!(tracker.check_liveness(Duration::from_secs(1)), Ok(()));
        assert_eq!(
            tracker.check_liveness(Duration::from_secs(5)),
            Err(Error::SensorUnavailable {
                waited: Duration::from_secs(5)
            })
        );

        sensor.emit(event(None, 1));
        assert_eq!(tracker.check_liveness(Duration::from_secs(60)), Ok(()));
    }
}
