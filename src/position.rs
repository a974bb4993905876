//! Device geolocation, one-shot and continuous.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uom::si::f64::Length;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::PositionOptions;
use crate::error::{Capability, Error, Result};
use crate::geodesy::{Bearing, GeoPoint};

/// A position reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Radius of the 95% confidence circle around `point`.
    pub accuracy: Option<Length>,
    /// Direction of travel, if the device is moving.
    pub heading: Option<Bearing>,
    pub timestamp_ms: u64,
}

impl PositionFix {
    pub fn new(point: GeoPoint) -> Self {
        Self {
            point,
            accuracy: None,
            heading: None,
            timestamp_ms: 0,
        }
    }
}

/// The ways a platform geolocation request can fail.
///
/// Messages are meant for logs; user-facing text is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum PositionFailure {
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("timeout")]
    Timeout,
}

impl PositionFailure {
    /// Converts this into the crate [`Error`], given the options the request was made with.
    #[must_use]
    pub fn into_error(self, options: &PositionOptions) -> Error {
        match self {
            PositionFailure::PermissionDenied => Error::PermissionDenied(Capability::Geolocation),
            PositionFailure::PositionUnavailable => Error::PositionUnavailable,
            PositionFailure::Timeout => Error::AcquisitionTimeout {
                timeout: options.timeout(),
            },
        }
    }
}

/// Identifies a watch registered with a [`PositionProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type PositionCallback = Box<dyn FnMut(std::result::Result<PositionFix, PositionFailure>)>;

/// The platform geolocation API.
#[async_trait(?Send)]
pub trait PositionProvider {
    fn is_supported(&self) -> bool;

    async fn current_position(
        &self,
        options: PositionOptions,
    ) -> std::result::Result<PositionFix, PositionFailure>;

    /// Delivers every position update, and every failure, to `callback` until cleared.
    fn watch_position(&self, options: PositionOptions, callback: PositionCallback) -> WatchId;

    fn clear_watch(&self, id: WatchId);
}

/// Acquires the device position through a [`PositionProvider`] with fixed [`PositionOptions`].
pub struct Geolocator {
    provider: Rc<dyn PositionProvider>,
    options: PositionOptions,
    watching: Rc<Cell<bool>>,
}

impl Geolocator {
    pub fn new(provider: Rc<dyn PositionProvider>, options: PositionOptions) -> Self {
        Self {
            provider,
            options,
            watching: Rc::new(Cell::new(false)),
        }
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.provider.is_supported()
    }

    #[must_use]
    pub fn options(&self) -> &PositionOptions {
        &self.options
    }

    /// Whether a [`PositionWatch`] handed out by this geolocator is still live.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watching.get()
    }

    /// Requests a single fresh position.
    pub async fn current_position(&self) -> Result<PositionFix> {
        if !self.provider.is_supported() {
            return Err(Error::DeviceUnsupported(Capability::Geolocation));
        }
        self.provider
            .current_position(self.options)
            .await
            .map_err(|failure| failure.into_error(&self.options))
    }

    /// Starts delivering position updates to `callback`.
    ///
    /// Only one watch may be live at a time; it ends when the returned [`PositionWatch`] is
    /// dropped. Failures are delivered to the callback as well, and do not end the watch.
    pub fn watch(
        &self,
        mut callback: impl FnMut(Result<PositionFix>) + 'static,
    ) -> Result<PositionWatch> {
        if !self.provider.is_supported() {
            return Err(Error::DeviceUnsupported(Capability::Geolocation));
        }
        if self.watching.get() {
            return Err(Error::WatchActive);
        }

        let options = self.options;
        let live = Rc::new(Cell::new(true));
        let listener_live = Rc::clone(&live);
        let id = self.provider.watch_position(
            options,
            Box::new(move |update| {
                if !listener_live.get() {
                    return;
                }
                if let Err(failure) = &update {
                    warn!(%failure, "position watch reported a failure");
                }
                callback(update.map_err(|failure| failure.into_error(&options)));
            }),
        );
        self.watching.set(true);
        debug!(watch = %id, "watching position");

        Ok(PositionWatch {
            provider: Rc::clone(&self.provider),
            id,
            live,
            watching: Rc::clone(&self.watching),
        })
    }
}

impl fmt::Debug for Geolocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geolocator")
            .field("options", &self.options)
            .field("watching", &self.watching.get())
            .finish_non_exhaustive()
    }
}

/// A live position watch; dropping it clears the watch.
#[must_use = "dropping a PositionWatch clears it immediately"]
pub struct PositionWatch {
    provider: Rc<dyn PositionProvider>,
    id: WatchId,
    live: Rc<Cell<bool>>,
    watching: Rc<Cell<bool>>,
}

impl PositionWatch {
    #[must_use]
    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Clears the watch; the same as dropping it.
    pub fn clear(self) {}
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        if self.live.replace(false) {
            debug!(watch = %self.id, "clearing position watch");
            self.provider.clear_watch(self.id);
            self.watching.set(false);
        }
    }
}

impl fmt::Debug for PositionWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionWatch")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
