//! Shared targets: looking them up by share code and handing them to the AR view.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geodesy::GeoPoint;

const MIN_CODE_LEN: usize = 3;
const MAX_CODE_LEN: usize = 10;

/// The short code under which a location is shared, eg. `K7Q2XD`.
///
/// Codes are 3 to 10 characters of `A-Z` and `0-9`. Parsing is lenient about surrounding
/// whitespace and lowercase input, as codes are typed in by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct ShareCode(String);

impl ShareCode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Returned when parsing a [`ShareCode`] fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidShareCode {
    #[error("share code must be 3 to 10 characters long, got {0}")]
    Length(usize),
    #[error("share code may only contain A-Z and 0-9, got {0:?}")]
    Character(char),
}

impl FromStr for ShareCode {
    type Err = InvalidShareCode;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        if let Some(bad) = code
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit()))
        {
            return Err(InvalidShareCode::Character(bad));
        }
        // all characters are ASCII at this point, so bytes and chars agree
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len()) {
            return Err(InvalidShareCode::Length(code.len()));
        }
        Ok(Self(code))
    }
}

impl TryFrom<String> for ShareCode {
    type Error = InvalidShareCode;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ShareCode> for String {
    fn from(code: ShareCode) -> Self {
        code.0
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A location someone shared, as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SharedTarget {
    pub code: ShareCode,
    pub name: String,
    pub point: GeoPoint,
}

impl fmt::Display for SharedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] at {}", self.name, self.code, self.point)
    }
}

/// Read-only access to shared locations.
#[async_trait(?Send)]
pub trait TargetSource {
    /// Looks up the location shared under `code`, returning `None` if there is none.
    async fn fetch(&self, code: &ShareCode) -> Result<Option<SharedTarget>>;
}

/// Looks up the location shared under `code`, failing with [`Error::TargetNotFound`] if there
/// is none.
pub async fn resolve(source: &dyn TargetSource, code: &ShareCode) -> Result<SharedTarget> {
    match source.fetch(code).await? {
        Some(target) => {
            debug!(%code, point = %target.point, "resolved shared target");
            Ok(target)
        }
        None => Err(Error::TargetNotFound(code.clone())),
    }
}

/// What travels over a [`TargetChannel`].
#[derive(Debug, Clone, PartialEq)]
pub enum TargetEvent {
    /// The user picked a target to aim at.
    Selected(SharedTarget),
    /// The user dismissed the current target.
    Cleared,
}

type Listener = Rc<RefCell<dyn FnMut(&TargetEvent)>>;

#[derive(Default)]
struct Channel {
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_id: Cell<u64>,
    current: RefCell<Option<SharedTarget>>,
    pending: RefCell<VecDeque<TargetEvent>>,
    delivering: Cell<bool>,
}

impl Channel {
    fn is_subscribed(&self, id: u64) -> bool {
        self.listeners.borrow().iter().any(|(other, _)| *other == id)
    }
}

/// Hands targets from whoever picks them (a map, a share-code prompt) to whoever shows them.
///
/// Clones share the same channel. Every subscriber sees every event published after it
/// subscribed; [`current`](Self::current) covers the ones published before.
#[derive(Clone, Default)]
pub struct TargetChannel {
    inner: Rc<Channel>,
}

impl TargetChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recently selected target, unless it was cleared since.
    #[must_use]
    pub fn current(&self) -> Option<SharedTarget> {
        self.inner.current.borrow().clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn select(&self, target: SharedTarget) {
        self.publish(TargetEvent::Selected(target));
    }

    pub fn clear(&self) {
        self.publish(TargetEvent::Cleared);
    }

    /// Delivers `event` to every subscriber.
    ///
    /// Subscribers may subscribe, unsubscribe and publish from within their callback. Events
    /// published during a delivery are queued and delivered once it finishes, so every
    /// subscriber sees events in the order they were published and is never re-entered.
    pub fn publish(&self, event: TargetEvent) {
        *self.inner.current.borrow_mut() = match &event {
            TargetEvent::Selected(target) => Some(target.clone()),
            TargetEvent::Cleared => None,
        };
        self.inner.pending.borrow_mut().push_back(event);
        if self.inner.delivering.replace(true) {
            trace!("queued target event published during delivery");
            return;
        }

        loop {
            let Some(event) = self.inner.pending.borrow_mut().pop_front() else {
                break;
            };
            self.deliver(&event);
        }
        self.inner.delivering.set(false);
    }

    fn deliver(&self, event: &TargetEvent) {
        let snapshot: Vec<(u64, Listener)> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(id, listener)| (*id, Rc::clone(listener)))
            .collect();
        for (id, listener) in snapshot {
            if !self.inner.is_subscribed(id) {
                continue;
            }
            match listener.try_borrow_mut() {
                Ok(mut listener) => (*listener)(event),
                Err(_) => warn!(subscriber = id, "skipping re-entrant target event delivery"),
            }
        }
    }

    pub fn subscribe(&self, listener: impl FnMut(&TargetEvent) + 'static) -> TargetSubscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let listener: Listener = Rc::new(RefCell::new(listener));
        self.inner.listeners.borrow_mut().push((id, listener));
        TargetSubscription {
            channel: Rc::downgrade(&self.inner),
            id,
        }
    }
}

impl fmt::Debug for TargetChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetChannel")
            .field("subscribers", &self.subscriber_count())
            .field("current", &*self.inner.current.borrow())
            .finish()
    }
}

/// Keeps a [`TargetChannel`] subscriber registered; dropping it unsubscribes.
#[must_use = "dropping a TargetSubscription unsubscribes immediately"]
#[derive(Debug)]
pub struct TargetSubscription {
    channel: Weak<Channel>,
    id: u64,
}

impl Drop for TargetSubscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel
                .listeners
                .borrow_mut()
                .retain(|(id, _)| *id != self.id);
        }
    }
}
