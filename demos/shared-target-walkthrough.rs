//! Walks through finding a shared location: resolve a share code, locate ourselves, open the AR
//! view and sweep the phone around while watching the marker move.
//!
//! The platform is simulated: the compass is driven by hand and the camera produces a single
//! pretend video track.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use futures::executor::block_on;
use sightline::camera::{MediaStream, MediaTrack, StreamConstraints};
use sightline::config::PositionOptions;
use sightline::geodesy::{format_distance, CompassPoint};
use sightline::orientation::{ListenerId, OrientationEvent, PermissionResponse};
use sightline::position::{PositionCallback, PositionFailure, PositionFix, WatchId};
use sightline::{
    ArConfig, ArProjector, CameraDevice, CameraSession, Capabilities, GeoPoint, Geolocator,
    OrientationSensor, OrientationTracker, PositionProvider, Result, ShareCode, SharedTarget,
    TargetChannel, TargetSource, VideoSink, Viewport,
};
use uom::si::f64::Length;
use uom::si::length::meter;

/// A compass we turn by hand.
#[derive(Default)]
struct HandCompass {
    listeners: RefCell<Vec<(ListenerId, Box<dyn FnMut(&OrientationEvent)>)>>,
    next_id: Cell<u64>,
}

impl HandCompass {
    fn turn_to(&self, alpha: f64, timestamp_ms: u64) {
        let event = OrientationEvent {
            alpha: Some(alpha),
            beta: Some(90.),
            gamma: Some(0.),
            absolute: true,
            timestamp_ms,
        };
        for (_, listener) in self.listeners.borrow_mut().iter_mut() {
            listener(&event);
        }
    }
}

#[async_trait(?Send)]
impl OrientationSensor for HandCompass {
    fn is_supported(&self) -> bool {
        true
    }

    fn requires_permission(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> Result<PermissionResponse> {
        println!("? allow access to motion and orientation -> yes");
        Ok(PermissionResponse::Granted)
    }

    fn add_listener(&self, listener: Box<dyn FnMut(&OrientationEvent)>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> Result<()> {
        self.listeners.borrow_mut().retain(|(other, _)| *other != id);
        Ok(())
    }
}

struct PretendTrack;

impl MediaTrack for PretendTrack {
    fn label(&self) -> &str {
        "rear camera"
    }

    fn stop(&mut self) -> Result<()> {
        println!("  camera track stopped");
        Ok(())
    }
}

struct PretendCamera;

#[async_trait(?Send)]
impl CameraDevice for PretendCamera {
    fn is_supported(&self) -> bool {
        true
    }

    async fn open(&self, constraints: StreamConstraints) -> Result<MediaStream> {
        println!(
            "  opening {:?} camera at {}x{}",
            constraints.facing, constraints.ideal_width, constraints.ideal_height
        );
        Ok(MediaStream::new(vec![Box::new(PretendTrack)]))
    }
}

struct Viewfinder;

impl VideoSink for Viewfinder {
    fn attach(&mut self, stream: &MediaStream) -> Result<()> {
        println!("  showing {stream:?}");
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        println!("  viewfinder cleared");
        Ok(())
    }
}

/// Always standing at the north exit of Shibuya station.
struct FixedPosition(GeoPoint);

#[async_trait(?Send)]
impl PositionProvider for FixedPosition {
    fn is_supported(&self) -> bool {
        true
    }

    async fn current_position(
        &self,
        _options: PositionOptions,
    ) -> std::result::Result<PositionFix, PositionFailure> {
        Ok(PositionFix {
            accuracy: Some(Length::new::<meter>(12.)),
            ..PositionFix::new(self.0)
        })
    }

    fn watch_position(&self, _options: PositionOptions, _callback: PositionCallback) -> WatchId {
        WatchId(0)
    }

    fn clear_watch(&self, _id: WatchId) {}
}

/// The one location that was shared with us.
struct Inbox(SharedTarget);

#[async_trait(?Send)]
impl TargetSource for Inbox {
    async fn fetch(&self, code: &ShareCode) -> Result<Option<SharedTarget>> {
        Ok((code == &self.0.code).then(|| self.0.clone()))
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = ArConfig::default();

    let station = GeoPoint::from_degrees(35.6590, 139.7005).ok_or("bad latitude")?;
    let meeting_point = station
        .offset_by(Length::new::<meter>(40.), Length::new::<meter>(-25.))
        .ok_or("bad offset")?;
    let inbox = Inbox(SharedTarget {
        code: "HACHI5".parse()?,
        name: "Hachiko statue".into(),
        point: meeting_point,
    });

    // 1. someone sends us a code; resolve it and hand the target to the AR view
    let channel = TargetChannel::new();
    let projector = Rc::new(RefCell::new(ArProjector::new(config.projection)?));
    let view = Rc::clone(&projector);
    let _target_subscription = channel.subscribe(move |event| {
        view.borrow_mut().apply(event);
    });

    let code: ShareCode = " hachi5 ".parse()?;
    let target = block_on(sightline::target::resolve(&inbox, &code))?;
    println!("shared with us: {target}");
    channel.select(target);

    // 2. find out where we are
    let geolocator = Geolocator::new(Rc::new(FixedPosition(station)), config.position);
    let fix = block_on(geolocator.current_position())?;
    println!("we are at {}", fix.point);
    let result = projector.borrow_mut().set_current_position(fix.point);
    let bearing = station.bearing_to(&meeting_point);
    println!(
        "target is {} away, {} ({})",
        result
            .distance
            .map(format_distance)
            .unwrap_or_else(|| "?".into()),
        bearing,
        CompassPoint::from_bearing(bearing)
    );

    // 3. open the AR view
    let compass = Rc::new(HandCompass::default());
    let tracker = Rc::new(OrientationTracker::new(compass.clone(), config.orientation));
    let capabilities = Capabilities {
        webxr: false,
        orientation: true,
        camera: true,
        geolocation: true,
    };
    let mut session = CameraSession::new(
        Rc::new(PretendCamera),
        tracker,
        capabilities,
        config.camera,
    );
    let sink = Rc::clone(&projector);
    block_on(session.initialize(
        Viewport {
            width: 390,
            height: 844,
        },
        Box::new(Viewfinder),
        move |sample| {
            let marker = sink.borrow_mut().observe(&sample);
            let heading = sample.heading.map_or(f64::NAN, |h| h.degrees());
            println!("  heading {heading:>5.1}° -> {marker}");
        },
    ))?;
    println!("session is {:?}", session.state());

    // 4. sweep the phone from east to west
    for (i, alpha) in [90., 45., 0., 330., 300., 250., 200.].into_iter().enumerate() {
        compass.turn_to(alpha, i as u64 * 100);
    }

    // 5. done
    session.teardown();
    println!("session is {:?}", session.state());
    compass.turn_to(0., 1_000);

    Ok(())
}
