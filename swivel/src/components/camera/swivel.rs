use crate::{
    components::camera::{
        snapshots::{Snapshot, SnapshotStore},
        waypoint::{WaypointCycle, WaypointId},
    },
    devices::hardware::broker::{Broker, BrokerClient, BrokerConfig},
    error::{BrokerError, ConfigError, SwivelError},
    utils::timer::{TimerSlot, TimerTicket},
};
use bytes::Bytes;
use log::{debug, error, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, path::Path, sync::Arc, time::Duration};
use strum_macros::{Display, EnumString, IntoStaticStr};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
};
use uuid::Uuid;

/// Default settle time as a multiple of the move duration.
const DEFAULT_SETTLE_FACTOR: f64 = 1.4;
/// Default time between two snapshots at a waypoint, in milliseconds.
const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 2500;

/// Deployment profiles. They only differ in how fast the camera travels and
/// how long it dwells at each waypoint, explicit config values win.
#[derive(
    EnumString, Deserialize, Serialize, IntoStaticStr, Copy, Clone, Debug, Default, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SwivelProfile {
    /// 2 second moves, 10 to 20 second dwell.
    #[default]
    Standard,
    /// 4 second moves, 20 to 40 second dwell, for heavier camera heads.
    Slow,
}

impl SwivelProfile {
    /// Travel time requested from the broker for each move.
    pub fn move_duration(self) -> Duration {
        match self {
            SwivelProfile::Standard => Duration::from_millis(2000),
            SwivelProfile::Slow => Duration::from_millis(4000),
        }
    }

    /// Lower and upper dwell bound in seconds.
    pub fn stay_secs(self) -> (u64, u64) {
        match self {
            SwivelProfile::Standard => (10, 20),
            SwivelProfile::Slow => (20, 40),
        }
    }
}

fn default_waypoints() -> Vec<WaypointId> {
    vec!["c".into(), "a".into(), "b".into()]
}

fn default_capture_interval_ms() -> u64 {
    DEFAULT_CAPTURE_INTERVAL_MS
}

fn default_settle_factor() -> f64 {
    DEFAULT_SETTLE_FACTOR
}

/// As with all elements in the onyx system, a configuration struct
/// is consumed to create the component. Values left out fall back to
/// the defaults of the selected [`SwivelProfile`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CameraSwivelConfig {
    /// Location of the broker and the camera it fronts.
    broker: BrokerConfig,
    /// Profile supplying the move duration and dwell defaults.
    #[serde(default)]
    profile: SwivelProfile,
    /// Waypoints in the order they are visited.
    #[serde(default = "default_waypoints")]
    waypoints: Vec<WaypointId>,
    /// Time between two snapshots at a waypoint.
    #[serde(default = "default_capture_interval_ms")]
    capture_interval_ms: u64,
    /// Travel time requested for each move, overrides the profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    move_duration_ms: Option<u64>,
    /// Shortest dwell at a waypoint, overrides the profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_stay_secs: Option<u64>,
    /// Longest dwell at a waypoint, overrides the profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_stay_secs: Option<u64>,
    /// Settle time after a move as a multiple of the move duration.
    #[serde(default = "default_settle_factor")]
    settle_factor: f64,
    /// Seed for the dwell generator, random when left out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl CameraSwivelConfig {
    /// Create a config with the standard profile and default waypoints.
    ///
    /// * `host`: broker host name or address.
    /// * `camera`: camera identifier on the broker.
    pub fn new(host: impl Into<String>, camera: impl Into<String>) -> Self {
        Self::with_broker(BrokerConfig::new(host, camera))
    }

    /// Create a config around an existing broker config.
    pub fn with_broker(broker: BrokerConfig) -> Self {
        Self {
            broker,
            profile: SwivelProfile::default(),
            waypoints: default_waypoints(),
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            move_duration_ms: None,
            min_stay_secs: None,
            max_stay_secs: None,
            settle_factor: DEFAULT_SETTLE_FACTOR,
            seed: None,
        }
    }

    /// Select the profile used for defaults.
    pub fn with_profile(mut self, profile: SwivelProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Replace the waypoint sequence.
    pub fn with_waypoints<I, W>(mut self, waypoints: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<WaypointId>,
    {
        self.waypoints = waypoints.into_iter().map(Into::into).collect();
        self
    }

    /// Override the time between snapshots.
    pub fn with_capture_interval(mut self, interval: Duration) -> Self {
        self.capture_interval_ms = duration_ms(interval);
        self
    }

    /// Override the travel time of each move.
    pub fn with_move_duration(mut self, duration: Duration) -> Self {
        self.move_duration_ms = Some(duration_ms(duration));
        self
    }

    /// Override the dwell bounds, in seconds.
    pub fn with_stay_secs(mut self, min: u64, max: u64) -> Self {
        self.min_stay_secs = Some(min);
        self.max_stay_secs = Some(max);
        self
    }

    /// Override the settle multiplier.
    pub fn with_settle_factor(mut self, factor: f64) -> Self {
        self.settle_factor = factor;
        self
    }

    /// Fix the dwell generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the config by reading a yaml file, then applying `SWIVEL_`
    /// environment overrides, with `__` separating nested keys
    /// (i.e. `SWIVEL_BROKER__HOST`).
    ///
    /// * `filepath`: path to config.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ConfigError> {
        let file = Path::new(&filepath);
        if !file.is_file() {
            return Err(ConfigError::Invalid(format!(
                "could not locate the config file {:?}",
                file
            )));
        }
        let swivel_config = config::Config::builder()
            .add_source(config::File::new(
                &file.to_string_lossy(),
                config::FileFormat::Yaml,
            ))
            .add_source(
                config::Environment::with_prefix("SWIVEL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<CameraSwivelConfig>()?;
        swivel_config.validate()?;
        Ok(swivel_config)
    }

    /// Check the values are usable by the controller.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.waypoints.is_empty() {
            return Err(ConfigError::Invalid("at least one waypoint is required".into()));
        }
        if self.broker.host.is_empty() {
            return Err(ConfigError::Invalid("broker host must be set".into()));
        }
        if self.broker.camera.is_empty() {
            return Err(ConfigError::Invalid("camera identifier must be set".into()));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::Invalid("capture interval must be above zero".into()));
        }
        if self.move_duration().is_zero() {
            return Err(ConfigError::Invalid("move duration must be above zero".into()));
        }
        if !(self.settle_factor.is_finite() && self.settle_factor > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "settle factor must be a positive number, got {}",
                self.settle_factor
            )));
        }
        let (min, max) = self.stay_secs();
        if min > max {
            return Err(ConfigError::Invalid(format!(
                "min stay {min}s is above max stay {max}s"
            )));
        }
        Ok(())
    }

    /// Location of the broker.
    pub fn broker(&self) -> &BrokerConfig {
        &self.broker
    }

    /// Selected profile.
    pub fn profile(&self) -> SwivelProfile {
        self.profile
    }

    /// Waypoints in visiting order.
    pub fn waypoints(&self) -> &[WaypointId] {
        &self.waypoints
    }

    /// Time between two snapshots at a waypoint.
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    /// Travel time requested for each automatic move.
    pub fn move_duration(&self) -> Duration {
        self.move_duration_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.profile.move_duration())
    }

    /// Dwell bounds in seconds, `(min, max)`.
    pub fn stay_secs(&self) -> (u64, u64) {
        let (min, max) = self.profile.stay_secs();
        (
            self.min_stay_secs.unwrap_or(min),
            self.max_stay_secs.unwrap_or(max),
        )
    }

    /// Settle multiplier.
    pub fn settle_factor(&self) -> f64 {
        self.settle_factor
    }

    /// Dwell generator seed, if fixed.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Time to wait after a move is acknowledged before capturing, so the
/// camera head has physically come to rest.
pub fn settle_delay(move_duration: Duration, factor: f64) -> Duration {
    let settle_ms = (move_duration.as_millis() as f64 * factor).round();
    Duration::from_millis(settle_ms as u64)
}

/// Draw a dwell uniformly from `[min, max)` at millisecond resolution.
/// Equal bounds always give `min`.
pub fn sample_dwell<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let span_ms = duration_ms(max.saturating_sub(min));
    if span_ms == 0 {
        min
    } else {
        min + Duration::from_millis(rng.gen_range(0..span_ms))
    }
}

/// Phase of the swivel control loop.
#[derive(Display, IntoStaticStr, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SwivelPhase {
    /// Built but not started.
    #[default]
    Idle,
    /// A move is in flight or acknowledged and settling.
    Moving,
    /// Snapshots are being taken on an interval.
    Capturing,
    /// Terminal, no timers are armed and no commands are accepted.
    Stopped,
}

/// Point in time view of the controller, published after every event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwivelStatus {
    /// Current phase.
    pub phase: SwivelPhase,
    /// Waypoint of the last acknowledged move, `None` before the first one.
    pub waypoint: Option<WaypointId>,
    /// The sweep timer is armed.
    pub sweep_armed: bool,
    /// The settle timer is armed.
    pub settle_armed: bool,
    /// The capture interval is armed.
    pub capture_armed: bool,
}

/// Component that sweeps one camera through its waypoints using a broker
/// device. Generic over the broker so the control loop can be driven by a
/// scripted broker in tests.
pub struct CameraSwivel<B: Broker = BrokerClient> {
    /// Unique id of the swivel.
    uuid: Uuid,
    /// Config the component was built from.
    config: CameraSwivelConfig,
    /// Waypoints to visit.
    cycle: WaypointCycle,
    /// Device used to move and capture.
    broker: Arc<B>,
    /// Source of the random dwell.
    rng: StdRng,
}

impl CameraSwivel<BrokerClient> {
    /// Create the component by consuming a config, building the http
    /// broker client from its broker section.
    ///
    /// * `config`: Specified swivel config
    pub fn new(config: CameraSwivelConfig) -> Result<Self, ConfigError> {
        let broker = BrokerClient::new(config.broker()).map_err(ConfigError::Client)?;
        Self::with_broker(config, Arc::new(broker))
    }

    /// Create the component by ingesting a config file.
    ///
    /// * `filepath`: filepath to the config.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, ConfigError> {
        Self::new(CameraSwivelConfig::from_file(filepath)?)
    }
}

impl<B: Broker> CameraSwivel<B> {
    /// Create the component around an existing broker.
    pub fn with_broker(config: CameraSwivelConfig, broker: Arc<B>) -> Result<Self, ConfigError> {
        config.validate()?;
        let cycle = WaypointCycle::new(config.waypoints.clone())
            .ok_or_else(|| ConfigError::Invalid("at least one waypoint is required".into()))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            uuid: Uuid::new_v4(),
            config,
            cycle,
            broker,
            rng,
        })
    }

    /// Return the unique id of the swivel.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Config the component was built from.
    pub fn config(&self) -> &CameraSwivelConfig {
        &self.config
    }
}

/// Everything the control loop reacts to. Timer events carry the ticket
/// they were armed with so events from cancelled timers can be dropped.
enum SwivelEvent {
    SweepDue(TimerTicket),
    SettleDue(TimerTicket),
    CaptureDue(TimerTicket),
    MoveFinished {
        seq: u64,
        waypoint: WaypointId,
        duration: Duration,
        result: Result<(), BrokerError>,
    },
    CaptureFinished {
        waypoint: WaypointId,
        result: Result<Bytes, BrokerError>,
    },
    SweepNow,
    SwivelTo {
        waypoint: WaypointId,
        duration: Option<Duration>,
    },
    Stop,
}

/// Cloneable handle to a running swivel. Queries read shared state and never
/// wait on the control loop, commands are queued to it.
#[derive(Clone)]
pub struct SwivelHandle {
    /// Unique id of the swivel.
    uuid: Uuid,
    /// Mailbox of the control loop.
    mailbox: UnboundedSender<SwivelEvent>,
    /// Latest published status.
    status: watch::Receiver<SwivelStatus>,
    /// Latest snapshot per waypoint.
    snapshots: SnapshotStore,
}

impl SwivelHandle {
    /// Return the unique id of the swivel.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Latest snapshot taken at `waypoint`, `None` if there is none yet.
    pub fn get_snapshot(&self, waypoint: &str) -> Option<Snapshot> {
        self.snapshots.get(waypoint)
    }

    /// Waypoint the camera was last successfully moved to, `None` if no
    /// move has been acknowledged yet.
    pub fn get_waypoint(&self) -> Option<WaypointId> {
        self.status.borrow().waypoint.clone()
    }

    /// Latest status of the control loop.
    pub fn status(&self) -> SwivelStatus {
        self.status.borrow().clone()
    }

    /// Sweep to the next waypoint now instead of waiting out the dwell.
    pub fn sweep_now(&self) -> Result<(), SwivelError> {
        self.send(SwivelEvent::SweepNow)
    }

    /// Move to `waypoint` outside the sweep. The sweep keeps its schedule and
    /// will move on from wherever this leaves the camera.
    ///
    /// * `waypoint`: position to move to.
    /// * `duration`: travel time, the configured move duration if `None`.
    pub fn swivel_to(
        &self,
        waypoint: impl Into<WaypointId>,
        duration: Option<Duration>,
    ) -> Result<(), SwivelError> {
        self.send(SwivelEvent::SwivelTo {
            waypoint: waypoint.into(),
            duration,
        })
    }

    /// Stop the swivel and wait until the control loop has cancelled its
    /// timers. Calling it again after the first stop does nothing.
    pub async fn stop(&self) {
        // An error means the loop is already gone.
        let _ = self.mailbox.send(SwivelEvent::Stop);
        let mut status = self.status.clone();
        while status.borrow_and_update().phase != SwivelPhase::Stopped {
            if status.changed().await.is_err() {
                break;
            }
        }
    }

    fn send(&self, event: SwivelEvent) -> Result<(), SwivelError> {
        if self.status.borrow().phase == SwivelPhase::Stopped {
            return Err(SwivelError::Stopped);
        }
        self.mailbox.send(event).map_err(|_| SwivelError::Stopped)
    }
}

/// Unit struct to link component controller behaviour, keeping the start up
/// detached from the owned state of the component.
pub struct CameraSwivelController;

impl CameraSwivelController {
    /// Start the control loop on the tokio runtime. The first move is issued
    /// and the sweep armed before this returns, so the swivel is already
    /// `Moving` and a following stop can only cancel what was started here.
    /// Returns a handle for queries and commands and the join handle of the
    /// loop, which finishes once the swivel is stopped.
    ///
    /// * `swivel`: component to drive.
    pub fn start<B: Broker>(swivel: CameraSwivel<B>) -> (SwivelHandle, JoinHandle<()>) {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SwivelStatus::default());
        let snapshots = SnapshotStore::new();

        let handle = SwivelHandle {
            uuid: swivel.uuid,
            mailbox: mailbox.clone(),
            status: status_rx,
            snapshots: snapshots.clone(),
        };

        let (min_stay, max_stay) = swivel.config.stay_secs();
        let mut control_loop = SwivelLoop {
            uuid: swivel.uuid,
            broker: swivel.broker,
            rng: swivel.rng,
            cycle: swivel.cycle,
            move_duration: swivel.config.move_duration(),
            capture_interval: swivel.config.capture_interval(),
            min_stay: Duration::from_secs(min_stay),
            max_stay: Duration::from_secs(max_stay),
            settle_factor: swivel.config.settle_factor,
            phase: SwivelPhase::Idle,
            active: None,
            move_seq: 0,
            capture_in_flight: false,
            sweep: TimerSlot::new("sweep"),
            settle: TimerSlot::new("settle"),
            capture: TimerSlot::new("capture"),
            snapshots,
            status: status_tx,
            mailbox,
            inbox,
        };

        info!(
            "Started swivel {} over waypoints {:?}",
            control_loop.uuid,
            control_loop.cycle.waypoints()
        );
        control_loop.auto_swivel();
        control_loop.publish();

        (handle, tokio::spawn(control_loop.run()))
    }
}

/// Single owner of the controller state. Runs as one task and handles one
/// event at a time, every timer cancel and arm happens here.
struct SwivelLoop<B: Broker> {
    uuid: Uuid,
    broker: Arc<B>,
    rng: StdRng,
    cycle: WaypointCycle,
    move_duration: Duration,
    capture_interval: Duration,
    min_stay: Duration,
    max_stay: Duration,
    settle_factor: f64,
    phase: SwivelPhase,
    /// Waypoint of the last acknowledged move.
    active: Option<WaypointId>,
    /// Number of the latest move, older acknowledgements are dropped.
    move_seq: u64,
    capture_in_flight: bool,
    sweep: TimerSlot,
    settle: TimerSlot,
    capture: TimerSlot,
    snapshots: SnapshotStore,
    status: watch::Sender<SwivelStatus>,
    mailbox: UnboundedSender<SwivelEvent>,
    inbox: UnboundedReceiver<SwivelEvent>,
}

impl<B: Broker> SwivelLoop<B> {
    async fn run(mut self) {
        while let Some(event) = self.inbox.recv().await {
            match event {
                SwivelEvent::SweepDue(ticket) => {
                    if self.sweep.fire(ticket) {
                        self.auto_swivel();
                    }
                }
                SwivelEvent::SettleDue(ticket) => {
                    if self.settle.fire(ticket) {
                        self.start_snapshots();
                    }
                }
                SwivelEvent::CaptureDue(ticket) => {
                    if self.capture.is_current(ticket) {
                        self.take_snapshot();
                    }
                }
                SwivelEvent::MoveFinished {
                    seq,
                    waypoint,
                    duration,
                    result,
                } => self.finish_move(seq, waypoint, duration, result),
                SwivelEvent::CaptureFinished { waypoint, result } => {
                    self.finish_snapshot(waypoint, result);
                }
                SwivelEvent::SweepNow => self.auto_swivel(),
                SwivelEvent::SwivelTo { waypoint, duration } => {
                    let duration = duration.unwrap_or(self.move_duration);
                    self.swivel_to(waypoint, duration);
                }
                SwivelEvent::Stop => {
                    self.stop();
                    break;
                }
            }
            self.publish();
        }
    }

    /// Move on to the next waypoint and schedule the following sweep. The
    /// dwell counts from now, whether or not the move succeeds.
    fn auto_swivel(&mut self) {
        let waypoint = self.cycle.advance();
        self.swivel_to(waypoint, self.move_duration);

        let stay = sample_dwell(&mut self.rng, self.min_stay, self.max_stay);
        debug!("Next sweep in {:?}", stay);
        self.sweep
            .arm_once(stay, &self.mailbox, SwivelEvent::SweepDue);
    }

    fn swivel_to(&mut self, waypoint: WaypointId, duration: Duration) {
        // No captures while the camera is in transit.
        self.stop_snapshots();
        self.phase = SwivelPhase::Moving;
        self.move_seq += 1;

        info!("Moving waypoint to {waypoint} over {duration:?}");
        let seq = self.move_seq;
        let broker = Arc::clone(&self.broker);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = broker.move_to(&waypoint, duration).await;
            let _ = mailbox.send(SwivelEvent::MoveFinished {
                seq,
                waypoint,
                duration,
                result,
            });
        });
    }

    fn finish_move(
        &mut self,
        seq: u64,
        waypoint: WaypointId,
        duration: Duration,
        result: Result<(), BrokerError>,
    ) {
        if seq != self.move_seq {
            debug!("Ignoring response to superseded move to {waypoint}");
            return;
        }
        match result {
            Ok(()) => {
                info!("Moved waypoint to {waypoint}");
                self.active = Some(waypoint);
                self.capture.cancel();
                self.settle.arm_once(
                    settle_delay(duration, self.settle_factor),
                    &self.mailbox,
                    SwivelEvent::SettleDue,
                );
            }
            // Capture stays off until the next sweep retries a move.
            Err(e) => error!("Did not get OK for a request to move waypoint to {waypoint}: {e}"),
        }
    }

    fn start_snapshots(&mut self) {
        self.settle.cancel();
        self.phase = SwivelPhase::Capturing;
        self.capture
            .arm_every(self.capture_interval, &self.mailbox, SwivelEvent::CaptureDue);
        info!("Started snapshot on waypoint {}", self.active_label());
    }

    fn stop_snapshots(&mut self) {
        let settling = self.settle.cancel();
        if self.capture.cancel() {
            info!("Stopped snapshot on waypoint {}", self.active_label());
        } else if settling {
            debug!("Cancelled settle on waypoint {}", self.active_label());
        }
    }

    fn take_snapshot(&mut self) {
        let Some(waypoint) = self.active.clone() else {
            return;
        };
        if self.capture_in_flight {
            debug!("Snapshot on {waypoint} still pending, skipping tick");
            return;
        }
        self.capture_in_flight = true;

        let broker = Arc::clone(&self.broker);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let result = broker.capture_snapshot().await;
            let _ = mailbox.send(SwivelEvent::CaptureFinished { waypoint, result });
        });
    }

    fn finish_snapshot(&mut self, waypoint: WaypointId, result: Result<Bytes, BrokerError>) {
        self.capture_in_flight = false;
        match result {
            Ok(image) => {
                debug!("Stored {} byte snapshot for {waypoint}", image.len());
                self.snapshots.insert(waypoint, image);
            }
            Err(e) => {
                warn!("Did not get an OK for a request to take snapshot on {waypoint}: {e}");
            }
        }
    }

    fn stop(&mut self) {
        self.sweep.cancel();
        self.stop_snapshots();
        self.phase = SwivelPhase::Stopped;
        self.publish();
        info!("Stopped swivel {}", self.uuid);
    }

    fn active_label(&self) -> &str {
        self.active
            .as_ref()
            .map(WaypointId::as_str)
            .unwrap_or("unknown")
    }

    fn publish(&self) {
        self.status.send_replace(SwivelStatus {
            phase: self.phase,
            waypoint: self.active.clone(),
            sweep_armed: self.sweep.is_armed(),
            settle_armed: self.settle.is_armed(),
            capture_armed: self.capture.is_armed(),
        });
    }
}
