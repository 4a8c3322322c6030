//! Periodic tasks and the link-thread ingest handlers that feed them.
//!
//! ```text
//!  link-radar thread ── RadarIngest ──mpsc──▶ radar task ──latest──▶ distance
//!        │                                                              │
//!        └──────────▶ RadarHealth ◀──────────────────────┐              │
//!                                                        │              ▼
//!  link-sensor-board ── SensorIngest ──mpsc──▶ IMU task ─┼─▶ GyroWindow ─▶ aim task ─▶ overlay / aim
//!        │                                               │                ▲
//!        └── UI events ──▶ EventBus(Operator) ─▶ calibration task ─▶ CalibrationStore
//!                                                                          │
//!  detections (latest) ───────────────────────────────────────────────────┘
//! ```
//!
//! Each task owns its writes. Cross-task reads go through latest-value
//! channels or short critical sections; nothing here blocks a producer.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use scope_calibration::{CalibrationCell, CalibrationEditor, CalibrationError, CalibrationStore};
use scope_middleware::{EventBus, LatestReceiver, LatestSender, Topic, TopicReceiver, latest};
use scope_perception::radar::point_cloud;
use scope_perception::{GyroWindow, ImuConfig, ImuEstimator, RadarEstimator, RadarHealth};
use scope_protocol::{SensorMessage, TlvFrame, decode_point_cloud, decode_sensor_frame};
use scope_types::{
    AimOverlay, Detection, Event, EventPayload, ImuSample, Orientation, OverlayInfo, PointCloud,
    RotationAnalysis, UiEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::aim::{AimController, AimSensors};
use crate::clock::Clock;
use crate::dump::RadarDump;

/// Point clouds buffered between the radar link thread and the radar task.
pub const RADAR_QUEUE_LEN: usize = 8;
/// IMU samples buffered between the sensor-board thread and the IMU task.
pub const IMU_QUEUE_LEN: usize = 256;
/// Editor commands buffered for the calibration task.
pub const EDITOR_QUEUE_LEN: usize = 16;

/// How often event-driven tasks look at the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Tick period of each periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPeriods {
    pub radar: Duration,
    pub imu: Duration,
    pub aim: Duration,
}

impl Default for TaskPeriods {
    fn default() -> Self {
        Self {
            radar: Duration::from_millis(33),
            imu: Duration::from_micros(1250),
            aim: Duration::from_micros(3333),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Link-thread handlers
// ────────────────────────────────────────────────────────────────────────────

/// Frame handler for the radar link: records arrivals, optionally dumps the
/// points and forwards each cloud to the radar task.
pub struct RadarIngest {
    clock: Clock,
    health: Arc<RadarHealth>,
    clouds: mpsc::Sender<PointCloud>,
    dump: Option<RadarDump>,
}

impl RadarIngest {
    pub fn with_dump(mut self, dump: RadarDump) -> Self {
        self.dump = Some(dump);
        self
    }

    pub fn handle(&mut self, frame: TlvFrame) -> ControlFlow<()> {
        let now_ms = self.clock.now_ms();
        let radar_frame = match decode_point_cloud(&frame) {
            Ok(Some(radar_frame)) => radar_frame,
            Ok(None) => return ControlFlow::Continue(()),
            Err(e) => {
                warn!(frame_number = frame.frame_number(), error = %e, "Dropping radar frame");
                return ControlFlow::Continue(());
            }
        };
        self.health.record_frame(now_ms, radar_frame.detections.len());

        let cloud = point_cloud(&radar_frame, Utc::now());
        if let Some(dump) = &mut self.dump
            && let Err(e) = dump.write_cloud(now_ms, &cloud)
        {
            warn!(error = %e, "Radar dump failed; disabling it");
            self.dump = None;
        }

        match self.clouds.try_send(cloud) {
            Ok(()) => ControlFlow::Continue(()),
            Err(TrySendError::Full(cloud)) => {
                debug!(frame_number = cloud.frame_number, "Radar task behind; cloud dropped");
                ControlFlow::Continue(())
            }
            Err(TrySendError::Closed(_)) => ControlFlow::Break(()),
        }
    }
}

impl Drop for RadarIngest {
    fn drop(&mut self) {
        if let Some(dump) = &mut self.dump
            && let Err(e) = dump.flush()
        {
            warn!(error = %e, "Radar dump flush failed");
        }
    }
}

/// Frame handler for the sensor-board link: IMU samples go to the IMU task,
/// UI events onto [`Topic::Operator`].
pub struct SensorIngest {
    samples: mpsc::Sender<ImuSample>,
    bus: EventBus,
}

impl SensorIngest {
    pub fn handle(&mut self, frame: TlvFrame) -> ControlFlow<()> {
        match decode_sensor_frame(&frame) {
            Ok(Some(SensorMessage::Imu(sample))) => match self.samples.try_send(sample) {
                Ok(()) | Err(TrySendError::Full(_)) => ControlFlow::Continue(()),
                Err(TrySendError::Closed(_)) => ControlFlow::Break(()),
            },
            Ok(Some(SensorMessage::Ui(ui))) => {
                debug!(?ui, "Operator input");
                let event = Event::new("scope-runtime::sensor", EventPayload::Ui(ui));
                if let Err(e) = self.bus.publish_to(Topic::Operator, event) {
                    debug!(error = %e, "Operator input not delivered");
                }
                ControlFlow::Continue(())
            }
            Ok(None) => ControlFlow::Continue(()),
            Err(e) => {
                warn!(frame_number = frame.frame_number(), error = %e, "Dropping sensor-board frame");
                ControlFlow::Continue(())
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Aim inputs
// ────────────────────────────────────────────────────────────────────────────

/// [`AimSensors`] backed by the handles the other tasks write to.
#[derive(Debug, Clone)]
pub struct SharedSensors {
    health: Arc<RadarHealth>,
    gyro: Arc<GyroWindow>,
    distance: LatestReceiver<f32>,
}

impl AimSensors for SharedSensors {
    fn distance(&self) -> f32 {
        self.distance.peek().unwrap_or(0.0)
    }

    fn radar_healthy(&self, now_ms: u64) -> bool {
        self.health.received_sufficient_frames_recently(now_ms)
    }

    fn rotation(&self) -> RotationAnalysis {
        self.gyro.rotation_mean_and_variance()
    }
}

/// Requests to the calibration task that do not come from the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    Begin(CalibrationCell),
    Cancel,
    ToggleForceAllDistances,
    Save,
}

// ────────────────────────────────────────────────────────────────────────────
// ScopeRuntime
// ────────────────────────────────────────────────────────────────────────────

/// What the outside world holds once the runtime is running.
pub struct ScopeHandles {
    /// Publish inference results here; only the newest is ever used.
    pub detections: LatestSender<Detection>,
    pub overlay: LatestReceiver<OverlayInfo>,
    pub aim: LatestReceiver<AimOverlay>,
    pub orientation: LatestReceiver<Orientation>,
    pub distance: LatestReceiver<f32>,
    pub editor: mpsc::Sender<EditorCommand>,
}

/// Everything [`ScopeRuntime::start`] hands back.
pub struct Started {
    pub handles: ScopeHandles,
    /// Pass to the radar link supervisor.
    pub radar_ingest: RadarIngest,
    /// Pass to the sensor-board link supervisor.
    pub sensor_ingest: SensorIngest,
    pub tasks: Vec<JoinHandle<()>>,
}

pub struct ScopeRuntime {
    clock: Clock,
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
    periods: TaskPeriods,
    imu_config: ImuConfig,
    calibration: Arc<RwLock<CalibrationStore>>,
    radar_health: Arc<RadarHealth>,
    gyro: Arc<GyroWindow>,
}

impl ScopeRuntime {
    pub fn new(
        clock: Clock,
        bus: EventBus,
        shutdown: Arc<AtomicBool>,
        calibration: CalibrationStore,
    ) -> Self {
        Self {
            clock,
            bus,
            shutdown,
            periods: TaskPeriods::default(),
            imu_config: ImuConfig::default(),
            calibration: Arc::new(RwLock::new(calibration)),
            radar_health: Arc::new(RadarHealth::new()),
            gyro: Arc::new(GyroWindow::new()),
        }
    }

    pub fn with_periods(mut self, periods: TaskPeriods) -> Self {
        self.periods = periods;
        self
    }

    pub fn with_imu_config(mut self, config: ImuConfig) -> Self {
        self.imu_config = config;
        self
    }

    /// The gyro window the IMU task writes to; calibrate it once samples
    /// are flowing.
    pub fn gyro(&self) -> Arc<GyroWindow> {
        Arc::clone(&self.gyro)
    }

    pub fn radar_health(&self) -> Arc<RadarHealth> {
        Arc::clone(&self.radar_health)
    }

    pub fn calibration(&self) -> Arc<RwLock<CalibrationStore>> {
        Arc::clone(&self.calibration)
    }

    /// Spawn the radar, IMU, aim and calibration tasks on the current Tokio
    /// runtime.
    pub fn start(self) -> Started {
        let (cloud_tx, cloud_rx) = mpsc::channel(RADAR_QUEUE_LEN);
        let (imu_tx, imu_rx) = mpsc::channel(IMU_QUEUE_LEN);
        let (editor_tx, editor_rx) = mpsc::channel(EDITOR_QUEUE_LEN);
        let (detection_tx, detection_rx) = latest::<Detection>();
        let (distance_tx, distance_rx) = latest::<f32>();
        let (orientation_tx, orientation_rx) = latest::<Orientation>();
        let (overlay_tx, overlay_rx) = latest::<OverlayInfo>();
        let (aim_tx, aim_rx) = latest::<AimOverlay>();

        // Subscribe before any link thread can publish.
        let operator = self.bus.subscribe_to(Topic::Operator);

        let sensors = SharedSensors {
            health: Arc::clone(&self.radar_health),
            gyro: Arc::clone(&self.gyro),
            distance: distance_rx.clone(),
        };

        let tasks = vec![
            tokio::spawn(radar_task(
                self.periods.radar,
                cloud_rx,
                distance_tx,
                Arc::clone(&self.shutdown),
            )),
            tokio::spawn(imu_task(
                self.periods.imu,
                imu_rx,
                ImuEstimator::new(self.imu_config, Arc::clone(&self.gyro)),
                orientation_tx,
                Arc::clone(&self.shutdown),
            )),
            tokio::spawn(aim_task(AimTask {
                period: self.periods.aim,
                clock: self.clock,
                detections: detection_rx,
                sensors,
                calibration: Arc::clone(&self.calibration),
                overlay: overlay_tx,
                aim: aim_tx,
                bus: self.bus.clone(),
                shutdown: Arc::clone(&self.shutdown),
            })),
            tokio::spawn(calibration_task(CalibrationTask {
                clock: self.clock,
                commands: editor_rx,
                operator,
                calibration: Arc::clone(&self.calibration),
                bus: self.bus.clone(),
                shutdown: Arc::clone(&self.shutdown),
            })),
        ];
        info!(
            radar_period = ?self.periods.radar,
            imu_period = ?self.periods.imu,
            aim_period = ?self.periods.aim,
            "Scope runtime started"
        );

        Started {
            handles: ScopeHandles {
                detections: detection_tx,
                overlay: overlay_rx,
                aim: aim_rx,
                orientation: orientation_rx,
                distance: distance_rx,
                editor: editor_tx,
            },
            radar_ingest: RadarIngest {
                clock: self.clock,
                health: self.radar_health,
                clouds: cloud_tx,
                dump: None,
            },
            sensor_ingest: SensorIngest { samples: imu_tx, bus: self.bus },
            tasks,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tasks
// ────────────────────────────────────────────────────────────────────────────

/// Drain every queued item; `false` once the sending side is gone.
fn drain<T>(rx: &mut mpsc::Receiver<T>, mut f: impl FnMut(T)) -> bool {
    loop {
        match rx.try_recv() {
            Ok(item) => f(item),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn radar_task(
    period: Duration,
    mut clouds: mpsc::Receiver<PointCloud>,
    distance: LatestSender<f32>,
    shutdown: Arc<AtomicBool>,
) {
    let mut estimator = RadarEstimator::new();
    let mut ticker = ticker(period);
    while !shutdown.load(Ordering::Relaxed) {
        ticker.tick().await;
        let open = drain(&mut clouds, |cloud| {
            if let Some(d) = estimator.filter_and_average(&cloud) {
                distance.publish(d);
            }
        });
        if !open {
            debug!("Radar ingest closed");
            break;
        }
    }
    info!(distance = ?estimator.distance(), "Radar task stopped");
}

async fn imu_task(
    period: Duration,
    mut samples: mpsc::Receiver<ImuSample>,
    mut estimator: ImuEstimator,
    orientation: LatestSender<Orientation>,
    shutdown: Arc<AtomicBool>,
) {
    let mut ticker = ticker(period);
    while !shutdown.load(Ordering::Relaxed) {
        ticker.tick().await;
        let open = drain(&mut samples, |sample| {
            if let Some(o) = estimator.ingest(sample) {
                orientation.publish(o);
            }
        });
        if !open {
            debug!("IMU ingest closed");
            break;
        }
    }
    info!(
        rejected = estimator.rejected(),
        dropped = estimator.dropped(),
        "IMU task stopped"
    );
}

struct AimTask {
    period: Duration,
    clock: Clock,
    detections: LatestReceiver<Detection>,
    sensors: SharedSensors,
    calibration: Arc<RwLock<CalibrationStore>>,
    overlay: LatestSender<OverlayInfo>,
    aim: LatestSender<AimOverlay>,
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
}

async fn aim_task(mut task: AimTask) {
    let mut controller = AimController::new();
    let mut ticker = ticker(task.period);
    while !task.shutdown.load(Ordering::Relaxed) {
        ticker.tick().await;
        let now_ms = task.clock.now_ms();
        let out = {
            let store = task.calibration.read().unwrap_or_else(PoisonError::into_inner);
            controller.step(now_ms, &mut task.detections, &task.sensors, store.ballistics())
        };

        task.overlay.publish(out.overlay);
        if let Some(aim) = out.aim {
            task.aim.publish(aim);
        }
        if let Some(outcome) = out.outcome {
            let event = Event::new("scope-runtime::aim", EventPayload::AimOutcome(outcome));
            if let Err(e) = task.bus.publish_to(Topic::AimEvents, event) {
                debug!(error = %e, "Aim outcome not delivered");
            }
        }
    }
    info!(state = ?controller.state(), "Aim task stopped");
}

struct CalibrationTask {
    clock: Clock,
    commands: mpsc::Receiver<EditorCommand>,
    operator: TopicReceiver,
    calibration: Arc<RwLock<CalibrationStore>>,
    bus: EventBus,
    shutdown: Arc<AtomicBool>,
}

impl CalibrationTask {
    fn command(&self, editor: &mut CalibrationEditor, command: EditorCommand) {
        let result = match command {
            EditorCommand::Begin(cell) => {
                let store = self.calibration.read().unwrap_or_else(PoisonError::into_inner);
                editor.begin(cell, &store).map(drop)
            }
            EditorCommand::Cancel => {
                editor.cancel();
                Ok(())
            }
            EditorCommand::ToggleForceAllDistances => {
                editor.toggle_force_all_distances();
                Ok(())
            }
            EditorCommand::Save => {
                let store = self.calibration.read().unwrap_or_else(PoisonError::into_inner);
                store.save()
            }
        };
        if let Err(e) = result {
            self.fault(&e);
        }
    }

    fn wheel(&self, editor: &mut CalibrationEditor, ui: UiEvent) {
        let mut store = self.calibration.write().unwrap_or_else(PoisonError::into_inner);
        match editor.handle(ui, self.clock.now_ms(), &mut store) {
            Ok(outcome) => debug!(?ui, ?outcome, "Calibration input"),
            Err(e) => {
                drop(store);
                self.fault(&e);
            }
        }
    }

    fn fault(&self, e: &CalibrationError) {
        error!(error = %e, "Calibration fault");
        let event = Event::new(
            "scope-runtime::calibration",
            EventPayload::CalibrationFault { message: e.to_string() },
        );
        if let Err(e) = self.bus.publish_to(Topic::SystemAlerts, event) {
            debug!(error = %e, "Calibration fault not delivered");
        }
    }
}

async fn calibration_task(mut task: CalibrationTask) {
    let mut editor = CalibrationEditor::new();
    let mut next_poll = Instant::now() + SHUTDOWN_POLL;
    while !task.shutdown.load(Ordering::Relaxed) {
        tokio::select! {
            command = task.commands.recv() => match command {
                Some(command) => task.command(&mut editor, command),
                None => break,
            },
            event = task.operator.recv() => match event {
                Ok(Event { payload: EventPayload::Ui(ui), .. }) => task.wheel(&mut editor, ui),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(lagged_by = n, "Calibration task lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::time::sleep_until(next_poll) => {
                next_poll = Instant::now() + SHUTDOWN_POLL;
            }
        }
    }
    info!("Calibration task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use scope_calibration::{CalibrationKind, CalibrationTable};
    use scope_protocol::radar::{SIDE_INFO, SPHERICAL_POINTS, encode_point_cloud};
    use scope_protocol::{FramerConfig, RadarDetection, TlvRecord, encode_frame, encode_sensor_frame};
    use scope_types::{AimState, SphericalPoint};
    use std::error::Error;

    fn runtime(dir: &std::path::Path) -> (ScopeRuntime, EventBus, Arc<AtomicBool>) {
        let bus = EventBus::default();
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut table = CalibrationTable::default();
        table.drop[2] = 12;
        let store = CalibrationStore::with_table(dir.join("calibration.dat"), table);
        let rt = ScopeRuntime::new(Clock::start(), bus.clone(), Arc::clone(&shutdown), store)
            .with_periods(TaskPeriods {
                radar: Duration::from_millis(5),
                imu: Duration::from_millis(1),
                aim: Duration::from_millis(2),
            });
        (rt, bus, shutdown)
    }

    fn radar_frame(n: u32, range: f32) -> Result<TlvFrame, Box<dyn Error>> {
        let detections: Vec<RadarDetection> = (0..10)
            .map(|_| RadarDetection {
                point: SphericalPoint { range, azimuth: 0.0, elevation: 0.0, velocity: 0.0 },
                snr: 10,
                noise: 1,
            })
            .collect();
        let (points, side) = encode_point_cloud(&detections);
        let bytes = encode_frame(
            n,
            0,
            &[
                TlvRecord { record_type: SPHERICAL_POINTS, payload: &points },
                TlvRecord { record_type: SIDE_INFO, payload: &side },
            ],
        );
        Ok(TlvFrame::from_bytes(&bytes, FramerConfig::radar().max_frame_len)?)
    }

    fn sensor_frame(n: u32, message: &SensorMessage) -> Result<TlvFrame, Box<dyn Error>> {
        let bytes = encode_sensor_frame(n, n, message);
        Ok(TlvFrame::from_bytes(&bytes, FramerConfig::sensor_board().max_frame_len)?)
    }

    async fn stop(shutdown: &AtomicBool, tasks: Vec<JoinHandle<()>>) -> Result<(), Box<dyn Error>> {
        shutdown.store(true, Ordering::Relaxed);
        for task in tasks {
            tokio::time::timeout(Duration::from_secs(1), task).await??;
        }
        Ok(())
    }

    #[tokio::test]
    async fn radar_frames_reach_distance_and_health() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let (rt, _bus, shutdown) = runtime(dir.path());
        let health = rt.radar_health();
        let Started { handles, mut radar_ingest, tasks, .. } = rt.start();

        for n in 0..5 {
            assert!(radar_ingest.handle(radar_frame(n, 18.0)?).is_continue());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let distance = handles.distance.peek().ok_or("no distance published")?;
        assert!((distance - 18.0).abs() < 1e-3, "distance was {distance}");
        assert_eq!(health.history().total_frames, 5);
        assert_eq!(health.history().total_points, 50);

        // The aim task runs too and keeps publishing a seeking overlay.
        let overlay = handles.overlay.peek().ok_or("no overlay published")?;
        assert_eq!(overlay.state, AimState::Lock);
        stop(&shutdown, tasks).await
    }

    #[tokio::test]
    async fn frames_without_points_do_not_count_as_health() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let (rt, _bus, shutdown) = runtime(dir.path());
        let health = rt.radar_health();
        let Started { handles, mut radar_ingest, tasks, .. } = rt.start();

        let payload = [0u8; 4];
        for n in 0..10 {
            // Either no point cloud at all, or a point cloud missing its side info.
            let record_type = if n % 2 == 0 { 1010 } else { SPHERICAL_POINTS };
            let bytes = encode_frame(n, 0, &[TlvRecord { record_type, payload: &payload }]);
            let frame = TlvFrame::from_bytes(&bytes, FramerConfig::radar().max_frame_len)?;
            assert!(radar_ingest.handle(frame).is_continue());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(health.history().total_frames, 0);
        assert!(handles.distance.peek().is_none());
        stop(&shutdown, tasks).await
    }

    #[tokio::test]
    async fn wheel_events_edit_calibration_and_save() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let (rt, bus, shutdown) = runtime(dir.path());
        let calibration = rt.calibration();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let Started { handles, mut sensor_ingest, tasks, .. } = rt.start();

        handles.editor.send(EditorCommand::Begin(CalibrationCell::drop(2))).await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        for (n, ui) in [UiEvent::RotaryRight, UiEvent::RotaryRight, UiEvent::RotaryButton]
            .into_iter()
            .enumerate()
        {
            sensor_ingest.handle(sensor_frame(n as u32, &SensorMessage::Ui(ui))?);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handles.editor.send(EditorCommand::Save).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let store = calibration.read().unwrap_or_else(PoisonError::into_inner);
            assert_eq!(store.get(CalibrationKind::Drop, 2, 0)?, 14);
            assert_eq!(store.ballistics().drop(20.0), 14.0);
        }
        let saved = CalibrationStore::open(dir.path().join("calibration.dat"))?;
        assert_eq!(saved.get(CalibrationKind::Drop, 2, 0)?, 14);
        assert!(alerts.try_next().is_none(), "no calibration fault expected");
        stop(&shutdown, tasks).await
    }

    #[tokio::test]
    async fn imu_samples_update_orientation() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let (rt, _bus, shutdown) = runtime(dir.path());
        let gyro = rt.gyro();
        let Started { handles, mut sensor_ingest, tasks, .. } = rt.start();

        let sample = ImuSample {
            a_x: 0.0,
            a_y: 0.0,
            a_z: 9.81,
            r_p: 0.0,
            r_r: 0.0,
            r_y: 0.0,
            cpu_cycles: 0,
        };
        for n in 0..10 {
            sensor_ingest.handle(sensor_frame(n, &SensorMessage::Imu(sample))?);
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let orientation = handles.orientation.peek().ok_or("no orientation published")?;
        assert_eq!(orientation.pitch, 0.0);
        assert_eq!(orientation.roll, 0.0);
        assert_eq!(gyro.rotation_mean_and_variance(), RotationAnalysis::default());
        stop(&shutdown, tasks).await
    }

    #[tokio::test]
    async fn save_failure_raises_calibration_fault() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        // A directory where the file should be makes the write fail.
        let path = dir.path().join("taken");
        std::fs::create_dir(&path)?;
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let shutdown = Arc::new(AtomicBool::new(false));
        let store = CalibrationStore::with_table(&path, CalibrationTable::default());
        let Started { handles, tasks, .. } =
            ScopeRuntime::new(Clock::start(), bus, Arc::clone(&shutdown), store).start();

        handles.editor.send(EditorCommand::Save).await?;
        let event = tokio::time::timeout(Duration::from_secs(1), alerts.recv()).await??;
        assert!(matches!(event.payload, EventPayload::CalibrationFault { .. }));
        stop(&shutdown, tasks).await
    }
}
