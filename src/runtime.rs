//! Threaded driver for a [`MonitorSession`].
//!
//! The session is moved onto a dedicated worker thread that owns it
//! exclusively. Callers talk to it through a bounded control channel; each
//! request carries a reply sender. The worker multiplexes four sources with
//! `select!`:
//!
//! - control requests from the handle
//! - the poll timer (armed only while the session is active)
//! - completed fetches from the fetch worker
//! - the signal timer (armed only while the local signal is running)
//!
//! Fetches run on a second thread so a slow upstream never blocks control
//! requests. At most one fetch is outstanding per session (see
//! [`MonitorSession::begin_poll`]); timer ticks that find a fetch outstanding
//! are dropped, never queued.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, select, tick, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::config::{AlertChannelConfig, MonitorConfig};
use crate::error::{FetchError, MonitorResult, RuntimeError};
use crate::poll::ResultSet;
use crate::session::{ControlOutcome, MonitorSession, PollTicket, SessionSnapshot};
use crate::transport::TripSource;
use crate::trip::{Trip, TripId, TripQuery, VehicleTypeFilter};

const CONTROL_PATH: &str = "monitor_control";
const REPLY_PATH: &str = "monitor_reply";

#[derive(Debug)]
enum ControlMsg {
    Start {
        reply: Sender<MonitorResult<ControlOutcome>>,
    },
    Stop {
        reply: Sender<ControlOutcome>,
    },
    ToggleWatch {
        id: TripId,
        reply: Sender<SessionSnapshot>,
    },
    SetFilter {
        filter: VehicleTypeFilter,
        reply: Sender<SessionSnapshot>,
    },
    SetQuery {
        query: TripQuery,
        reply: Sender<SessionSnapshot>,
    },
    SetChannels {
        channels: AlertChannelConfig,
        reply: Sender<SessionSnapshot>,
    },
    Refresh {
        reply: Sender<MonitorResult<SessionSnapshot>>,
    },
    Snapshot {
        reply: Sender<SessionSnapshot>,
    },
    Listing {
        reply: Sender<ResultSet>,
    },
}

#[derive(Debug)]
struct FetchJob {
    ticket: PollTicket,
}

#[derive(Debug)]
struct FetchDone {
    ticket: PollTicket,
    result: Result<Vec<Trip>, FetchError>,
}

/// Handle to a session running on its own worker thread.
///
/// Dropping the runtime stops the session and joins the worker.
#[derive(Debug)]
pub struct MonitorRuntime {
    control_tx: Sender<ControlMsg>,
    capacity: usize,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorRuntime {
    /// Moves `session` onto a new worker thread.
    ///
    /// # Errors
    ///
    /// `RuntimeError::Spawn` if a thread cannot be created.
    pub fn spawn(session: MonitorSession) -> MonitorResult<Self> {
        let config = session.config().clone();
        let capacity = config.control_queue_capacity.max(1);
        let (control_tx, control_rx) = bounded::<ControlMsg>(capacity);

        // One fetch running plus one stale job queued behind it.
        let (job_tx, job_rx) = bounded::<FetchJob>(1);
        let (done_tx, done_rx) = bounded::<FetchDone>(2);

        // Detached: it exits once the worker drops `job_tx`.
        spawn_named("ferrywatch-fetch", {
            let source = session.source();
            move || fetch_loop(source.as_ref(), &job_rx, &done_tx)
        })?;

        let id = session.id();
        let join = spawn_named("ferrywatch-monitor", move || {
            worker_loop(session, &config, &control_rx, &job_tx, &done_rx);
        })?;
        info!(session = %id, "monitor runtime started");

        Ok(Self {
            control_tx,
            capacity,
            join: Mutex::new(Some(join)),
        })
    }

    /// See [`MonitorSession::start`].
    ///
    /// # Errors
    ///
    /// The session's configuration errors, or a `RuntimeError`.
    pub fn start(&self) -> MonitorResult<ControlOutcome> {
        self.request(|reply| ControlMsg::Start { reply })?
    }

    /// See [`MonitorSession::stop`].
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the worker is gone or busy.
    pub fn stop(&self) -> MonitorResult<ControlOutcome> {
        self.request(|reply| ControlMsg::Stop { reply })
    }

    /// See [`MonitorSession::toggle_watch`].
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the worker is gone or busy.
    pub fn toggle_watch(&self, id: TripId) -> MonitorResult<SessionSnapshot> {
        self.request(|reply| ControlMsg::ToggleWatch { id, reply })
    }

    /// See [`MonitorSession::set_vehicle_type_filter`].
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the worker is gone or busy.
    pub fn set_vehicle_type_filter(&self, filter: VehicleTypeFilter) -> MonitorResult<SessionSnapshot> {
        self.request(|reply| ControlMsg::SetFilter { filter, reply })
    }

    /// See [`MonitorSession::set_query`].
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the worker is gone or busy.
    pub fn set_query(&self, query: TripQuery) -> MonitorResult<SessionSnapshot> {
        self.request(|reply| ControlMsg::SetQuery { query, reply })
    }

    /// See [`MonitorSession::set_channels`].
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the worker is gone or busy.
    pub fn set_channels(&self, channels: AlertChannelConfig) -> MonitorResult<SessionSnapshot> {
        self.request(|reply| ControlMsg::SetChannels { channels, reply })
    }

    /// See [`MonitorSession::refresh`]. Runs on the worker thread.
    ///
    /// # Errors
    ///
    /// The fetch error, or a `RuntimeError`.
    pub fn refresh(&self) -> MonitorResult<SessionSnapshot> {
        self.request(|reply| ControlMsg::Refresh { reply })?
    }

    /// # Errors
    ///
    /// `RuntimeError` if the worker is gone or busy.
    pub fn snapshot(&self) -> MonitorResult<SessionSnapshot> {
        self.request(|reply| ControlMsg::Snapshot { reply })
    }

    /// Copy of the current listing.
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the worker is gone or busy.
    pub fn result_set(&self) -> MonitorResult<ResultSet> {
        self.request(|reply| ControlMsg::Listing { reply })
    }

    /// Stops the session and joins the worker.
    pub fn shutdown(self) {
        drop(self);
    }

    fn request<T>(&self, build: impl FnOnce(Sender<T>) -> ControlMsg) -> MonitorResult<T> {
        let (reply_tx, reply_rx) = bounded::<T>(1);
        match self.control_tx.try_send(build(reply_tx)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(RuntimeError::QueueFull {
                    capacity: self.capacity,
                }
                .into())
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(RuntimeError::Disconnected {
                    path: CONTROL_PATH.to_string(),
                }
                .into())
            }
        }
        reply_rx.recv().map_err(|_| {
            RuntimeError::Disconnected {
                path: REPLY_PATH.to_string(),
            }
            .into()
        })
    }
}

impl Drop for MonitorRuntime {
    fn drop(&mut self) {
        // Closing the control channel ends the worker loop.
        let (dummy_tx, _) = bounded::<ControlMsg>(1);
        drop(std::mem::replace(&mut self.control_tx, dummy_tx));

        let handle = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("monitor worker panicked");
            }
        }
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<JoinHandle<()>, RuntimeError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| RuntimeError::Spawn {
            name: name.to_string(),
            message: e.to_string(),
        })
}

fn fetch_loop(source: &dyn TripSource, jobs: &Receiver<FetchJob>, done: &Sender<FetchDone>) {
    while let Ok(FetchJob { ticket }) = jobs.recv() {
        // A panicking source fails this poll only.
        let result = panic::catch_unwind(AssertUnwindSafe(|| source.fetch(ticket.query())))
            .unwrap_or_else(|payload| {
                let reason = panic_message(payload.as_ref());
                warn!(reason = %reason, "trip source panicked");
                Err(FetchError::transport(format!("trip source panicked: {reason}")))
            });
        if done.send(FetchDone { ticket, result }).is_err() {
            break;
        }
    }
    debug!("fetch worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Timer receivers; `None` means disarmed.
#[derive(Default)]
struct Timers {
    poll: Option<Receiver<Instant>>,
    signal: Option<Receiver<Instant>>,
}

impl Timers {
    /// Arms or disarms each timer to match the session state.
    fn sync(&mut self, session: &MonitorSession, config: &MonitorConfig) {
        sync_timer(&mut self.poll, session.is_active(), config.poll_interval);
        sync_timer(&mut self.signal, session.signal_active(), config.signal_interval);
    }
}

fn sync_timer(timer: &mut Option<Receiver<Instant>>, armed: bool, every: Duration) {
    match (armed, timer.is_some()) {
        (true, false) => *timer = Some(tick(every)),
        (false, true) => *timer = None,
        _ => {}
    }
}

fn worker_loop(
    mut session: MonitorSession,
    config: &MonitorConfig,
    control_rx: &Receiver<ControlMsg>,
    job_tx: &Sender<FetchJob>,
    done_rx: &Receiver<FetchDone>,
) {
    let mut timers = Timers::default();
    let mut fetch_closed = false;

    loop {
        let poll_rx = timers.poll.clone().unwrap_or_else(never);
        let signal_rx = timers.signal.clone().unwrap_or_else(never);
        // Closed for good; stop selecting on it.
        let fetched_rx = if fetch_closed { never() } else { done_rx.clone() };

        select! {
            recv(control_rx) -> msg => {
                let Ok(msg) = msg else { break };
                handle_control(&mut session, msg);
            }
            recv(poll_rx) -> _ => {
                dispatch_poll(&mut session, job_tx);
            }
            recv(fetched_rx) -> done => match done {
                Ok(FetchDone { ticket, result }) => {
                    session.complete_poll(&ticket, result);
                }
                Err(_) => {
                    fetch_closed = true;
                    session.halt("fetch worker exited");
                }
            },
            recv(signal_rx) -> _ => {
                session.signal_tick();
            }
        }

        timers.sync(&session, config);
    }

    session.stop();
    info!(session = %session.id(), "monitor runtime stopped");
}

fn handle_control(session: &mut MonitorSession, msg: ControlMsg) {
    // A caller that gave up on its reply is not an error.
    match msg {
        ControlMsg::Start { reply } => {
            let _ = reply.send(session.start());
        }
        ControlMsg::Stop { reply } => {
            let _ = reply.send(session.stop());
        }
        ControlMsg::ToggleWatch { id, reply } => {
            let _ = reply.send(session.toggle_watch(id));
        }
        ControlMsg::SetFilter { filter, reply } => {
            let _ = reply.send(session.set_vehicle_type_filter(filter));
        }
        ControlMsg::SetQuery { query, reply } => {
            let _ = reply.send(session.set_query(query));
        }
        ControlMsg::SetChannels { channels, reply } => {
            let _ = reply.send(session.set_channels(channels));
        }
        ControlMsg::Refresh { reply } => {
            let _ = reply.send(session.refresh());
        }
        ControlMsg::Snapshot { reply } => {
            let _ = reply.send(session.snapshot());
        }
        ControlMsg::Listing { reply } => {
            let _ = reply.send(session.result_set().clone());
        }
    }
}

fn dispatch_poll(session: &mut MonitorSession, job_tx: &Sender<FetchJob>) {
    let Some(ticket) = session.begin_poll() else {
        return;
    };
    match job_tx.try_send(FetchJob { ticket }) {
        Ok(()) => {}
        Err(TrySendError::Full(job) | TrySendError::Disconnected(job)) => {
            warn!(session = %session.id(), "fetch worker unavailable; skipping poll");
            session.abandon_poll(&job.ticket);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::session::{SessionState, Transition};
    use crate::transport::{RecordingSignal, ScriptedTripSource};
    use crate::trip::{Capacities, Direction};

    fn fast() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(20),
            signal_interval: Duration::from_millis(10),
            alert_cooldown: Duration::from_secs(600),
            control_queue_capacity: 8,
        }
    }

    fn query() -> TripQuery {
        TripQuery::new(NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(), Direction::HeltermaaRohukula)
    }

    fn trip(car: u32) -> Trip {
        Trip::from_timestamps("2026-01-07T10:00:00+02:00", "2026-01-07T10:30:00+02:00", Capacities::new(car, 0, 0))
            .unwrap()
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[derive(Debug, Default)]
    struct SlowSource {
        calls: AtomicUsize,
    }

    impl TripSource for SlowSource {
        fn fetch(&self, _query: &TripQuery) -> Result<Vec<Trip>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            Ok(vec![trip(0)])
        }
    }

    /// Panics on its second fetch only.
    #[derive(Debug, Default)]
    struct FlakySource {
        calls: AtomicUsize,
    }

    impl TripSource for FlakySource {
        fn fetch(&self, _query: &TripQuery) -> Result<Vec<Trip>, FetchError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                panic!("listing parser blew up");
            }
            Ok(vec![trip(0)])
        }
    }

    #[test]
    fn panicking_source_fails_one_poll_and_polling_continues() {
        let source = Arc::new(FlakySource::default());
        let session = MonitorSession::builder(source.clone(), query()).config(fast()).build();
        let rt = MonitorRuntime::spawn(session).unwrap();

        rt.toggle_watch(trip(0).id).unwrap();
        rt.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || source.calls.load(Ordering::SeqCst) >= 5));

        let snap = rt.snapshot().unwrap();
        assert_eq!(snap.state, SessionState::Active);
        assert!(snap.status.starts_with("Monitoring 1 ferries"), "{}", snap.status);
    }

    #[test]
    fn lost_fetch_worker_halts_the_session() {
        let source = Arc::new(ScriptedTripSource::new());
        let mut session = MonitorSession::builder(source, query()).config(fast()).build();
        session.toggle_watch(trip(0).id);
        session.start().unwrap();

        let (control_tx, control_rx) = bounded::<ControlMsg>(4);
        let (job_tx, _job_rx) = bounded::<FetchJob>(1);
        let (done_tx, done_rx) = bounded::<FetchDone>(2);
        drop(done_tx);
        let config = fast();
        let worker = thread::spawn(move || worker_loop(session, &config, &control_rx, &job_tx, &done_rx));

        let snapshot = || {
            let (reply_tx, reply_rx) = bounded(1);
            control_tx.send(ControlMsg::Snapshot { reply: reply_tx }).unwrap();
            reply_rx.recv_timeout(Duration::from_secs(2)).unwrap()
        };
        assert!(wait_until(Duration::from_secs(2), || snapshot().state == SessionState::Idle));
        assert_eq!(snapshot().status, "Error refreshing: fetch worker exited");

        drop(control_tx);
        worker.join().unwrap();
    }

    #[test]
    fn polls_repeatedly_until_stopped() {
        let source = Arc::new(ScriptedTripSource::new());
        source.push_trips(vec![trip(0)]);
        let session = MonitorSession::builder(source.clone(), query()).config(fast()).build();
        let rt = MonitorRuntime::spawn(session).unwrap();

        rt.toggle_watch(trip(0).id).unwrap();
        let out = rt.start().unwrap();
        assert_eq!(out.transition, Transition::Started);
        assert!(wait_until(Duration::from_secs(2), || source.calls() >= 4));

        let out = rt.stop().unwrap();
        assert_eq!(out.snapshot.state, SessionState::Idle);
        let at_stop = source.calls();
        thread::sleep(Duration::from_millis(100));
        assert!(source.calls() <= at_stop + 1);
    }

    #[test]
    fn start_without_watches_is_rejected() {
        let session = MonitorSession::builder(Arc::new(ScriptedTripSource::new()), query()).config(fast()).build();
        let rt = MonitorRuntime::spawn(session).unwrap();
        assert!(rt.start().unwrap_err().is_config());
        assert_eq!(rt.snapshot().unwrap().state, SessionState::Idle);
    }

    #[test]
    fn signal_repeats_while_matches_persist() {
        let source = Arc::new(ScriptedTripSource::new());
        source.push_trips(vec![trip(3)]);
        let signal = Arc::new(RecordingSignal::new());
        let session = MonitorSession::builder(source, query())
            .config(fast())
            .signal(signal.clone())
            .build();
        let rt = MonitorRuntime::spawn(session).unwrap();

        rt.toggle_watch(trip(0).id).unwrap();
        assert!(rt.start().unwrap().snapshot.signal_active);
        assert!(wait_until(Duration::from_secs(2), || signal.count() >= 3));

        let out = rt.stop().unwrap();
        assert!(!out.snapshot.signal_active);
        let at_stop = signal.count();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(signal.count(), at_stop);
    }

    #[test]
    fn fetch_failure_stops_running_signal() {
        let source = Arc::new(ScriptedTripSource::new());
        source.push_trips(vec![trip(3)]);
        source.push_error(FetchError::transport("connection reset"));
        source.push_trips(vec![trip(0)]);
        let session = MonitorSession::builder(source.clone(), query()).config(fast()).build();
        let rt = MonitorRuntime::spawn(session).unwrap();

        rt.toggle_watch(trip(0).id).unwrap();
        assert!(rt.start().unwrap().snapshot.signal_active);
        assert!(wait_until(Duration::from_secs(2), || source.calls() >= 3));
        assert!(!rt.snapshot().unwrap().signal_active);
    }

    #[test]
    fn slow_fetches_are_never_overlapped() {
        let source = Arc::new(SlowSource::default());
        let session = MonitorSession::builder(source.clone(), query())
            .config(MonitorConfig {
                poll_interval: Duration::from_millis(10),
                ..fast()
            })
            .build();
        let rt = MonitorRuntime::spawn(session).unwrap();

        rt.toggle_watch(trip(0).id).unwrap();
        rt.start().unwrap();
        thread::sleep(Duration::from_millis(350));
        rt.shutdown();

        // One synchronous fetch on start, then back-to-back 100ms fetches.
        assert!(source.calls.load(Ordering::SeqCst) <= 5);
    }

    #[test]
    fn control_requests_answer_while_fetch_is_slow() {
        let source = Arc::new(SlowSource::default());
        let session = MonitorSession::builder(source, query()).config(fast()).build();
        let rt = MonitorRuntime::spawn(session).unwrap();
        rt.toggle_watch(trip(0).id).unwrap();
        rt.start().unwrap();

        thread::sleep(Duration::from_millis(30));
        let began = Instant::now();
        let snap = rt.snapshot().unwrap();
        assert!(began.elapsed() < Duration::from_millis(90));
        assert_eq!(snap.watch_count, 1);
    }

    #[test]
    fn listing_and_settings_round_trip_through_worker() {
        let source = Arc::new(ScriptedTripSource::new());
        source.push_trips(vec![trip(1)]);
        let session = MonitorSession::builder(source, query()).config(fast()).build();
        let rt = MonitorRuntime::spawn(session).unwrap();

        assert_eq!(rt.refresh().unwrap().trip_count, 1);
        assert_eq!(rt.result_set().unwrap().trips, vec![trip(1)]);
        rt.set_vehicle_type_filter(VehicleTypeFilter::BUS).unwrap();
        rt.set_channels(AlertChannelConfig::default()).unwrap();
        let snap = rt.set_query(query()).unwrap();
        assert_eq!(snap.state, SessionState::Idle);
    }
}
