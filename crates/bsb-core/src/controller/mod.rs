//! Bus controller
//!
//! Owns the bus through a single monitor thread and exposes a blocking,
//! thread-safe request API on top of it.
//!
//! ```text
//! caller ──get/set──▶ request channel ──▶ monitor thread ──▶ BusDriver
//!   ▲                                          │
//!   └────────── per-request reply ◀────────────┤
//!                                              ▼
//!                    dispatcher thread ──▶ callbacks / loggers
//! ```
//!
//! Value callbacks receive `(name, value)` for every answered request, every
//! refresh poll and every SET observed on the bus that was acknowledged
//! within the pending-set TTL. Loggers receive every telegram the monitor
//! sends or receives.

mod clock;
mod dispatch;
mod error;
mod monitor;
mod request;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ControllerError;
pub use request::RequestOptions;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::fields::Value;
use crate::messages::{Message, MessageRegistry};
use crate::protocol::{BusDriver, Telegram};
use monitor::{Monitor, MonitorParts};
use request::{Request, RequestKind, Schedule};

/// Receives `(name, value)` of changed or polled parameters
pub type ValueCallback = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;

/// Receives every telegram seen by the monitor
pub type TelegramLogger = Arc<dyn Fn(&Telegram) + Send + Sync>;

/// Registered callbacks, shared with the monitor thread
#[derive(Default)]
pub(crate) struct Hooks {
    pub callbacks: RwLock<Vec<ValueCallback>>,
    pub loggers: RwLock<Vec<TelegramLogger>>,
}

/// Timing knobs of the monitor loop
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerTiming {
    /// Pause between reply polls
    pub poll_interval: Duration,
    /// Reply polls before a request times out
    pub reply_attempts: u32,
    /// Pause of an idle monitor iteration
    pub idle_sleep: Duration,
    /// Age after which an unacknowledged SET is forgotten
    pub pending_set_ttl: Duration,
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            reply_attempts: 10,
            idle_sleep: Duration::from_millis(100),
            pending_set_ttl: Duration::from_secs(5),
        }
    }
}

impl ControllerTiming {
    /// No sleeping, for simulated buses
    pub fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            idle_sleep: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Handle to the bus
///
/// All methods take `&self`; share the controller between threads with an
/// `Arc`. Requests submitted before [`Controller::start`] are queued.
pub struct Controller {
    registry: Arc<MessageRegistry>,
    src: u8,
    hooks: Arc<Hooks>,
    requests: Sender<Request>,
    schedules: Sender<Schedule>,
    stop: Arc<AtomicBool>,
    idle: Mutex<Option<MonitorParts>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller sending as `src`
    pub fn new(driver: BusDriver, src: u8, timing: ControllerTiming) -> Self {
        Self::with_clock(driver, src, timing, Arc::new(SystemClock))
    }

    /// Create a controller with an explicit time source
    pub fn with_clock(driver: BusDriver, src: u8, timing: ControllerTiming, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::clone(driver.registry());
        let hooks = Arc::new(Hooks::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (requests, request_rx) = crossbeam_channel::unbounded();
        let (schedules, schedule_rx) = crossbeam_channel::unbounded();

        let parts = MonitorParts {
            driver,
            src,
            timing,
            clock,
            hooks: Arc::clone(&hooks),
            requests: request_rx,
            schedules: schedule_rx,
            stop: Arc::clone(&stop),
        };

        Self {
            registry,
            src,
            hooks,
            requests,
            schedules,
            stop,
            idle: Mutex::new(Some(parts)),
            thread: Mutex::new(None),
        }
    }

    /// Message definitions in use
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Spawn the monitor thread
    pub fn start(&self) -> Result<(), ControllerError> {
        let parts = self.idle.lock().take().ok_or(ControllerError::AlreadyStarted)?;
        let monitor = Monitor::new(parts)?;
        let handle = thread::Builder::new()
            .name("bsb-monitor".to_string())
            .spawn(move || monitor.run())
            .map_err(ControllerError::Thread)?;
        *self.thread.lock() = Some(handle);
        info!("Controller started");
        Ok(())
    }

    /// Stop the monitor thread and wait for it to exit
    ///
    /// Queued requests are dropped; their callers receive
    /// [`ControllerError::Stopped`].
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        // Never started: release the bus so queued callers wake up
        self.idle.lock().take();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("Monitor thread panicked");
            }
            info!("Controller stopped");
        }
    }

    /// Look up a message by name
    pub fn message(&self, name: &str) -> Result<Arc<Message>, ControllerError> {
        self.registry
            .by_name(name)
            .ok_or_else(|| ControllerError::UnknownMessage(name.to_string()))
    }

    /// Query a parameter, blocking until answered
    pub fn get_value(&self, name: &str) -> Result<Option<Value>, ControllerError> {
        self.get_value_with(name, RequestOptions::default())
    }

    /// Query a parameter with per-request options
    pub fn get_value_with(&self, name: &str, options: RequestOptions) -> Result<Option<Value>, ControllerError> {
        let message = self.message(name)?;
        self.submit(message, RequestKind::Get, options)
    }

    /// Write a parameter, blocking until the write went out
    pub fn set_value(&self, name: &str, value: Option<Value>) -> Result<(), ControllerError> {
        self.set_value_with(name, value, RequestOptions::default())
    }

    /// Write a parameter with per-request options
    pub fn set_value_with(
        &self,
        name: &str,
        value: Option<Value>,
        options: RequestOptions,
    ) -> Result<(), ControllerError> {
        let message = self.message(name)?;
        let kind = RequestKind::Set {
            value,
            command: options.command,
        };
        self.submit(message, kind, options).map(|_| ())
    }

    fn submit(
        &self,
        message: Arc<Message>,
        kind: RequestKind,
        options: RequestOptions,
    ) -> Result<Option<Value>, ControllerError> {
        let src = options.src.unwrap_or(self.src);
        let (request, reply) = Request::new(message, kind, src);
        self.requests.send(request).map_err(|_| ControllerError::Stopped)?;
        reply.recv().map_err(|_| ControllerError::Stopped)?
    }

    /// Replace the set of periodically polled messages
    ///
    /// `None` polls a message once. Every message is polled right away.
    pub fn set_monitored<I, S>(&self, monitored: I) -> Result<(), ControllerError>
    where
        I: IntoIterator<Item = (S, Option<Duration>)>,
        S: AsRef<str>,
    {
        let schedule = monitored
            .into_iter()
            .map(|(name, interval)| Ok((self.message(name.as_ref())?, interval)))
            .collect::<Result<Schedule, ControllerError>>()?;
        self.schedules.send(schedule).map_err(|_| ControllerError::Stopped)
    }

    /// Register a value callback
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&str, Option<&Value>) + Send + Sync + 'static,
    {
        self.hooks.callbacks.write().push(Arc::new(callback));
    }

    /// Register a telegram logger
    pub fn add_logger<F>(&self, logger: F)
    where
        F: Fn(&Telegram) + Send + Sync + 'static,
    {
        self.hooks.loggers.write().push(Arc::new(logger));
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}
