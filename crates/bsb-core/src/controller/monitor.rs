//! Monitor loop
//!
//! The only code that touches the bus. Each iteration receives and logs one
//! telegram, services all queued requests, runs due refresh polls and expires
//! stale pending SETs.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::request::{Request, RequestKind, Schedule};
use super::{Clock, ControllerError, ControllerTiming, Hooks};
use crate::fields::Value;
use crate::messages::Message;
use crate::protocol::{BusDriver, Command, Telegram, TelegramBuilder};

/// `(name, src, dst)` of a SET awaiting its ACK
type PendingKey = (String, u8, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Due {
    At(Instant),
    /// Polled once, never again until rescheduled
    Never,
}

/// Everything the monitor thread takes ownership of
pub(crate) struct MonitorParts {
    pub driver: BusDriver,
    pub src: u8,
    pub timing: ControllerTiming,
    pub clock: Arc<dyn Clock>,
    pub hooks: Arc<Hooks>,
    pub requests: Receiver<Request>,
    pub schedules: Receiver<Schedule>,
    pub stop: Arc<AtomicBool>,
}

pub(crate) struct Monitor {
    driver: BusDriver,
    src: u8,
    timing: ControllerTiming,
    clock: Arc<dyn Clock>,
    hooks: Arc<Hooks>,
    requests: Receiver<Request>,
    schedules: Receiver<Schedule>,
    stop: Arc<AtomicBool>,
    dispatcher: Dispatcher,
    schedule: Schedule,
    next_due: HashMap<u32, Due>,
    pending: HashMap<PendingKey, (Instant, Option<Value>)>,
}

impl Monitor {
    pub(crate) fn new(parts: MonitorParts) -> Result<Self, ControllerError> {
        let dispatcher = Dispatcher::spawn().map_err(ControllerError::Thread)?;
        Ok(Self {
            driver: parts.driver,
            src: parts.src,
            timing: parts.timing,
            clock: parts.clock,
            hooks: parts.hooks,
            requests: parts.requests,
            schedules: parts.schedules,
            stop: parts.stop,
            dispatcher,
            schedule: Vec::new(),
            next_due: HashMap::new(),
            pending: HashMap::new(),
        })
    }

    /// Loop until the stop flag is raised
    pub(crate) fn run(mut self) {
        debug!("Monitor started");
        while !self.stop.load(Ordering::Relaxed) {
            match panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Monitor iteration failed: {}", e),
                Err(_) => warn!("Monitor iteration panicked"),
            }
        }
        debug!("Monitor stopped");
    }

    /// One iteration of the monitor loop
    pub(crate) fn tick(&mut self) -> Result<(), ControllerError> {
        self.install_schedule();

        // A failing bus must not starve queued requests, each gets its own error
        let received = match self.receive() {
            Ok(telegram) => telegram.is_some(),
            Err(e) => {
                warn!("Receive failed: {}", e);
                false
            }
        };
        if !self.service_requests() && !received {
            thread::sleep(self.timing.idle_sleep);
        }
        self.refresh();
        self.expire_pending();
        Ok(())
    }

    fn install_schedule(&mut self) {
        while let Ok(schedule) = self.schedules.try_recv() {
            self.schedule = schedule;
            self.next_due.clear();
        }
    }

    /// Receive and log one telegram
    fn receive(&mut self) -> Result<Option<Telegram>, ControllerError> {
        let telegram = self.driver.receive(true)?;
        if let Some(telegram) = &telegram {
            self.log(telegram);
        }
        Ok(telegram)
    }

    /// Log pending input, then send with echo verification
    fn send(&mut self, telegram: &Telegram) -> Result<(), ControllerError> {
        for received in self.driver.drain()? {
            self.log(&received);
        }
        self.driver.send(telegram)?;
        self.log(telegram);
        Ok(())
    }

    /// Track SET/ACK pairs and hand the telegram to the loggers
    fn log(&mut self, telegram: &Telegram) {
        let now = self.clock.now();
        match telegram.command() {
            Command::SET => {
                let key = (telegram.name().to_string(), telegram.src(), telegram.dst());
                self.pending.insert(key, (now, telegram.value().cloned()));
            }
            Command::ACK => {
                let key = (telegram.name().to_string(), telegram.dst(), telegram.src());
                if let Some((issued, value)) = self.pending.remove(&key) {
                    if now.saturating_duration_since(issued) <= self.timing.pending_set_ttl {
                        self.notify(&key.0, value);
                    }
                }
            }
            _ => {}
        }

        let loggers = self.hooks.loggers.read().clone();
        if loggers.is_empty() {
            return;
        }
        let telegram = Arc::new(telegram.clone());
        for logger in loggers {
            let telegram = Arc::clone(&telegram);
            self.dispatcher.submit(move || logger(&telegram));
        }
    }

    fn notify(&self, name: &str, value: Option<Value>) {
        for callback in self.hooks.callbacks.read().iter() {
            let callback = Arc::clone(callback);
            let name = name.to_string();
            let value = value.clone();
            self.dispatcher.submit(move || callback(&name, value.as_ref()));
        }
    }

    fn expire_pending(&mut self) {
        let now = self.clock.now();
        let ttl = self.timing.pending_set_ttl;
        self.pending
            .retain(|_, (issued, _)| now.saturating_duration_since(*issued) <= ttl);
    }

    /// Service every queued request in submission order
    fn service_requests(&mut self) -> bool {
        let mut serviced = false;
        while let Ok(request) = self.requests.try_recv() {
            serviced = true;
            self.service(request);
        }
        serviced
    }

    fn service(&mut self, request: Request) {
        let Request {
            message,
            kind,
            src,
            reply,
        } = request;

        let result = match kind {
            RequestKind::Get => self.get(&message, src),
            RequestKind::Set { value, command } => self
                .set(&message, value.clone(), command, src)
                .map(|()| value),
        };

        match &result {
            Ok(value) => self.notify(&message.name, value.clone()),
            Err(e) => warn!("Request for {} failed: {}", message.name, e),
        }
        if reply.send(result).is_err() {
            debug!("Requester for {} went away", message.name);
        }
    }

    fn get(&mut self, message: &Arc<Message>, src: u8) -> Result<Option<Value>, ControllerError> {
        let query = TelegramBuilder::new(Arc::clone(message)).src(src).build()?;
        self.send(&query)?;

        for _ in 0..self.timing.reply_attempts {
            if let Some(reply) = self.receive()? {
                if reply.param() == message.param {
                    return Ok(reply.value().cloned());
                }
            }
            thread::sleep(self.timing.poll_interval);
        }

        error!("get_value: timeout: {}", query);
        Err(ControllerError::RequestTimeout(message.name.clone()))
    }

    fn set(
        &mut self,
        message: &Arc<Message>,
        value: Option<Value>,
        command: Command,
        src: u8,
    ) -> Result<(), ControllerError> {
        let mut telegram = TelegramBuilder::new(Arc::clone(message))
            .command(command)
            .src(src)
            .build()?;
        telegram.set_value(value)?;
        self.send(&telegram)?;

        if telegram.command() == Command::INF {
            return Ok(());
        }

        for _ in 0..self.timing.reply_attempts {
            match self.receive()? {
                Some(reply) if reply.param() == message.param => return Ok(()),
                Some(other) => info!("set_value: another telegram received: {}", other),
                None => {}
            }
            thread::sleep(self.timing.poll_interval);
        }

        // Best effort: the write went out, only the acknowledgement is missing
        error!("set_value: timeout: {}", telegram);
        Ok(())
    }

    fn refresh(&mut self) {
        let schedule = self.schedule.clone();
        for (message, interval) in schedule {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            let now = self.clock.now();
            let due = match self.next_due.get(&message.param) {
                None => true,
                Some(Due::At(at)) => now >= *at,
                Some(Due::Never) => false,
            };
            if !due {
                continue;
            }

            let next = match interval {
                Some(interval) => Due::At(now + interval),
                None => Due::Never,
            };
            self.next_due.insert(message.param, next);

            match self.get(&message, self.src) {
                Ok(value) => self.notify(&message.name, value),
                Err(e) => warn!("Refresh of {} failed: {}", message.name, e),
            }
        }
    }
}
