//! Simulated bus
//!
//! A [`BusChannel`] that behaves like a half-duplex line with a cooperative
//! boiler attached: every written frame is echoed, QUR is answered with ANS
//! and SET with ACK. Written values are remembered and returned by later
//! queries. Selected by the port name `TEST`.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::fields::{FieldType, Value};
use crate::messages::MessageRegistry;
use crate::protocol::{BusChannel, Command, ProtocolError, Telegram, TelegramBuilder, MIN_FRAME_LEN, SOF};

/// Port name selecting the simulator
pub const TEST_PORT: &str = "TEST";

struct SimState {
    registry: Arc<MessageRegistry>,
    /// Wire bytes waiting to be read
    rx: VecDeque<u8>,
    /// Un-inverted bytes of a frame being written
    tx: Vec<u8>,
    values: HashMap<u32, Option<Value>>,
    written: Vec<(Command, u32)>,
    silent: bool,
}

impl SimState {
    fn push_wire(&mut self, wire: &[u8]) {
        self.rx.extend(wire.iter().copied());
    }

    fn write_byte(&mut self, byte: u8) {
        let byte = byte ^ 0xFF;
        if self.tx.is_empty() && byte != SOF {
            return;
        }
        self.tx.push(byte);
        if self.tx.len() < 4 {
            return;
        }
        let declared = self.tx[3] as usize;
        if declared < MIN_FRAME_LEN {
            self.tx.clear();
        } else if self.tx.len() == declared {
            let frame = std::mem::take(&mut self.tx);
            self.handle_frame(&frame);
        }
    }

    fn handle_frame(&mut self, raw: &[u8]) {
        // Half-duplex line: the sender always hears itself
        let echo: Vec<u8> = raw.iter().map(|b| b ^ 0xFF).collect();
        self.push_wire(&echo);

        let telegram = match Telegram::from_raw(raw, &self.registry) {
            Ok(telegram) => telegram,
            Err(e) => {
                debug!("Simulator ignoring frame: {}", e);
                return;
            }
        };
        self.written.push((telegram.command(), telegram.param()));

        let reply = match telegram.command() {
            Command::QUR | Command::QIN => self.answer(&telegram),
            Command::SET => {
                self.values.insert(telegram.param(), telegram.value().cloned());
                self.reply(&telegram, Command::ACK).build()
            }
            _ => return,
        };

        match reply {
            Ok(reply) if !self.silent => self.push_wire(&reply.to_wire()),
            Ok(_) => {}
            Err(e) => debug!("Simulator cannot reply to {}: {}", telegram.name(), e),
        }
    }

    fn reply(&self, request: &Telegram, command: Command) -> TelegramBuilder {
        TelegramBuilder::new(Arc::clone(request.message()))
            .command(command)
            .src(request.dst())
            .dst(request.src())
    }

    fn answer(&self, query: &Telegram) -> Result<Telegram, ProtocolError> {
        let value = match self.values.get(&query.param()) {
            Some(stored) => stored.clone(),
            None => Some(default_value(query.field_type())),
        };
        let mut answer = self.reply(query, Command::ANS).build()?;
        if let Err(e) = answer.set_value(value) {
            debug!("Simulator answering {} without data: {}", query.name(), e);
        }
        Ok(answer)
    }
}

/// Value reported for parameters nobody has written yet
fn default_value(field_type: Option<FieldType>) -> Value {
    match field_type {
        Some(FieldType::CStatus) => Value::from("disabled"),
        Some(FieldType::OpMode) => Value::from("automatic"),
        Some(FieldType::OnOff) | Some(FieldType::Enable) => Value::Bool(true),
        _ => Value::Int(42),
    }
}

/// Simulated bus transport
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    /// Bus with the built-in default values
    pub fn new(registry: Arc<MessageRegistry>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                registry,
                rx: VecDeque::new(),
                tx: Vec::new(),
                values: HashMap::new(),
                written: Vec::new(),
                silent: false,
            })),
        }
    }

    /// Handle for inspecting and driving the bus from outside
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Read for SimulatedBus {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.state.lock().rx.pop_front() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data on simulated bus")),
        }
    }
}

impl Write for SimulatedBus {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        for &byte in buf {
            state.write_byte(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BusChannel for SimulatedBus {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.state.lock().rx.len() as u32)
    }
}

/// Shared view of a [`SimulatedBus`]
#[derive(Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatorHandle {
    /// Put a telegram on the line as if another participant sent it
    pub fn inject(&self, telegram: &Telegram) {
        self.state.lock().push_wire(&telegram.to_wire());
    }

    /// Put raw wire bytes on the line
    pub fn inject_wire(&self, wire: &[u8]) {
        self.state.lock().push_wire(wire);
    }

    /// Every telegram written to the bus, as `(command, param)`
    pub fn written(&self) -> Vec<(Command, u32)> {
        self.state.lock().written.clone()
    }

    /// Queries written to the bus
    pub fn queries(&self) -> Vec<(Command, u32)> {
        self.written()
            .into_iter()
            .filter(|(cmd, _)| matches!(cmd, Command::QUR | Command::QIN))
            .collect()
    }

    /// Number of queries for one parameter
    pub fn query_count(&self, param: u32) -> usize {
        self.queries().iter().filter(|(_, p)| *p == param).count()
    }

    /// Last value written to a parameter
    pub fn value(&self, param: u32) -> Option<Option<Value>> {
        self.state.lock().values.get(&param).cloned()
    }

    /// Preset the value answered for a parameter
    pub fn set_value(&self, param: u32, value: Option<Value>) {
        self.state.lock().values.insert(param, value);
    }

    /// Echo frames but never answer
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BusDriver, DriverTiming};

    fn driver() -> (BusDriver, SimulatorHandle, Arc<MessageRegistry>) {
        let registry = Arc::new(MessageRegistry::builtin());
        let bus = SimulatedBus::new(Arc::clone(&registry));
        let handle = bus.handle();
        let driver = BusDriver::new(Box::new(bus), Arc::clone(&registry), DriverTiming::immediate());
        (driver, handle, registry)
    }

    #[test]
    fn test_query_is_echoed_and_answered() {
        let (mut driver, handle, registry) = driver();
        let query = TelegramBuilder::new(registry.by_name("hc1_mode").unwrap()).build().unwrap();
        driver.send(&query).unwrap();

        let answer = driver.receive(true).unwrap().unwrap();
        assert_eq!(answer.command(), Command::ANS);
        assert_eq!(answer.src(), 0x00);
        assert_eq!(answer.dst(), 0x42);
        assert_eq!(answer.value(), Some(&Value::from("disabled")));
        assert_eq!(handle.queries(), vec![(Command::QUR, 0x053d07a3)]);
    }

    #[test]
    fn test_set_is_remembered() {
        let (mut driver, handle, registry) = driver();
        let msg = registry.by_name("hc1_operating_mode").unwrap();
        let mut set = TelegramBuilder::new(Arc::clone(&msg)).command(Command::SET).build().unwrap();
        set.set_value(Some(Value::from("reduced"))).unwrap();
        driver.send(&set).unwrap();

        let ack = driver.receive(true).unwrap().unwrap();
        assert_eq!(ack.command(), Command::ACK);
        assert_eq!(handle.value(msg.param), Some(Some(Value::from("reduced"))));

        driver.send(&TelegramBuilder::new(msg).build().unwrap()).unwrap();
        let answer = driver.receive(true).unwrap().unwrap();
        assert_eq!(answer.value(), Some(&Value::from("reduced")));
    }

    #[test]
    fn test_untyped_answer_has_no_data() {
        let (mut driver, _handle, registry) = driver();
        driver
            .send(&TelegramBuilder::new(registry.by_name("identify").unwrap()).build().unwrap())
            .unwrap();
        let answer = driver.receive(true).unwrap().unwrap();
        assert!(answer.raw_payload().is_empty());
        assert_eq!(answer.value(), None);
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_value(Some(FieldType::OpMode)), Value::from("automatic"));
        assert_eq!(default_value(Some(FieldType::Enable)), Value::Bool(true));
        assert_eq!(default_value(Some(FieldType::Temp)), Value::Int(42));
        assert_eq!(default_value(None), Value::Int(42));
    }
}
