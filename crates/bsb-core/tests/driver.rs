use bsb_core::messages::MessageRegistry;
use bsb_core::protocol::{
    BusChannel, BusDriver, Command, DriverTiming, ProtocolError, Telegram, TelegramBuilder,
};
use bsb_core::fields::Value;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    recv_buffer: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    /// Echo the written frame back on this write (1-based)
    echo_on_write: Option<usize>,
    /// Wire bytes delivered before the echo
    before_echo: Vec<u8>,
}

/// Mock serial line for testing
#[derive(Clone, Default)]
struct MockSerial {
    state: Arc<Mutex<MockState>>,
}

impl MockSerial {
    fn new() -> Self {
        Self::default()
    }

    fn with_response(response: &[u8]) -> Self {
        let mock = Self::new();
        mock.push(response);
        mock
    }

    fn push(&self, bytes: &[u8]) {
        self.state.lock().unwrap().recv_buffer.extend(bytes.iter().copied());
    }

    fn echo_on_write(&self, n: usize) {
        self.state.lock().unwrap().echo_on_write = Some(n);
    }

    fn before_echo(&self, bytes: &[u8]) {
        self.state.lock().unwrap().before_echo = bytes.to_vec();
    }

    fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.state.lock().unwrap().recv_buffer.pop_front() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "EOF")),
        }
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(buf.to_vec());
        if state.echo_on_write == Some(state.writes.len()) {
            let before = state.before_echo.clone();
            state.recv_buffer.extend(before);
            state.recv_buffer.extend(buf.iter().copied());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BusChannel for MockSerial {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.state.lock().unwrap().recv_buffer.len() as u32)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn registry() -> Arc<MessageRegistry> {
    Arc::new(MessageRegistry::builtin())
}

fn driver(mock: &MockSerial, registry: &Arc<MessageRegistry>) -> BusDriver {
    BusDriver::new(Box::new(mock.clone()), Arc::clone(registry), DriverTiming::immediate())
}

fn answer(registry: &MessageRegistry, name: &str, payload: &[u8]) -> Telegram {
    TelegramBuilder::new(registry.by_name(name).unwrap())
        .command(Command::ANS)
        .src(0x00)
        .dst(0x42)
        .payload(payload)
        .build()
        .unwrap()
}

#[test]
fn test_receive_single_frame() {
    let registry = registry();
    let sent = answer(&registry, "boiler_temp", &[0x00, 0x0A, 0xA0]);
    let mock = MockSerial::with_response(&sent.to_wire());
    let mut driver = driver(&mock, &registry);

    let received = driver.receive(false).unwrap().expect("one telegram");
    assert_eq!(received.to_raw(), sent.to_raw());
    assert_eq!(received.value(), Some(&Value::Float(42.5)));
    assert!(driver.receive(false).unwrap().is_none());
}

#[test]
fn test_resync_after_corrupted_frame() {
    init_tracing();
    let registry = registry();
    let mut corrupted = answer(&registry, "outer_temp", &[0x00, 0x01, 0x40]).to_wire();
    corrupted[10] ^= 0x04;
    let valid = answer(&registry, "boiler_temp", &[0x00, 0x0A, 0xA0]);

    let mut stream = vec![0x12, 0x34];
    stream.extend_from_slice(&corrupted);
    stream.extend_from_slice(&valid.to_wire());
    let mock = MockSerial::with_response(&stream);
    let mut driver = driver(&mock, &registry);

    let mut received = Vec::new();
    while let Some(telegram) = driver.receive(false).unwrap() {
        received.push(telegram);
    }
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].name(), "boiler_temp");
}

#[test]
fn test_short_declared_length_is_dropped() {
    let registry = registry();
    let valid = answer(&registry, "boiler_temp", &[0x00, 0x0A, 0xA0]);
    // SOF, src, dst and a length below the minimum frame size
    let junk: Vec<u8> = [0xDC, 0x80, 0x42, 0x05].iter().map(|b| b ^ 0xFF).collect();

    let mut stream = junk;
    stream.extend_from_slice(&valid.to_wire());
    let mock = MockSerial::with_response(&stream);
    let mut driver = driver(&mock, &registry);

    let received = driver.receive(false).unwrap().unwrap();
    assert_eq!(received.name(), "boiler_temp");
}

#[test]
fn test_partial_frame_times_out() {
    let registry = registry();
    let valid = answer(&registry, "boiler_temp", &[0x00, 0x0A, 0xA0]).to_wire();
    let mock = MockSerial::with_response(&valid[..6]);
    let mut driver = driver(&mock, &registry);

    assert!(driver.receive(true).unwrap().is_none());

    // The stale partial frame is gone, a fresh frame decodes cleanly
    mock.push(&valid);
    assert_eq!(driver.receive(true).unwrap().unwrap().name(), "boiler_temp");
}

#[test]
fn test_echo_on_third_attempt() {
    let registry = registry();
    let mock = MockSerial::new();
    mock.echo_on_write(3);
    let mut driver = driver(&mock, &registry);

    let query = TelegramBuilder::new(registry.by_name("boiler_temp").unwrap()).build().unwrap();
    driver.send_with_retries(&query, 10).unwrap();

    assert_eq!(mock.write_count(), 3);
    assert_eq!(driver.out_of_order_len(), 0);
}

#[test]
fn test_echo_timeout() {
    init_tracing();
    let registry = registry();
    let mock = MockSerial::new();
    let mut driver = driver(&mock, &registry);

    let query = TelegramBuilder::new(registry.by_name("boiler_temp").unwrap()).build().unwrap();
    let result = driver.send_with_retries(&query, 4);

    assert!(matches!(result, Err(ProtocolError::EchoTimeout { attempts: 4 })));
    assert_eq!(mock.write_count(), 4);
}

#[test]
fn test_zero_retries_still_sends_once() {
    let registry = registry();
    let mock = MockSerial::new();
    let mut driver = driver(&mock, &registry);

    let query = TelegramBuilder::new(registry.by_name("boiler_temp").unwrap()).build().unwrap();
    let result = driver.send_with_retries(&query, 0);

    assert!(matches!(result, Err(ProtocolError::EchoTimeout { attempts: 1 })));
    assert_eq!(mock.write_count(), 1);

    mock.echo_on_write(2);
    driver.send_with_retries(&query, 0).unwrap();
    assert_eq!(mock.write_count(), 2);
}

#[test]
fn test_unrelated_telegrams_are_rescued() {
    let registry = registry();
    let other = answer(&registry, "outer_temp", &[0x00, 0x01, 0x40]);
    let mock = MockSerial::new();
    mock.echo_on_write(1);
    mock.before_echo(&other.to_wire());
    let mut driver = driver(&mock, &registry);

    let query = TelegramBuilder::new(registry.by_name("boiler_temp").unwrap()).build().unwrap();
    driver.send(&query).unwrap();

    assert_eq!(mock.write_count(), 1);
    assert_eq!(driver.out_of_order_len(), 1);
    let rescued = driver.receive(false).unwrap().unwrap();
    assert_eq!(rescued.to_raw(), other.to_raw());
    assert_eq!(driver.out_of_order_len(), 0);
}

#[test]
fn test_written_bytes_are_inverted() {
    let registry = registry();
    let mock = MockSerial::new();
    mock.echo_on_write(1);
    let mut driver = driver(&mock, &registry);

    let query = TelegramBuilder::new(registry.by_name("boiler_temp").unwrap()).build().unwrap();
    driver.send(&query).unwrap();

    let written = mock.state.lock().unwrap().writes[0].clone();
    assert_eq!(written[0], 0xDC ^ 0xFF);
    assert_eq!(written, query.to_wire());
}

#[test]
fn test_drain_collects_pending() {
    let registry = registry();
    let first = answer(&registry, "boiler_temp", &[0x00, 0x0A, 0xA0]);
    let second = answer(&registry, "outer_temp", &[0x00, 0x01, 0x40]);
    let mut stream = first.to_wire();
    stream.extend(second.to_wire());
    let mock = MockSerial::with_response(&stream);
    let mut driver = driver(&mock, &registry);

    let names: Vec<String> = driver
        .drain()
        .unwrap()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(names, vec!["boiler_temp", "outer_temp"]);
}
