//! Bus driver
//!
//! Recovers telegram boundaries from the inverted byte stream and sends
//! telegrams with echo verification. The bus is half-duplex: every frame we
//! write comes back to us, and a frame that does not come back unmodified
//! collided with another participant and has to be resent.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::stream::BusChannel;
use super::telegram::Telegram;
use super::{ProtocolError, BAUD_RATE, BITS_PER_BYTE, MIN_FRAME_LEN, SOF};
use crate::messages::MessageRegistry;

/// Timing knobs of the driver
#[derive(Debug, Clone, PartialEq)]
pub struct DriverTiming {
    /// Transmission time of one character on the line
    pub byte_time: Duration,
    /// Lower bound of the random pause before a resend
    pub settle_min: Duration,
    /// Upper bound of the random pause before a resend
    pub settle_max: Duration,
    /// Send attempts before giving up, at least one is always made
    pub send_retries: u32,
    /// Consecutive empty reads tolerated while a frame is in progress
    pub read_retries: u32,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            byte_time: Duration::from_secs_f64(BITS_PER_BYTE / BAUD_RATE as f64),
            settle_min: Duration::from_millis(1500),
            settle_max: Duration::from_millis(2500),
            send_retries: 10,
            read_retries: 20,
        }
    }
}

impl DriverTiming {
    /// No sleeping at all, for simulated transports
    pub fn immediate() -> Self {
        Self {
            byte_time: Duration::ZERO,
            settle_min: Duration::ZERO,
            settle_max: Duration::ZERO,
            ..Self::default()
        }
    }

    fn settle_time(&self) -> Duration {
        if self.settle_max <= self.settle_min {
            self.settle_min
        } else {
            rand::thread_rng().gen_range(self.settle_min..=self.settle_max)
        }
    }
}

/// Framing and echo-verified sending over a [`BusChannel`]
pub struct BusDriver {
    channel: Box<dyn BusChannel>,
    registry: Arc<MessageRegistry>,
    timing: DriverTiming,
    /// Bytes of the frame currently being received
    buffer: Vec<u8>,
    /// Telegrams seen while waiting for an echo
    out_of_order: VecDeque<Telegram>,
}

impl BusDriver {
    /// Wrap a transport
    pub fn new(channel: Box<dyn BusChannel>, registry: Arc<MessageRegistry>, timing: DriverTiming) -> Self {
        Self {
            channel,
            registry,
            timing,
            buffer: Vec::new(),
            out_of_order: VecDeque::new(),
        }
    }

    /// Registry used to decode received frames
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Active timing knobs
    pub fn timing(&self) -> &DriverTiming {
        &self.timing
    }

    /// Number of telegrams waiting in the out-of-order queue
    pub fn out_of_order_len(&self) -> usize {
        self.out_of_order.len()
    }

    /// Receive the next telegram
    ///
    /// Telegrams rescued during a send are returned first. With `wait` set,
    /// a partially received frame is awaited until the read budget runs out.
    pub fn receive(&mut self, wait: bool) -> Result<Option<Telegram>, ProtocolError> {
        if let Some(telegram) = self.out_of_order.pop_front() {
            return Ok(Some(telegram));
        }
        self.receive_frame(wait)
    }

    /// Receive every telegram that is already pending on the line
    pub fn drain(&mut self) -> Result<Vec<Telegram>, ProtocolError> {
        let mut telegrams = Vec::new();
        while let Some(telegram) = self.receive(true)? {
            telegrams.push(telegram);
        }
        Ok(telegrams)
    }

    fn receive_frame(&mut self, wait: bool) -> Result<Option<Telegram>, ProtocolError> {
        let mut budget = self.timing.read_retries;

        while budget > 0 && (self.channel.bytes_to_read()? > 0 || (wait && !self.buffer.is_empty())) {
            let Some(byte) = self.channel.read_byte()? else {
                budget -= 1;
                continue;
            };
            budget = self.timing.read_retries;
            let byte = byte ^ 0xFF;

            if self.buffer.is_empty() && byte != SOF {
                continue;
            }
            self.buffer.push(byte);
            if self.buffer.len() < 4 {
                continue;
            }

            let declared = self.buffer[3] as usize;
            if declared < MIN_FRAME_LEN {
                debug!("Dropping frame with declared length {}", declared);
                self.buffer.clear();
                continue;
            }
            if self.buffer.len() < declared {
                continue;
            }

            let frame = std::mem::take(&mut self.buffer);
            match Telegram::from_raw(&frame, &self.registry) {
                Ok(telegram) => return Ok(Some(telegram)),
                Err(e @ ProtocolError::CrcMismatch { .. }) => warn!("Telegram CRC error: {}", e),
                Err(e) => warn!("Telegram error: {}, {:02x?}", e, frame),
            }
        }

        if budget == 0 {
            debug!("Receive timeout, dropping {:02x?}", self.buffer);
            self.buffer.clear();
        }
        Ok(None)
    }

    /// Send with the configured number of attempts
    pub fn send(&mut self, telegram: &Telegram) -> Result<(), ProtocolError> {
        self.send_with_retries(telegram, self.timing.send_retries)
    }

    /// Send and wait for the bus to echo the frame back unmodified
    ///
    /// Unrelated telegrams received meanwhile are queued for [`BusDriver::receive`].
    /// A `retries` of zero still makes one attempt.
    pub fn send_with_retries(&mut self, telegram: &Telegram, retries: u32) -> Result<(), ProtocolError> {
        let retries = retries.max(1);
        let raw = telegram.to_raw();
        let wire = telegram.to_wire();

        for attempt in 1..=retries {
            self.channel.write_all(&wire)?;
            self.channel.flush()?;
            thread::sleep(self.timing.byte_time * (wire.len() as u32 * 2));

            while let Some(received) = self.receive_frame(true)? {
                if received.to_raw() == raw {
                    return Ok(());
                }
                self.out_of_order.push_back(received);
            }

            if attempt < retries {
                debug!(
                    "Sent telegram not received back (attempt {}/{}), resending",
                    attempt, retries
                );
                thread::sleep(self.timing.settle_time());
            }
        }

        Err(ProtocolError::EchoTimeout { attempts: retries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let timing = DriverTiming::default();
        assert_eq!(timing.send_retries, 10);
        assert_eq!(timing.read_retries, 20);
        // 11 bits at 4800 baud
        assert!(timing.byte_time > Duration::from_micros(2290));
        assert!(timing.byte_time < Duration::from_micros(2300));
    }

    #[test]
    fn test_settle_time_range() {
        let timing = DriverTiming::default();
        for _ in 0..50 {
            let settle = timing.settle_time();
            assert!(settle >= timing.settle_min && settle <= timing.settle_max);
        }
        assert_eq!(DriverTiming::immediate().settle_time(), Duration::ZERO);
    }
}
