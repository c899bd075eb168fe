//! Caller to monitor hand-off

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::ControllerError;
use crate::fields::Value;
use crate::messages::Message;
use crate::protocol::Command;

/// Outcome delivered back to a blocked caller
pub(crate) type Reply = Result<Option<Value>, ControllerError>;

/// Monitored messages with their poll interval, `None` polls once
pub(crate) type Schedule = Vec<(Arc<Message>, Option<Duration>)>;

#[derive(Debug)]
pub(crate) enum RequestKind {
    Get,
    Set { value: Option<Value>, command: Command },
}

/// A get or set waiting for the monitor thread
#[derive(Debug)]
pub(crate) struct Request {
    pub message: Arc<Message>,
    pub kind: RequestKind,
    pub src: u8,
    pub reply: Sender<Reply>,
}

impl Request {
    /// Create a request and the receiving end of its result slot
    pub(crate) fn new(message: Arc<Message>, kind: RequestKind, src: u8) -> (Self, Receiver<Reply>) {
        let (reply, rx) = crossbeam_channel::bounded(1);
        (
            Self {
                message,
                kind,
                src,
                reply,
            },
            rx,
        )
    }
}

/// Per-request overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Source address, the controller's own address when `None`
    pub src: Option<u8>,
    /// Command for writes; SET unless the message forces INF
    pub command: Command,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            src: None,
            command: Command::SET,
        }
    }
}

impl RequestOptions {
    /// Send from another address
    pub fn src(mut self, src: u8) -> Self {
        self.src = Some(src);
        self
    }

    /// Write with another command
    pub fn command(mut self, command: Command) -> Self {
        self.command = command;
        self
    }
}
