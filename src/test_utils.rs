//! Deterministic clocks and sockets shared by unit tests
use std::cell::{Cell, RefCell};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;

use crate::{Error, NtpTimestampGenerator, NtpUdpSocket, Result, NTP_PACKET_SIZE};

pub(crate) const SERVER_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 123);

/// 2023-11-14 22:13:20 UTC in NTP era seconds
pub(crate) const NTP_SECONDS_1700000000: u32 = 3_908_988_800;

/// Clock that always reports the same instant
#[derive(Copy, Clone, Debug)]
pub(crate) struct FixedClock {
    pub(crate) sec: u64,
    pub(crate) micros: u32,
}

impl NtpTimestampGenerator for FixedClock {
    fn init(&mut self) {}

    fn timestamp_sec(&self) -> u64 {
        self.sec
    }

    fn timestamp_subsec_micros(&self) -> u32 {
        self.micros
    }
}

/// Clock that advances by `step_ms` on every reading; clones share the tick counter
#[derive(Clone, Debug)]
pub(crate) struct SteppingClock {
    start_ms: u64,
    step_ms: u64,
    ticks: Rc<Cell<u64>>,
    current_ms: u64,
}

impl SteppingClock {
    pub(crate) fn new(start_ms: u64, step_ms: u64) -> Self {
        SteppingClock {
            start_ms,
            step_ms,
            ticks: Rc::new(Cell::new(0)),
            current_ms: start_ms,
        }
    }

    pub(crate) fn readings(&self) -> u64 {
        self.ticks.get()
    }
}

impl NtpTimestampGenerator for SteppingClock {
    fn init(&mut self) {
        let tick = self.ticks.get();

        self.current_ms = self.start_ms + tick * self.step_ms;
        self.ticks.set(tick + 1);
    }

    fn timestamp_sec(&self) -> u64 {
        self.current_ms / 1000
    }

    #[allow(clippy::cast_possible_truncation)]
    fn timestamp_subsec_micros(&self) -> u32 {
        (self.current_ms % 1000 * 1000) as u32
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum SendOutcome {
    Full,
    Short,
    Fail(Error),
}

/// Socket that replays a single scripted reply and records every sent datagram
#[derive(Debug)]
pub(crate) struct ScriptedSocket {
    send: SendOutcome,
    reply: Result<(Vec<u8>, SocketAddr)>,
    pub(crate) sent: RefCell<Vec<Vec<u8>>>,
}

impl ScriptedSocket {
    pub(crate) fn replying(data: &[u8], src: SocketAddr) -> Self {
        ScriptedSocket {
            send: SendOutcome::Full,
            reply: Ok((data.to_vec(), src)),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn failing_recv(err: Error) -> Self {
        ScriptedSocket {
            send: SendOutcome::Full,
            reply: Err(err),
            sent: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn with_send(mut self, send: SendOutcome) -> Self {
        self.send = send;
        self
    }
}

impl NtpUdpSocket for ScriptedSocket {
    fn send_to(&self, buf: &[u8], _addr: SocketAddr) -> Result<usize> {
        self.sent.borrow_mut().push(buf.to_vec());

        match self.send {
            SendOutcome::Full => Ok(buf.len()),
            SendOutcome::Short => Ok(buf.len() - 1),
            SendOutcome::Fail(err) => Err(err),
        }
    }

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        match &self.reply {
            Ok((data, src)) => {
                let size = data.len().min(buf.len());

                buf[..size].copy_from_slice(&data[..size]);
                Ok((size, *src))
            }
            Err(err) => Err(*err),
        }
    }
}

/// Build a server reply (LI 0, version 4, mode 4, stratum 1) with the given
/// receive and transmit timestamps as (seconds, fraction) pairs
pub(crate) fn reply_packet(receive: (u32, u32), transmit: (u32, u32)) -> [u8; NTP_PACKET_SIZE] {
    let mut buf = [0u8; NTP_PACKET_SIZE];

    buf[0] = 0x24;
    buf[1] = 1;
    buf[32..36].copy_from_slice(&receive.0.to_be_bytes());
    buf[36..40].copy_from_slice(&receive.1.to_be_bytes());
    buf[40..44].copy_from_slice(&transmit.0.to_be_bytes());
    buf[44..48].copy_from_slice(&transmit.1.to_be_bytes());
    buf
}
