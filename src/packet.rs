//! NTP wire format: request encoding and reply timestamp decoding
use core::ops::Range;

use crate::types::{Error, Result, MSEC_IN_SEC, NTP_PACKET_SIZE};

/// NTP mode value bit mask
pub(crate) const MODE_MASK: u8 = 0b0000_0111;
/// NTP mode bit mask shift value
pub(crate) const MODE_SHIFT: u8 = 0;
/// NTP version value bit mask
pub(crate) const VERSION_MASK: u8 = 0b0011_1000;
/// NTP version bit mask shift value
pub(crate) const VERSION_SHIFT: u8 = 3;
/// NTP LI (leap indicator) bit mask value
pub(crate) const LI_MASK: u8 = 0b1100_0000;
/// NTP LI bit mask shift value
pub(crate) const LI_SHIFT: u8 = 6;

const LI_UNSYNCHRONIZED: u8 = 3 << LI_SHIFT;
const NTP_VERSION: u8 = 4 << VERSION_SHIFT;
const NTP_CLIENT_MODE: u8 = 3;

const STRATUM_OFFSET: usize = 1;
const RECV_TIMESTAMP: Range<usize> = 32..40;
const TX_TIMESTAMP: Range<usize> = 40..48;

/// Raw 48 bytes NTP datagram
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawNtpPacket(pub [u8; NTP_PACKET_SIZE]);

impl Default for RawNtpPacket {
    fn default() -> Self {
        RawNtpPacket([0u8; NTP_PACKET_SIZE])
    }
}

impl RawNtpPacket {
    /// Leap indicator, version and mode byte
    #[must_use]
    pub fn li_vn_mode(&self) -> u8 {
        self.0[0]
    }

    /// Stratum of the server that produced the packet
    #[must_use]
    pub fn stratum(&self) -> u8 {
        self.0[STRATUM_OFFSET]
    }
}

/// 64-bit fixed-point NTP timestamp: seconds since 1900 and a binary fraction of a second
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NtpTimestamp {
    /// Seconds since the NTP era start (1900-01-01)
    pub seconds: u32,
    /// Binary fraction of a second, `2^32` units per second
    pub seconds_fraction: u32,
}

impl NtpTimestamp {
    /// Returns seconds fraction converted to whole milliseconds
    #[must_use]
    pub fn millis(&self) -> u32 {
        fraction_to_milliseconds(self.seconds_fraction)
    }

    /// Returns the timestamp as milliseconds since the NTP era start (1900-01-01)
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        i64::from(self.seconds) * MSEC_IN_SEC + i64::from(self.millis())
    }
}

impl From<[u8; 8]> for NtpTimestamp {
    #[allow(clippy::cast_possible_truncation)]
    fn from(bytes: [u8; 8]) -> Self {
        let raw = u64::from_be_bytes(bytes);

        NtpTimestamp {
            seconds: (raw >> 32) as u32,
            seconds_fraction: raw as u32,
        }
    }
}

/// Receive (T2) and transmit (T3) timestamps carried by an NTP reply
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyTimestamps {
    /// Time the request arrived at the server (T2)
    pub receive: NtpTimestamp,
    /// Time the reply left the server (T3)
    pub transmit: NtpTimestamp,
}

/// Build a client request: LI = 3 (unsynchronized), version 4, mode 3 (client),
/// every other byte zero
#[must_use]
pub fn encode_request() -> RawNtpPacket {
    let mut packet = RawNtpPacket::default();

    packet.0[0] = LI_UNSYNCHRONIZED | NTP_VERSION | NTP_CLIENT_MODE;
    packet
}

/// Extract the receive and transmit timestamps from a received datagram.
///
/// `buf` must be the received bytes only, i.e. sliced to the length reported by the socket.
///
/// # Errors
///
/// * [`Error::EmptyResponse`] if nothing was received
/// * [`Error::IncorrectPayload`] if the datagram is shorter than an NTP packet
pub fn decode_reply(buf: &[u8]) -> Result<ReplyTimestamps> {
    if buf.is_empty() {
        return Err(Error::EmptyResponse);
    }

    if buf.len() < NTP_PACKET_SIZE {
        return Err(Error::IncorrectPayload);
    }

    Ok(ReplyTimestamps {
        receive: timestamp_at(buf, RECV_TIMESTAMP),
        transmit: timestamp_at(buf, TX_TIMESTAMP),
    })
}

fn timestamp_at(buf: &[u8], range: Range<usize>) -> NtpTimestamp {
    let mut bytes = [0u8; 8];

    bytes.copy_from_slice(&buf[range]);
    NtpTimestamp::from(bytes)
}

pub(crate) fn shifter(val: u8, mask: u8, shift: u8) -> u8 {
    (val & mask) >> shift
}

/// Convert second fraction value to milliseconds value
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn fraction_to_milliseconds(sec_fraction: u32) -> u32 {
    ((u64::from(sec_fraction) * MSEC_IN_SEC as u64) >> 32) as u32
}
