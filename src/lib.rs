//! Rust NTP client
//!
//! # Overview
//!
//! This crate resolves an NTP server address, sends a single version 4 client request over
//! UDP, parses the 48 bytes reply and computes a locally adjusted clock together with a
//! decomposed wall-clock time (hour, minute, second, millisecond of the day in UTC).
//!
//! # Usage
//!
//! Put this in your `Cargo.toml`:
//! ```cargo
//! [dependencies]
//! ntptime = "0.1"
//! ```
//!
//! ## Features
//!
//! `ntptime` supports several features:
//! - `log`: enables library debug output during execution (enabled by default)
//! - `utils`: adds [`chrono`](https://docs.rs/chrono) conversions of the obtained timestamp
//!
//! # Details
//!
//! There are two approaches how the library can be used:
//! - [`NtpClient`] owns the UDP socket and the server endpoint and folds every failure into
//!   a [`ResultCode`], so the caller only has to inspect the returned [`TimestampResult`]
//! - [`get_time`], or [`sntp_send_request`] followed by [`sntp_process_response`], perform the
//!   exchange on any object implementing [`NtpUdpSocket`] and report failures as [`Error`]
//!
//! Local clock readings are provided through the [`NtpTimestampGenerator`] trait,
//! [`StdTimestampGen`] is the `std::time` backed implementation.
//!
//! ## Logging support
//!
//! Library debug logs can be enabled in executables by enabling `log` feature. Server
//! addresses, exchange timestamps and the computed offset will be printed.
//!
//! # Example
//!
//! ```rust,no_run
//! use ntptime::{NtpClient, ResultCode};
//!
//! fn main() -> ntptime::Result<()> {
//!     let mut client = NtpClient::new();
//!     client.create_socket()?;
//!     client.set_server_address("pool.ntp.org")?;
//!
//!     let timestamp = client.get_timestamp();
//!     match timestamp.result_code() {
//!         ResultCode::Success => println!("NTP server time: {timestamp}"),
//!         code => eprintln!("Unable to get time: {code}"),
//!     }
//!
//!     client.close_socket();
//!     Ok(())
//! }
//! ```
#[cfg(feature = "utils")]
pub mod utils;

mod client;
mod log;
mod packet;
mod socket;
#[cfg(test)]
mod test_utils;
mod types;

pub use crate::client::*;
pub use crate::packet::*;
pub use crate::types::*;

use std::net::SocketAddr;

use crate::log::{debug, error};
use crate::packet::{shifter, LI_MASK, LI_SHIFT, MODE_MASK, MODE_SHIFT, VERSION_MASK, VERSION_SHIFT};
use crate::types::{MSEC_IN_SEC, SEC_IN_DAY, SEC_IN_HOUR, SEC_IN_MIN, USEC_IN_MSEC};

/// Retrieves the current time from an NTP server.
///
/// Performs the complete exchange: sends a request to the given server and processes the
/// server's response.
///
/// # Arguments
///
/// * `addr` - The socket address (`SocketAddr`) of the NTP server.
/// * `socket` - A reference to an object implementing the [`NtpUdpSocket`] trait.
/// * `context` - An NTP context (`NtpContext<T>`) containing a timestamp generator that
///   implements the [`NtpTimestampGenerator`] trait.
///
/// # Errors
///
/// This function returns an `Err` in any of the following cases:
/// * The NTP packet could not be sent to the server.
/// * No response arrived before the socket timeout.
/// * The response payload is invalid or yields a zero timestamp.
/// * Mismatch between the expected and actual server addresses.
pub fn get_time<U, T>(
    addr: SocketAddr,
    socket: &U,
    context: NtpContext<T>,
) -> Result<TimestampResult>
where
    U: NtpUdpSocket,
    T: NtpTimestampGenerator + Clone,
{
    let result = sntp_send_request(addr, socket, context.clone())?;

    sntp_process_response(addr, socket, context, result)
}

/// Sends an NTP request to an NTP server.
///
/// The local time is read from the context's timestamp generator immediately before
/// the datagram is handed to the socket and returned as the originate timestamp (T1)
/// inside [`SendRequestResult`].
///
/// # Errors
///
/// Returns `Err` if the socket fails to send the whole packet.
pub fn sntp_send_request<U, T>(
    dest: SocketAddr,
    socket: &U,
    mut context: NtpContext<T>,
) -> Result<SendRequestResult>
where
    U: NtpUdpSocket,
    T: NtpTimestampGenerator,
{
    debug!("send request - Address: {:?}", dest);
    let request = encode_request();
    let originate_timestamp = get_unix_millis(&mut context.timestamp_gen);

    send_request(dest, &request, socket)?;
    Ok(SendRequestResult::from(originate_timestamp))
}

/// Processes the response from an NTP server.
///
/// Blocks on the socket until a datagram arrives (or the socket's timeout elapses), takes
/// the client receive timestamp (T4), decodes the server timestamps (T2, T3) and computes
/// the adjusted time with the originate timestamp (T1) kept in `send_req_result`.
///
/// # Errors
///
/// This function returns an `Err` in any of the following situations:
/// * Nothing was received before the socket timeout, or the socket failed.
/// * The source address of the response does not match the server address.
/// * The response is empty or shorter than an NTP packet.
/// * The transmit timestamp or the computed UNIX time is zero.
pub fn sntp_process_response<U, T>(
    dest: SocketAddr,
    socket: &U,
    mut context: NtpContext<T>,
    send_req_result: SendRequestResult,
) -> Result<TimestampResult>
where
    U: NtpUdpSocket,
    T: NtpTimestampGenerator,
{
    let mut response_buf = RawNtpPacket::default();
    let (response, src) = socket.recv_from(response_buf.0.as_mut())?;
    let recv_timestamp = get_unix_millis(&mut context.timestamp_gen);
    debug!("Response: {} bytes from {}", response, src);

    if dest != src {
        error!("response from {} while expecting {}", src, dest);
        return Err(Error::ResponseAddressMismatch);
    }

    let timestamps = decode_reply(&response_buf.0[..response.min(NTP_PACKET_SIZE)])?;
    debug_ntp_reply(&response_buf, &timestamps);

    let now = get_unix_millis(&mut context.timestamp_gen);

    process_response(send_req_result, &timestamps, recv_timestamp, now)
}

fn send_request<U>(dest: SocketAddr, req: &RawNtpPacket, socket: &U) -> Result<()>
where
    U: NtpUdpSocket,
{
    let size = socket.send_to(&req.0, dest)?;

    if size == req.0.len() {
        Ok(())
    } else {
        Err(Error::Network)
    }
}

fn process_response(
    send_req_result: SendRequestResult,
    timestamps: &ReplyTimestamps,
    recv_timestamp: i64,
    now: i64,
) -> Result<TimestampResult> {
    if timestamps.transmit == NtpTimestamp::default() {
        return Err(Error::IncorrectTimestamp);
    }
    // - T1 = client's TX timestamp, UNIX epoch
    // - T2 = server's RX timestamp, NTP era
    // - T3 = server's TX timestamp, NTP era
    // - T4 = client's RX timestamp, UNIX epoch
    let t1 = send_req_result.originate_timestamp;
    let t2 = timestamps.receive.as_millis();
    let t3 = timestamps.transmit.as_millis();
    let t4 = recv_timestamp;
    debug!("t1: {}, t2: {}, t3: {}, t4: {}", t1, t2, t3, t4);

    let offset = offset_calculate(t1, t2, t3, t4);
    let result = adjusted_timestamp(offset, now);
    debug!("Offset: {} ms. Adjusted time: {}", offset, result);

    if result.unix_seconds == 0 {
        return Err(Error::IncorrectTimestamp);
    }

    Ok(result)
}

/// Clock offset estimate in milliseconds.
///
/// `theta = 1/2 * [(T2-T1) + (T3-T4)]`, division truncates toward zero.
///
/// T1/T4 are UNIX epoch based while T2/T3 are NTP era based, so the result carries the
/// 1900 to 1970 era delta. [`adjusted_timestamp`] removes it.
#[must_use]
pub fn offset_calculate(t1: i64, t2: i64, t3: i64, t4: i64) -> i64 {
    t2.saturating_sub(t1).saturating_add(t3.saturating_sub(t4)) / 2
}

/// Apply `offset` (from [`offset_calculate`]) to the local time `now` (milliseconds since
/// UNIX epoch) and decompose the result.
///
/// The era delta is subtracted from the combined `now + offset` value, after the
/// millisecond to second conversion.
#[must_use]
pub fn adjusted_timestamp(offset: i64, now: i64) -> TimestampResult {
    let adjusted = now.saturating_add(offset);
    let unix_seconds = adjusted / MSEC_IN_SEC - NTP_TIMESTAMP_DELTA;

    TimestampResult {
        result_code: ResultCode::Success,
        unix_seconds,
        unix_millis: adjusted - NTP_TIMESTAMP_DELTA * MSEC_IN_SEC,
        hour: (unix_seconds % SEC_IN_DAY) / SEC_IN_HOUR,
        minute: (unix_seconds % SEC_IN_HOUR) / SEC_IN_MIN,
        second: unix_seconds % SEC_IN_MIN,
        millisecond: adjusted % MSEC_IN_SEC,
    }
}

fn get_unix_millis<T: NtpTimestampGenerator>(timestamp_gen: &mut T) -> i64 {
    timestamp_gen.init();

    let seconds = i64::try_from(timestamp_gen.timestamp_sec()).unwrap_or(i64::MAX);
    let millis = i64::from(timestamp_gen.timestamp_subsec_micros()) / USEC_IN_MSEC;

    seconds.saturating_mul(MSEC_IN_SEC).saturating_add(millis)
}

fn debug_ntp_reply(packet: &RawNtpPacket, timestamps: &ReplyTimestamps) {
    let mode = shifter(packet.li_vn_mode(), MODE_MASK, MODE_SHIFT);
    let version = shifter(packet.li_vn_mode(), VERSION_MASK, VERSION_SHIFT);
    let li = shifter(packet.li_vn_mode(), LI_MASK, LI_SHIFT);
    let delimiter = "=".repeat(64);

    debug!("{}", delimiter);
    debug!("| Mode:\t\t{}", mode);
    debug!("| Version:\t{}", version);
    debug!("| Leap:\t\t{}", li);
    debug!("| Stratum:\t{}", packet.stratum());
    debug!(
        "| Receive timestamp   (server):\t{:>10}.{:03}",
        timestamps.receive.seconds,
        timestamps.receive.millis()
    );
    debug!(
        "| Transmit timestamp  (server):\t{:>10}.{:03}",
        timestamps.transmit.seconds,
        timestamps.transmit.millis()
    );
    debug!("{}", delimiter);
}


#[cfg(test)]
mod ntptime_exchange_tests {
    use crate::test_utils::{
        reply_packet, FixedClock, ScriptedSocket, SendOutcome, SteppingClock,
        NTP_SECONDS_1700000000, SERVER_ADDR,
    };
    use crate::{
        encode_request, get_time, process_response, sntp_process_response, sntp_send_request, Error,
        NtpContext, ReplyTimestamps, ResultCode, SendRequestResult,
    };
    use std::net::SocketAddr;

    const FIXED_CLOCK: FixedClock = FixedClock {
        sec: 1_700_000_000,
        micros: 10_000,
    };

    #[test]
    fn test_get_time() {
        let reply = reply_packet(
            (NTP_SECONDS_1700000000, 0x8000_0000),
            (NTP_SECONDS_1700000000, 0x8000_0000),
        );
        let socket = ScriptedSocket::replying(&reply, SERVER_ADDR);
        let result = get_time(SERVER_ADDR, &socket, NtpContext::new(FIXED_CLOCK)).unwrap();

        assert_eq!(ResultCode::Success, result.result_code);
        assert_eq!(1_700_000_000, result.unix_seconds);
        assert_eq!(1_700_000_000_500, result.unix_millis);
        assert_eq!(
            (22, 13, 20, 500),
            (result.hour, result.minute, result.second, result.millisecond)
        );
        assert_eq!(vec![encode_request().0.to_vec()], *socket.sent.borrow());
    }

    #[test]
    fn test_send_request_records_originate_timestamp() {
        let socket = ScriptedSocket::failing_recv(Error::Timeout);
        let result = sntp_send_request(SERVER_ADDR, &socket, NtpContext::new(FIXED_CLOCK)).unwrap();

        assert_eq!(1_700_000_000_010, result.originate_timestamp());
        assert_eq!(1, socket.sent.borrow().len());
    }

    #[test]
    fn test_send_request_failures() {
        let tests = [
            (SendOutcome::Short, Error::Network),
            (SendOutcome::Fail(Error::Network), Error::Network),
            (SendOutcome::Fail(Error::Timeout), Error::Timeout),
        ];

        for (outcome, expected) in tests {
            let socket = ScriptedSocket::failing_recv(Error::Timeout).with_send(outcome);
            let result = sntp_send_request(SERVER_ADDR, &socket, NtpContext::new(FIXED_CLOCK));

            assert_eq!(Err(expected), result);
        }
    }

    #[test]
    fn test_process_response_failures() {
        let other: SocketAddr = "192.0.2.2:123".parse().unwrap();
        let reply = reply_packet((NTP_SECONDS_1700000000, 0), (NTP_SECONDS_1700000000, 0));
        let tests = [
            (ScriptedSocket::failing_recv(Error::Timeout), Error::Timeout),
            (ScriptedSocket::replying(&[], SERVER_ADDR), Error::EmptyResponse),
            (ScriptedSocket::replying(&reply[..47], SERVER_ADDR), Error::IncorrectPayload),
            (ScriptedSocket::replying(&reply, other), Error::ResponseAddressMismatch),
        ];

        for (socket, expected) in tests {
            let result = sntp_process_response(
                SERVER_ADDR,
                &socket,
                NtpContext::new(FIXED_CLOCK),
                SendRequestResult::from(1_700_000_000_010),
            );

            assert_eq!(Err(expected), result);
        }
    }

    #[test]
    fn test_zero_timestamps_rejected() {
        let reply = reply_packet((2_208_988_800, 0), (2_208_988_800, 0));
        let timestamps = crate::decode_reply(&reply).unwrap();
        let result = process_response(SendRequestResult::from(0), &timestamps, 0, 0);

        assert_eq!(Err(Error::IncorrectTimestamp), result);
        assert_eq!(
            Err(Error::IncorrectTimestamp),
            process_response(
                SendRequestResult::from(0),
                &ReplyTimestamps::default(),
                0,
                2_208_988_800_999,
            )
        );
    }

    #[test]
    fn test_clock_readings_per_exchange() {
        let reply = reply_packet((NTP_SECONDS_1700000000, 0), (NTP_SECONDS_1700000000, 0));
        let socket = ScriptedSocket::replying(&reply, SERVER_ADDR);
        let clock = SteppingClock::new(1_700_000_000_000, 1000);

        get_time(SERVER_ADDR, &socket, NtpContext::new(clock.clone())).unwrap();

        // T1, T4 and the final `now`
        assert_eq!(3, clock.readings());
    }
}
