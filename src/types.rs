use core::fmt::{self, Display, Formatter};
use std::net::SocketAddr;

/// Well-known NTP server port
pub const NTP_PORT: u16 = 123;
/// Size of an NTP packet without extension fields
pub const NTP_PACKET_SIZE: usize = 48;
/// Seconds between the NTP era start (1900-01-01) and the UNIX epoch (1970-01-01)
///
/// First day UNIX era offset <https://www.rfc-editor.org/rfc/rfc5905>
pub const NTP_TIMESTAMP_DELTA: i64 = 2_208_988_800;
/// Milliseconds in second constant
pub(crate) const MSEC_IN_SEC: i64 = 1_000;
/// Microseconds in millisecond constant
pub(crate) const USEC_IN_MSEC: i64 = 1_000;
/// Seconds in a day
pub(crate) const SEC_IN_DAY: i64 = 86_400;
/// Seconds in an hour
pub(crate) const SEC_IN_HOUR: i64 = 3_600;
/// Seconds in a minute
pub(crate) const SEC_IN_MIN: i64 = 60;

/// Library result type
pub type Result<T> = core::result::Result<T, Error>;

/// The error type for the NTP client
///
/// Errors originate on the network layer or while processing a response from an NTP server.
/// [`crate::NtpClient::get_timestamp`] never returns them directly, it folds them into a
/// [`ResultCode`] depending on the protocol stage that failed.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The OS could not allocate or configure a UDP socket
    SocketCreation,
    /// An operation required a socket but none has been created
    SocketNotCreated,
    /// An NTP server address can not be resolved
    AddressResolve,
    /// A request was attempted before an NTP server address was set
    ServerAddressNotSet,
    /// Network error occurred
    Network,
    /// No datagram could be sent or received within the configured timeout
    Timeout,
    /// A datagram with no payload was received
    EmptyResponse,
    /// Payload size of an NTP response is shorter than an NTP packet
    IncorrectPayload,
    /// The address a response has been received from does not match
    /// the address the request was sent to
    ResponseAddressMismatch,
    /// The response carries a zero transmit timestamp or yields a zero UNIX timestamp
    IncorrectTimestamp,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::SocketCreation => "unable to create UDP socket",
            Error::SocketNotCreated => "UDP socket has not been created",
            Error::AddressResolve => "unable to resolve NTP server address",
            Error::ServerAddressNotSet => "NTP server address is not set",
            Error::Network => "network error",
            Error::Timeout => "operation timed out",
            Error::EmptyResponse => "empty NTP response",
            Error::IncorrectPayload => "incorrect NTP response payload size",
            Error::ResponseAddressMismatch => "NTP response received from an unexpected address",
            Error::IncorrectTimestamp => "NTP response yields a zero timestamp",
        };

        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

/// Outcome of a single [`crate::NtpClient::get_timestamp`] exchange
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum ResultCode {
    /// The reply was received and the timestamp fields are valid
    Success,
    /// No server address was configured before the request
    #[default]
    ServerAddressNotSet,
    /// The request datagram could not be sent
    SendFailed,
    /// No valid reply arrived within the timeout window
    ReceiveFailed,
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let code = match self {
            ResultCode::Success => "success",
            ResultCode::ServerAddressNotSet => "server address not set",
            ResultCode::SendFailed => "send failed",
            ResultCode::ReceiveFailed => "receive failed",
        };

        write!(f, "{code}")
    }
}

/// NTP request result representation
///
/// `unix_seconds == 0` means no valid timestamp was obtained; the result code then
/// names the stage that failed and every numeric field is zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TimestampResult {
    /// Outcome of the exchange
    pub result_code: ResultCode,
    /// Seconds since UNIX epoch
    pub unix_seconds: i64,
    /// Milliseconds since UNIX epoch
    pub unix_millis: i64,
    /// Hour of the day (UTC)
    pub hour: i64,
    /// Minute of the hour
    pub minute: i64,
    /// Second of the minute
    pub second: i64,
    /// Millisecond of the second
    pub millisecond: i64,
}

impl TimestampResult {
    /// Create a failed result that carries only the given result code
    #[must_use]
    pub fn failed(result_code: ResultCode) -> Self {
        TimestampResult {
            result_code,
            ..TimestampResult::default()
        }
    }

    /// Returns the exchange outcome
    #[must_use]
    pub fn result_code(&self) -> ResultCode {
        self.result_code
    }

    /// Returns `true` if the result holds a valid timestamp
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success
    }

    /// Returns number of seconds since UNIX epoch
    #[must_use]
    pub fn sec(&self) -> i64 {
        self.unix_seconds
    }

    /// Returns number of milliseconds since UNIX epoch
    #[must_use]
    pub fn millis(&self) -> i64 {
        self.unix_millis
    }
}

impl Display for TimestampResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            self.hour, self.minute, self.second, self.millisecond
        )
    }
}

/// A trait encapsulating timestamp generator's operations
///
/// Implement it to provide the client with local clock readings, for example a
/// fixed clock in tests. All timestamps are calculated from UNIX EPOCH
/// "_1970-01-01 00:00:00 UTC_"
pub trait NtpTimestampGenerator {
    /// Initialize timestamp generator state with `now` system time since UNIX EPOCH.
    /// Expected to be called every time before `timestamp_sec` and
    /// `timestamp_subsec_micros` usage. Basic flow would be the following:
    ///
    /// ```text
    /// # Timestamp A required
    /// init()
    /// timestamp_sec()
    /// timestamp_subsec_micros()
    /// // ...
    /// # Timestamp B required
    /// init()
    /// timestamp_sec()
    /// timestamp_subsec_micros()
    /// // ... so on
    /// ```
    fn init(&mut self);

    /// Returns timestamp in seconds since UNIX EPOCH for the initialized generator
    fn timestamp_sec(&self) -> u64;

    /// Returns the fractional part of the timestamp in whole micro seconds.
    /// That method **should not** return microseconds since UNIX EPOCH
    fn timestamp_subsec_micros(&self) -> u32;
}

/// Supplementary module to implement the `std` backed timestamp generator
mod sup {
    use std::time::{Duration, SystemTime};

    use crate::NtpTimestampGenerator;

    /// Standard library timestamp generator wrapper type
    /// that relies on `std::time` to provide timestamps during NTP client operations
    #[derive(Copy, Clone, Default, Debug)]
    pub struct StdTimestampGen {
        duration: Duration,
    }

    impl NtpTimestampGenerator for StdTimestampGen {
        fn init(&mut self) {
            // A clock set before 1970 reads as the epoch itself
            self.duration = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default();
        }

        fn timestamp_sec(&self) -> u64 {
            self.duration.as_secs()
        }

        fn timestamp_subsec_micros(&self) -> u32 {
            self.duration.subsec_micros()
        }
    }
}

pub use sup::*;

/// A trait encapsulating UDP socket interface required for NTP client operations
pub trait NtpUdpSocket {
    /// Send the given buffer to an address provided. On success, returns the number
    /// of bytes written.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an underlying UDP send fails or times out
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize>;

    /// Receives a single datagram message on the socket. On success, returns the number
    /// of bytes read and the origin.
    ///
    /// The function will be called with valid byte array `buf` of sufficient size to
    /// hold the message bytes
    ///
    /// # Errors
    ///
    /// Will return `Err` if an underlying UDP receive fails or times out
    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Drop datagrams already queued on the socket without blocking and return how many
    /// were dropped. The default implementation drops nothing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the socket can not be polled
    fn discard_pending(&self) -> Result<usize> {
        Ok(0)
    }
}

/// NTP client context that carries objects required for a single exchange
#[derive(Copy, Clone, Debug)]
pub struct NtpContext<T: NtpTimestampGenerator> {
    pub timestamp_gen: T,
}

impl<T: NtpTimestampGenerator> NtpContext<T> {
    /// Create NTP client context with the given timestamp generator
    pub fn new(timestamp_gen: T) -> Self {
        NtpContext { timestamp_gen }
    }
}

/// Preserve NTP request sending operation result required during receiving and processing
/// state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SendRequestResult {
    /// Local time the request left the client (T1), milliseconds since UNIX epoch
    pub(crate) originate_timestamp: i64,
}

impl SendRequestResult {
    /// Returns the originate timestamp (T1) in milliseconds since UNIX epoch
    #[must_use]
    pub fn originate_timestamp(&self) -> i64 {
        self.originate_timestamp
    }
}

impl From<i64> for SendRequestResult {
    fn from(originate_timestamp: i64) -> Self {
        SendRequestResult {
            originate_timestamp,
        }
    }
}

#[cfg(test)]
mod types_tests {
    use crate::{Error, ResultCode, TimestampResult};

    #[test]
    fn test_default_result_is_address_not_set() {
        let result = TimestampResult::default();

        assert_eq!(ResultCode::ServerAddressNotSet, result.result_code());
        assert_eq!(0, result.sec());
        assert_eq!(0, result.millis());
        assert!(!result.is_success());
    }

    #[test]
    fn test_failed_result_zeroes_fields() {
        let result = TimestampResult::failed(ResultCode::SendFailed);

        assert_eq!(ResultCode::SendFailed, result.result_code);
        assert_eq!(0, result.unix_seconds);
        assert_eq!(0, result.unix_millis);
        assert_eq!(0, result.hour);
        assert_eq!(0, result.minute);
        assert_eq!(0, result.second);
        assert_eq!(0, result.millisecond);
    }

    #[test]
    fn test_timestamp_result_str_representation() {
        let result = TimestampResult {
            result_code: ResultCode::Success,
            unix_seconds: 1_700_000_000,
            unix_millis: 1_700_000_000_007,
            hour: 22,
            minute: 13,
            second: 20,
            millisecond: 7,
        };

        assert_eq!(format!("{result}"), "22:13:20.007");
    }

    #[test]
    fn test_result_code_str_representation() {
        assert_eq!(format!("{}", ResultCode::Success), "success");
        assert_eq!(format!("{}", ResultCode::SendFailed), "send failed");
        assert_eq!(format!("{}", ResultCode::ReceiveFailed), "receive failed");
        assert_eq!(
            format!("{}", ResultCode::ServerAddressNotSet),
            "server address not set"
        );
    }

    #[test]
    fn test_error_str_representation() {
        assert_eq!(format!("{}", Error::Timeout), "operation timed out");
        assert_eq!(
            format!("{}", Error::AddressResolve),
            "unable to resolve NTP server address"
        );
    }
}
