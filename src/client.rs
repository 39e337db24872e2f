//! Session-owning NTP client built on top of the protocol functions
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::log::{debug, error, warn};
use crate::{
    sntp_process_response, sntp_send_request, Error, NtpContext, NtpTimestampGenerator,
    NtpUdpSocket, Result, ResultCode, StdTimestampGen, TimestampResult, NTP_PORT,
};

/// Default send/receive timeout of the client socket
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Client settings
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Local address the UDP socket binds to, port `0` picks an ephemeral port
    pub bind_address: SocketAddr,
    /// NTP server port
    pub port: u16,
    /// Send and receive timeout, must be non-zero
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            port: NTP_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_bind_address(mut self, bind_address: SocketAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Resolved NTP server address
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    addr: SocketAddr,
}

impl ServerEndpoint {
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        ServerEndpoint { addr }
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Lifecycle of an [`NtpClient`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Neither a socket nor a server address is present
    Uninitialized,
    /// A socket is open but no server address is set
    SocketReady,
    /// A server address is set
    AddressSet,
    /// The request datagram has been sent and a reply is awaited. A failed
    /// [`NtpClient::try_get_timestamp`] stays here when the receive stage failed.
    RequestSent,
    /// The last exchange finished with the given outcome
    Completed(ResultCode),
}

/// NTP client owning a UDP socket and a server endpoint.
///
/// Every exchange is a single blocking attempt bounded by [`ClientConfig::timeout`].
/// Originate and receive timestamps live only for the duration of one
/// [`NtpClient::get_timestamp`] call.
///
/// # Example
///
/// ```rust,no_run
/// use ntptime::{ClientConfig, NtpClient};
/// use std::time::Duration;
///
/// let config = ClientConfig::default().with_timeout(Duration::from_secs(1));
/// let mut client = NtpClient::with_config(config);
///
/// if client.create_socket().is_ok() && client.set_server_address("time.google.com").is_ok() {
///     let timestamp = client.get_timestamp();
///     println!("{:?}: {}", timestamp.result_code(), timestamp);
/// }
///
/// client.close_socket();
/// ```
#[derive(Debug)]
pub struct NtpClient<U = UdpSocket, T = StdTimestampGen> {
    config: ClientConfig,
    socket: Option<U>,
    server: Option<ServerEndpoint>,
    timestamp_gen: T,
    state: ClientState,
    started: bool,
}

impl NtpClient {
    /// Create a client with the default configuration and the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_timestamp_gen(config, StdTimestampGen::default())
    }
}

impl Default for NtpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NtpTimestampGenerator> NtpClient<UdpSocket, T> {
    /// Create a client that reads the local clock through `timestamp_gen`
    pub fn with_timestamp_gen(config: ClientConfig, timestamp_gen: T) -> Self {
        NtpClient {
            config,
            socket: None,
            server: None,
            timestamp_gen,
            state: ClientState::Uninitialized,
            started: false,
        }
    }

    /// Open a UDP socket bound to [`ClientConfig::bind_address`] with the configured
    /// send and receive timeouts. An already open socket is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SocketCreation`] if the socket can not be bound or configured;
    /// the client state is left untouched in that case.
    pub fn create_socket(&mut self) -> Result<()> {
        let socket = bind_socket(&self.config).map_err(|err| {
            error!("Unable to create UDP socket: {}", err);
            Error::SocketCreation
        })?;

        debug!("UDP socket bound to {:?}", socket.local_addr());
        self.socket = Some(socket);
        self.state = self.idle_state();
        Ok(())
    }
}

impl<U, T> NtpClient<U, T> {
    /// Attach an already configured socket, replacing any open one
    pub fn with_socket<V: NtpUdpSocket>(self, socket: V) -> NtpClient<V, T> {
        let mut client = NtpClient {
            config: self.config,
            socket: Some(socket),
            server: self.server,
            timestamp_gen: self.timestamp_gen,
            state: self.state,
            started: self.started,
        };

        client.state = client.idle_state();
        client
    }

    /// Resolve `host` and use it as the server endpoint for subsequent requests.
    ///
    /// `host` may be a host name, an IP literal, `host:port`, `[ipv6]:port` or a URL; only
    /// the host part is used and the server port always comes from [`ClientConfig::port`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::AddressResolve`] if no host can be extracted or resolved. Any
    /// previously set address is forgotten, so following requests report
    /// [`ResultCode::ServerAddressNotSet`].
    pub fn set_server_address(&mut self, host: &str) -> Result<ServerEndpoint> {
        self.server = None;

        match resolve_endpoint(host, self.config.port, &self.config.bind_address) {
            Ok(endpoint) => {
                debug!("NTP server {:?} resolved to {}", host, endpoint.addr());
                self.server = Some(endpoint);
                self.state = ClientState::AddressSet;
                Ok(endpoint)
            }
            Err(err) => {
                warn!("Unable to resolve NTP server address {:?}", host);
                self.state = self.idle_state();
                Err(err)
            }
        }
    }

    /// Forget the server endpoint
    pub fn reset_server_address(&mut self) {
        self.server = None;
        self.state = self.idle_state();
    }

    /// Close the socket. The server address is kept for a later [`NtpClient::create_socket`].
    /// Closing a client without an open socket does nothing.
    pub fn close_socket(&mut self) {
        if self.socket.take().is_none() {
            debug!("Socket was not created");
        }

        self.state = self.idle_state();
    }

    #[must_use]
    pub fn server_endpoint(&self) -> Option<ServerEndpoint> {
        self.server
    }

    /// Returns the configured NTP server port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    #[must_use]
    pub fn is_socket_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Returns the caller owned "client started" flag
    #[must_use]
    pub fn client_started(&self) -> bool {
        self.started
    }

    pub fn set_client_started(&mut self, started: bool) {
        self.started = started;
    }

    fn idle_state(&self) -> ClientState {
        match (&self.socket, &self.server) {
            (_, Some(_)) => ClientState::AddressSet,
            (Some(_), None) => ClientState::SocketReady,
            (None, None) => ClientState::Uninitialized,
        }
    }
}

impl<U, T> NtpClient<U, T>
where
    U: NtpUdpSocket,
    T: NtpTimestampGenerator + Clone,
{
    /// Perform one request/response exchange with the server.
    ///
    /// Blocks for at most the send timeout plus the receive timeout. Failures never
    /// escape as errors, they are reported through [`TimestampResult::result_code`]:
    /// - [`ResultCode::ServerAddressNotSet`] - no address is set, no I/O is attempted
    /// - [`ResultCode::SendFailed`] - no socket, or the request could not be sent
    /// - [`ResultCode::ReceiveFailed`] - no valid reply arrived within the timeout
    ///
    /// On any failure all numeric fields of the result are zero.
    pub fn get_timestamp(&mut self) -> TimestampResult {
        let result = match self.try_get_timestamp() {
            Ok(result) => result,
            Err(err) => {
                let code = self.failure_code(err);

                error!("NTP request failed ({}): {}", code, err);
                TimestampResult::failed(code)
            }
        };

        self.state = ClientState::Completed(result.result_code);
        result
    }

    /// Perform one request/response exchange and report failures as [`Error`].
    ///
    /// Datagrams queued on the socket before the request, such as a reply that arrived
    /// after an earlier exchange timed out, are discarded first.
    ///
    /// # Errors
    ///
    /// * [`Error::ServerAddressNotSet`] if no address is set, no I/O is attempted
    /// * [`Error::SocketNotCreated`] if the client has no socket
    /// * any error of [`sntp_send_request`]; the client stays in its idle state
    /// * any error of [`sntp_process_response`]; the client stays in
    ///   [`ClientState::RequestSent`]
    pub fn try_get_timestamp(&mut self) -> Result<TimestampResult> {
        self.state = self.idle_state();

        let server = self.server.ok_or(Error::ServerAddressNotSet)?;
        let socket = self.socket.as_ref().ok_or(Error::SocketNotCreated)?;

        match socket.discard_pending() {
            Ok(0) => {}
            Ok(count) => warn!("Discarded {} stale datagram(s)", count),
            Err(err) => warn!("Unable to discard pending datagrams: {}", err),
        }

        let context = NtpContext::new(self.timestamp_gen.clone());
        let send_req_result = sntp_send_request(server.addr(), socket, context.clone())?;
        self.state = ClientState::RequestSent;

        let result = sntp_process_response(server.addr(), socket, context, send_req_result)?;
        self.state = ClientState::Completed(ResultCode::Success);
        Ok(result)
    }

    fn failure_code(&self, err: Error) -> ResultCode {
        match (err, self.state) {
            (Error::ServerAddressNotSet, _) => ResultCode::ServerAddressNotSet,
            (_, ClientState::RequestSent) => ResultCode::ReceiveFailed,
            _ => ResultCode::SendFailed,
        }
    }
}

fn bind_socket(config: &ClientConfig) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(config.bind_address)?;

    socket.set_read_timeout(Some(config.timeout))?;
    socket.set_write_timeout(Some(config.timeout))?;
    Ok(socket)
}

fn resolve_endpoint(input: &str, port: u16, bind_address: &SocketAddr) -> Result<ServerEndpoint> {
    let host = extract_host(input).ok_or(Error::AddressResolve)?;
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::AddressResolve)?
        .collect();

    // Prefer the family the socket is bound to
    addrs
        .iter()
        .find(|addr| addr.is_ipv4() == bind_address.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .map(ServerEndpoint::new)
        .ok_or(Error::AddressResolve)
}

/// Host part of a bare host, `host:port`, `[ipv6]:port` or URL string
fn extract_host(input: &str) -> Option<&str> {
    let mut rest = input.trim();

    if let Some((scheme, after_scheme)) = rest.split_once("://") {
        if !scheme.contains('/') {
            rest = after_scheme;
        }
    }

    rest = rest.split(['/', '?', '#']).next().unwrap_or_default();

    if let Some((_, after_user)) = rest.rsplit_once('@') {
        rest = after_user;
    }

    let host = if let Some(bracketed) = rest.strip_prefix('[') {
        bracketed.split_once(']')?.0
    } else if rest.matches(':').count() == 1 {
        rest.split_once(':')?.0
    } else {
        // Unbracketed IPv6 literal or plain host
        rest
    };

    (!host.is_empty()).then_some(host)
}
