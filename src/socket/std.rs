use crate::{Error, NtpUdpSocket, NTP_PACKET_SIZE};

use std::io;
use std::net::{SocketAddr, UdpSocket};

impl NtpUdpSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> crate::Result<usize> {
        UdpSocket::send_to(self, buf, addr).map_err(map_io_error)
    }

    fn recv_from(&self, buf: &mut [u8]) -> crate::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).map_err(map_io_error)
    }

    fn discard_pending(&self) -> crate::Result<usize> {
        self.set_nonblocking(true).map_err(map_io_error)?;

        let mut buf = [0u8; NTP_PACKET_SIZE];
        let mut discarded = 0;
        let drained = loop {
            match UdpSocket::recv_from(self, &mut buf) {
                Ok(_) => discarded += 1,
                // ICMP errors of an earlier send surface once, keep draining
                Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break Ok(discarded),
                Err(err) => break Err(map_io_error(err)),
            }
        };

        self.set_nonblocking(false).map_err(map_io_error)?;
        drained
    }
}

fn map_io_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Network,
    }
}
