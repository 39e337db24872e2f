//! Requests the time from `pool.ntp.org` five times through the [`ntptime::get_time`] function
//!
//! ```
//! cargo run --example simple_request
//! ```
use std::net::{ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::Duration;

use ntptime::{NtpContext, StdTimestampGen};

#[allow(dead_code)]
const POOL_NTP_ADDR: &str = "pool.ntp.org:123";
#[allow(dead_code)]
const GOOGLE_NTP_ADDR: &str = "time.google.com:123";

fn main() {
    if cfg!(debug_assertions) {
        simple_logger::init_with_level(log::Level::Trace).unwrap();
    } else {
        simple_logger::init_with_level(log::Level::Info).unwrap();
    }

    let socket = UdpSocket::bind("0.0.0.0:0").expect("Unable to create UDP socket");
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("Unable to set UDP socket read timeout");

    for addr in POOL_NTP_ADDR.to_socket_addrs().unwrap().filter(|addr| addr.is_ipv4()) {
        let context = NtpContext::new(StdTimestampGen::default());

        match ntptime::get_time(addr, &socket, context) {
            Ok(time) => {
                assert_ne!(time.sec(), 0);
                println!("Got time from [{POOL_NTP_ADDR}] {addr}: {time} ({} ms)", time.millis());
            }
            Err(err) => println!("Err: {err:?}"),
        }

        thread::sleep(Duration::from_secs(2));
    }
}
