//! Polls an NTP server with [`ntptime::NtpClient`] and prints the obtained wall-clock time
//!
//! You can run the `timesync` example in the terminal:
//!
//! ```
//! cargo run --example timesync
//! ```
//!
//! That will run the example with the default NTP server set to `time.google.com`. To
//! change the settings the following options are available:
//! - `-s`/`--server` - specify server (default: `time.google.com`)
//! - `-p`/`--port` - specify port (default: `123`)
//! - `-t`/`--timeout-ms` - socket timeout in milliseconds (default: `500`)
//! - `-c`/`--count` - number of requests (default: `1`)
//!
//! So, command in the terminal with all options involved:
//!
//! ```
//! cargo run --example timesync -- -s pool.ntp.org -p 123 -t 1000 -c 3
//! ```
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use ntptime::{ClientConfig, NtpClient, ResultCode};

const GOOGLE_NTP_ADDR: &str = "time.google.com";

#[derive(Parser, Debug)]
#[command(version, about = "Query an NTP server for the current time")]
struct Cli {
    /// NTP server hostname, IP literal or URL
    #[arg(short, long, default_value = GOOGLE_NTP_ADDR)]
    server: String,

    /// NTP server port
    #[arg(short, long, default_value_t = ntptime::NTP_PORT)]
    port: u16,

    /// Send and receive timeout in milliseconds
    #[arg(short, long = "timeout-ms", default_value_t = 500)]
    timeout_ms: u64,

    /// Number of requests to perform
    #[arg(short, long, default_value_t = 1)]
    count: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cfg!(debug_assertions) {
        simple_logger::init_with_level(log::Level::Trace).unwrap();
    } else {
        simple_logger::init_with_level(log::Level::Info).unwrap();
    }

    let config = ClientConfig::default()
        .with_port(cli.port)
        .with_timeout(Duration::from_millis(cli.timeout_ms));
    let mut client = NtpClient::with_config(config);

    if let Err(err) = client.create_socket() {
        eprintln!("Unable to create UDP socket: {err}");
        return ExitCode::FAILURE;
    }

    let endpoint = match client.set_server_address(&cli.server) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            eprintln!("Unable to resolve {}: {err}", cli.server);
            return ExitCode::FAILURE;
        }
    };

    let mut failures = 0;
    for i in 0..cli.count {
        if i > 0 {
            thread::sleep(Duration::from_secs(1));
        }

        let timestamp = client.get_timestamp();
        match timestamp.result_code() {
            ResultCode::Success => println!(
                "{} UTC from {} (unix {} s, {} ms)",
                timestamp,
                endpoint.addr(),
                timestamp.sec(),
                timestamp.millis()
            ),
            code => {
                failures += 1;
                eprintln!("Request to {} failed: {code}", endpoint.addr());
            }
        }
    }

    client.close_socket();

    if failures == cli.count {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
