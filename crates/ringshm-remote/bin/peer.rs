//! Receiving companion process for the launcher.
//!
//! Usage: `peer <multi:true|false> [channel_count] [duration_secs] [channel_id]`
//!
//! Opens a receiving `Channel` (or `MultiChannel` with `channel_count`
//! slots) on `channel_id`, drains it for `duration_secs`, then exits.
//! Defaults: 1 slot, 1 second, `ChannelId::CLIENT_TO_SERVER`.

use ringshm_rs::{Channel, ChannelId, Endpoint, Mode, MultiChannel};
use std::error::Error;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, Level};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Args {
    multi: bool,
    channel_count: usize,
    duration: Duration,
    id: ChannelId,
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = std::env::args().skip(1);

    let multi = args
        .next()
        .ok_or("missing <multi:true|false> argument")?
        .parse::<bool>()?;

    // Unparsable optional values fall back to their defaults.
    let channel_count = args.next().and_then(|a| a.parse().ok()).unwrap_or(1);
    let duration = args
        .next()
        .and_then(|a| a.parse::<u64>().ok())
        .map_or(Duration::from_secs(1), Duration::from_secs);
    let id = match args.next() {
        Some(raw) => raw.parse()?,
        None => ChannelId::CLIENT_TO_SERVER,
    };

    Ok(Args {
        multi,
        channel_count,
        duration,
        id,
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .compact()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    info!(
        id = %args.id,
        multi = args.multi,
        channel_count = args.channel_count,
        duration_secs = args.duration.as_secs(),
        "peer starting"
    );

    let received = if args.multi {
        run_multi_receiver(&args)?
    } else {
        run_single_receiver(&args)?
    };

    info!(bytes = received, "peer done");
    Ok(())
}

fn run_single_receiver(args: &Args) -> Result<usize, Box<dyn Error>> {
    let mut channel = Channel::new(args.id, Mode::Receive);
    channel.open()?;

    let start = Instant::now();
    let mut received = 0;
    while start.elapsed() < args.duration {
        match channel.try_read()? {
            Some(data) => {
                debug!(len = data.len(), "received");
                received += data.len();
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
    Ok(received)
}

fn run_multi_receiver(args: &Args) -> Result<usize, Box<dyn Error>> {
    let mut channel = MultiChannel::new(args.id, Mode::Receive, args.channel_count);
    channel.open()?;

    let start = Instant::now();
    let mut received = 0;
    while start.elapsed() < args.duration {
        match channel.try_read()? {
            Some((slot, data)) => {
                debug!(slot, len = data.len(), "received");
                received += data.len();
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
    Ok(received)
}
