use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use slotwire::client::{CallbackListener, Client, Semantics};
use slotwire::config::{ClientConfig, DEFAULT_PORT, InvokerConfig};
use slotwire::model::{BookingId, Day, WeeklyTime};
use slotwire::protocol::{Request, Response};

#[derive(Parser, Debug)]
#[command(name = "slotwire-client")]
#[command(about = "Book and watch facilities on a slotwire server")]
struct Cli {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server UDP port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Per-attempt reply timeout in milliseconds
    #[arg(short, long, default_value = "1000")]
    timeout_ms: u64,

    /// Retransmissions after the first attempt
    #[arg(short, long, default_value = "3")]
    retries: u32,

    /// Ask the server to answer retransmissions from its reply cache
    #[arg(long)]
    at_most_once: bool,

    /// Print replies as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Free intervals of a facility on one day
    Query { facility: String, day: Day },
    /// Book [start, end), times written as e.g. mon/09:00
    Book {
        facility: String,
        user: String,
        start: WeeklyTime,
        end: WeeklyTime,
    },
    /// Shift a booking by a (possibly negative) number of minutes
    Change {
        booking_id: BookingId,
        #[arg(allow_hyphen_values = true)]
        offset_minutes: i32,
    },
    /// Register for availability pushes and print them until interrupted
    Monitor {
        facility: String,
        /// How long the server keeps pushing, in seconds
        seconds: u32,
        /// Local port for pushes; 0 picks a free one
        #[arg(long, default_value = "0")]
        callback_port: u16,
    },
    /// Remove every booking starting on a day
    Reset { facility: String, day: Day },
    /// Bump a facility's usage counter
    Incr { facility: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let server: SocketAddr = tokio::net::lookup_host((cli.host.as_str(), cli.port))
        .await?
        .next()
        .ok_or_else(|| format!("cannot resolve {}", cli.host))?;
    let config = ClientConfig {
        server,
        invoker: InvokerConfig {
            timeout: Duration::from_millis(cli.timeout_ms),
            max_retries: cli.retries,
        },
    };
    let semantics = if cli.at_most_once {
        Semantics::AtMostOnce
    } else {
        Semantics::AtLeastOnce
    };
    let mut client = Client::connect(config, semantics).await?;

    let request = match cli.command {
        Command::Query { facility, day } => Request::QueryAvail { facility, day },
        Command::Book {
            facility,
            user,
            start,
            end,
        } => Request::Book {
            facility,
            user,
            start,
            end,
        },
        Command::Change {
            booking_id,
            offset_minutes,
        } => Request::ChangeBooking {
            booking_id,
            offset_minutes,
        },
        Command::Reset { facility, day } => Request::ResetDay { facility, day },
        Command::Incr { facility } => Request::IncrementUsage { facility },
        Command::Monitor {
            facility,
            seconds,
            callback_port,
        } => {
            return monitor(&mut client, &facility, seconds, callback_port, cli.json).await;
        }
    };

    let response = client.request(&request).await?;
    print_response(&response, cli.json)?;
    Ok(())
}

async fn monitor(
    client: &mut Client,
    facility: &str,
    seconds: u32,
    callback_port: u16,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut listener = CallbackListener::bind(([0, 0, 0, 0], callback_port).into()).await?;
    let port = listener.local_addr()?.port();
    client
        .monitor(facility, Duration::from_secs(u64::from(seconds)), port)
        .await?;
    info!("monitoring {facility} for {seconds}s on port {port}, ctrl-c to stop");

    loop {
        tokio::select! {
            update = listener.next() => {
                let Some(update) = update else { break };
                let (update, _from) = update?;
                if json {
                    println!("{}", serde_json::to_string(&update)?);
                } else {
                    let day = update.day().map_or("(fully booked day)".to_string(), |d| d.to_string());
                    println!("update for {facility} {day}:");
                    for iv in &update.intervals {
                        println!("  free {iv}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopping monitor");
                break;
            }
        }
    }
    Ok(())
}

fn print_response(response: &Response, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(response)?);
        return Ok(());
    }
    match response {
        Response::Availability(free) if free.is_empty() => println!("no free time"),
        Response::Availability(free) => {
            for iv in free {
                println!("free {iv}");
            }
        }
        Response::Booked(id) => println!("booked, id {id}"),
        Response::Changed(iv) => println!("moved to {iv}"),
        Response::Monitoring => println!("monitoring"),
        Response::Reset(removed) => println!("removed {removed} bookings"),
        Response::Usage(count) => println!("usage count {count}"),
    }
    Ok(())
}
