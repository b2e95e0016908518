use std::time::Duration;

use clap::Parser;
use redis_driver::config::DEFAULT_ADDR;
use redis_driver::{mapper, Client, ClientConfig, Request, Subscriber, SubscriberConfig};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(about = "Send a single command, or subscribe and print pushed messages")]
struct Args {
    /// Server address
    #[arg(short, long, env = "REDIS_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Timeout in milliseconds for connecting, sending and receiving
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,

    /// Channels to subscribe to
    #[arg(long, num_args = 1..)]
    subscribe: Vec<String>,

    /// Patterns to subscribe to
    #[arg(long, num_args = 1..)]
    psubscribe: Vec<String>,

    /// Command and arguments, e.g. `GET greeting`
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout_ms);

    if !args.subscribe.is_empty() || !args.psubscribe.is_empty() {
        let mut config = SubscriberConfig::new(args.addr);
        config.connect_timeout = timeout;

        let subscriber = Subscriber::new(config, |message| match message.pattern {
            Some(pattern) => println!(
                "{} ({}): {}",
                message.channel,
                pattern,
                String::from_utf8_lossy(&message.payload)
            ),
            None => println!(
                "{}: {}",
                message.channel,
                String::from_utf8_lossy(&message.payload)
            ),
        });
        if !args.subscribe.is_empty() {
            subscriber.subscribe(args.subscribe)?;
        }
        if !args.psubscribe.is_empty() {
            subscriber.psubscribe(args.psubscribe)?;
        }

        tokio::signal::ctrl_c().await?;
        subscriber.close();
        return Ok(());
    }

    let mut words = args.command.into_iter();
    let name = match words.next() {
        Some(name) => name,
        None => return Err("no command given".into()),
    };

    let config = ClientConfig {
        addr: args.addr,
        connect_timeout: timeout,
        send_timeout: timeout,
        receive_timeout: timeout,
        ..Default::default()
    };
    let client = Client::connect(&config).await?;

    let reply = client
        .execute(Request::new(&name).args(words), mapper::raw())
        .await?;
    println!("{}", reply);

    Ok(())
}
