//! EventSource Stream Example
//!
//! Connects to a Server-Sent Events endpoint and prints every notification
//! until the connection fails permanently or Ctrl-C is pressed.
//!
//! Run with: `cargo run -p hpx-eventsource --example eventsource_stream -- http://localhost:8080/events`

use std::time::Duration;

use hpx_eventsource::{EventSource, EventSourceConfig, Notification};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080/events".to_string());

    let config = EventSourceConfig::new(url)
        .reconnection_interval(Duration::from_millis(500))
        .max_reconnect_delay(Duration::from_secs(30));
    let (handle, mut stream) = EventSource::connect_http(config).await?.split();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.close();
                break;
            }
            notification = stream.next_notification() => match notification {
                Some(Notification::Open) => println!("[open] {}", handle.url()),
                Some(Notification::Message(event)) => {
                    println!(
                        "[{}] id={:?} {}",
                        event.event_type(),
                        event.last_event_id(),
                        event.data()
                    );
                }
                Some(Notification::Error(err)) if err.reconnecting => {
                    println!("[error] {}, reconnecting", err.reason);
                }
                Some(Notification::Error(err)) => {
                    println!("[error] {}, giving up", err.reason);
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    println!("final state: {}", handle.ready_state());
    Ok(())
}
