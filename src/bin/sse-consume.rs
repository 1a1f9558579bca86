//! Minimal consumer for server-sent event streams: prints every event and
//! every ready-state transition until the stream closes or Ctrl-C.

use anyhow::Context;
use clap::Parser;
use reqwest::Url;
use sse_client::{EventSource, ReadyState, RequestModifier, with_basic_auth, with_bearer_token_auth};

#[derive(Debug, Parser)]
#[command(name = "sse-consume", about = "Subscribe to a server-sent events endpoint")]
struct Args {
    /// Username to use for basic auth.
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Password to use for basic auth.
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Authorization bearer token.
    #[arg(long, conflicts_with_all = ["username", "password"])]
    token: Option<String>,

    /// Endpoint serving text/event-stream.
    url: Url,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let mut modifiers: Vec<RequestModifier> = Vec::new();
    if let (Some(username), Some(password)) = (args.username, args.password) {
        modifiers.push(with_basic_auth(username, password));
    }
    if let Some(token) = args.token {
        modifiers.push(with_bearer_token_auth(token));
    }

    let (mut source, connected) = EventSource::new(args.url, modifiers).await;
    let mut events = source.events().context("event channel already taken")?;
    let mut statuses = source.ready_state().context("status channel already taken")?;
    connected.context("cannot connect")?;

    let mut events_open = true;
    loop {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    let id = event.id.as_deref().unwrap_or("");
                    println!("id: {id}\nevent: {}\ndata: {}\n", event.name, event.data);
                }
                None => events_open = false,
            },
            status = statuses.recv() => match status {
                Some(status) => {
                    match &status.error {
                        Some(error) => println!("state={} err={error}", status.ready_state),
                        None => println!("state={}", status.ready_state),
                    }
                    if status.ready_state == ReadyState::Closed {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => source.close(),
        }
    }
    Ok(())
}
