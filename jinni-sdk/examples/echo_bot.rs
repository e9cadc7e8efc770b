//! Echo bot: joins a channel and repeats anything addressed to it.
//! `echo: quit` makes it leave.
//!
//! Usage:
//!   cargo run -p jinni-sdk --example echo_bot -- irc.example.net:6667 '#bots'

use anyhow::Result;
use jinni_sdk::client::{self, ConnectConfig};
use jinni_sdk::event::Event;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jinni_sdk=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let server_addr = args.next().unwrap_or_else(|| "127.0.0.1:6667".to_string());
    let channel = args.next().unwrap_or_else(|| "#bots".to_string());

    let config = ConnectConfig {
        server_addr,
        nick: "echo".to_string(),
        user: "echo".to_string(),
        realname: "jinni-sdk echo example".to_string(),
        ..Default::default()
    };

    let (handle, mut events) = client::connect(config);
    let mut nick = String::new();

    while let Some(event) = events.recv().await {
        match event {
            Event::Registered { nick: n } => {
                tracing::info!(nick = %n, "Registered");
                nick = n;
                handle.join(&channel).await?;
            }
            Event::Message { from, target, text } => {
                let prefix = format!("{nick}: ");
                if text == format!("{prefix}quit") {
                    handle.quit(Some("bye")).await?;
                } else if let Some(rest) = text.strip_prefix(&prefix) {
                    let reply_to = if target == nick { &from } else { &target };
                    handle.privmsg(reply_to, &format!("{from}: {rest}")).await?;
                }
            }
            Event::Disconnected { reason } => {
                tracing::warn!(%reason, "Disconnected");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
