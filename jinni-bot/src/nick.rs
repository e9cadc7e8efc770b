//! Nick recovery.
//!
//! When a stale session still holds our nick, the server registers us under
//! a fallback (`jinni1`). We then ask NickServ to ghost the old session and
//! take the nick back, retrying until it sticks or the connection goes away.

use std::time::Duration;

use anyhow::Result;
use jinni_sdk::client::ClientHandle;
use tokio::sync::watch;

pub const NICKSERV: &str = "NickServ";
/// Pause between GHOST and NICK, and between NICK and the next check.
pub const RECLAIM_DELAY: Duration = Duration::from_secs(1);

pub fn same_nick(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Identify with NickServ after registration.
pub async fn identify(handle: &ClientHandle, password: &str) -> Result<()> {
    handle
        .privmsg(NICKSERV, &format!("IDENTIFY {password}"))
        .await
}

/// Loop until `current` reports `intended`. There is no attempt cap; the
/// loop ends with an error when the connection handle closes.
pub async fn reclaim(
    handle: &ClientHandle,
    current: &watch::Receiver<String>,
    intended: &str,
    password: Option<&str>,
    delay: Duration,
) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        let now = current.borrow().clone();
        if same_nick(&now, intended) {
            if attempt > 0 {
                tracing::info!(nick = intended, attempt, "Nick reclaimed");
            }
            return Ok(());
        }

        attempt += 1;
        tracing::warn!(
            current = %now,
            nick = intended,
            attempt,
            "Ghosted, asking NickServ to release nick"
        );
        let ghost = match password {
            Some(pw) => format!("GHOST {intended} {pw}"),
            None => format!("GHOST {intended}"),
        };
        handle.privmsg(NICKSERV, &ghost).await?;
        tokio::time::sleep(delay).await;
        handle.nick(intended).await?;
        tokio::time::sleep(delay).await;
    }
}
