//! Event dispatch and the holdout-gated lookup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use jinni_sdk::client::ClientHandle;
use jinni_sdk::event::Event;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::classify::{Classifier, Reference};
use crate::config::Config;
use crate::holdout::{HoldoutStore, Verdict};
use crate::lookup::Resolver;
use crate::nick;
use crate::output;

/// What happened to one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The user already pasted the canonical URL.
    Pasted,
    /// Another lookup for the same target and key was still running.
    InFlight,
    /// Transport error; nothing recorded, nothing said.
    Failed,
    Suppressed { remaining: Duration },
    Replied(String),
    /// Passed the gate but the status has no reply text.
    Silent { status: u16 },
}

pub struct Jinni {
    nickname: String,
    password: Option<String>,
    classifier: Classifier,
    resolver: Resolver,
    holdout: HoldoutStore,
    current_nick: watch::Sender<String>,
}

impl Jinni {
    pub fn new(config: &Config) -> Result<Self> {
        let (current_nick, _) = watch::channel(config.nickname.clone());
        Ok(Self {
            nickname: config.nickname.clone(),
            password: config.password.clone(),
            classifier: Classifier::new(&config.nickname, &config.bot)?,
            resolver: Resolver::new(&config.bot)?,
            holdout: HoldoutStore::new(config.bot.holdout()),
            current_nick,
        })
    }

    pub fn holdout(&self) -> &HoldoutStore {
        &self.holdout
    }

    /// The nick the server currently knows us by.
    pub fn current_nick(&self) -> String {
        self.current_nick.borrow().clone()
    }

    pub async fn handle_event(self: &Arc<Self>, handle: &ClientHandle, event: Event) -> Result<()> {
        match event {
            Event::Connected => tracing::info!("Connected"),

            Event::Registered { nick } => {
                tracing::info!(%nick, "Registered");
                self.current_nick.send_replace(nick.clone());
                if let Some(pw) = &self.password {
                    nick::identify(handle, pw).await?;
                }
                if !nick::same_nick(&nick, &self.nickname) {
                    self.spawn_reclaim(handle);
                }
            }

            Event::NickChanged { old_nick, new_nick } => {
                if nick::same_nick(&old_nick, &self.current_nick()) {
                    tracing::info!(old = %old_nick, new = %new_nick, "Our nick changed");
                    self.current_nick.send_replace(new_nick);
                }
            }

            Event::Joined { channel, nick } => {
                if nick::same_nick(&nick, &self.current_nick()) {
                    tracing::info!(%channel, "Joined channel");
                }
            }

            Event::Names { channel, nicks } => {
                tracing::debug!(%channel, count = nicks.len(), "Names");
            }

            Event::Motd { text } => tracing::debug!(motd = %text),

            Event::Message { from, target, text } => {
                if nick::same_nick(&from, &self.current_nick()) {
                    return Ok(());
                }
                let bot = Arc::clone(self);
                let handle = handle.clone();
                tokio::spawn(async move {
                    bot.on_message(&handle, &from, &target, &text).await;
                });
            }

            Event::Notice { from, text, .. } => {
                if from.eq_ignore_ascii_case(nick::NICKSERV) {
                    tracing::info!(%text, "NickServ");
                }
            }

            Event::ServerNotice { text } => tracing::debug!(%text, "Server notice"),

            Event::Disconnected { reason } => tracing::warn!(%reason, "Disconnected"),

            Event::Parted { .. } => {}
        }
        Ok(())
    }

    fn spawn_reclaim(&self, handle: &ClientHandle) {
        let handle = handle.clone();
        let current = self.current_nick.subscribe();
        let intended = self.nickname.clone();
        let password = self.password.clone();
        tokio::spawn(async move {
            if let Err(e) = nick::reclaim(
                &handle,
                &current,
                &intended,
                password.as_deref(),
                nick::RECLAIM_DELAY,
            )
            .await
            {
                tracing::warn!(error = %e, "Nick recovery stopped");
            }
        });
    }

    /// Classify one line and run every resulting lookup concurrently.
    /// Returns one outcome per reference, in classification order.
    pub async fn on_message(
        &self,
        handle: &ClientHandle,
        from: &str,
        to: &str,
        text: &str,
    ) -> Vec<Outcome> {
        // If sent as a private message, respond with a private message.
        let reply_to = if nick::same_nick(to, &self.current_nick()) {
            from
        } else {
            to
        };

        let classified = self.classifier.classify(text);
        if classified.is_empty() {
            return Vec::new();
        }

        if classified.changelog {
            tracing::info!(%from, %to, %reply_to, "Matched changelog");
            if let Err(e) = output::say(handle, reply_to, self.resolver.changelog_url()).await {
                tracing::error!(error = %e, "Failed to send changelog");
            }
        }

        let checks = classified.references.iter().map(|reference| {
            tracing::info!(
                %from, %to, %reply_to,
                kind = reference.kind(),
                key = %reference.key(),
                "Matched reference"
            );
            self.check(handle, to, reply_to, reference)
        });
        join_all(checks).await
    }

    /// The holdout-gated lookup for a single reference.
    ///
    /// `target` keys the holdout table; `reply_to` is where text goes.
    pub async fn check(
        &self,
        handle: &ClientHandle,
        target: &str,
        reply_to: &str,
        reference: &Reference,
    ) -> Outcome {
        let key = reference.key();

        if reference.pasted() {
            tracing::info!(%key, "Looks like a pasted URL, ignoring");
            return Outcome::Pasted;
        }

        let Some(_claim) = self.holdout.begin(target, &key) else {
            tracing::info!(%key, %target, "Lookup already in flight, skipping");
            return Outcome::InFlight;
        };

        let previous = self.holdout.record(target, &key);
        tracing::info!(
            %key, %target,
            url = %self.resolver.probe_url(reference),
            last_status = previous.map(|r| r.status),
            "Need to look up a reference"
        );

        let status = match self.resolver.status(reference).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(%key, error = %format!("{e:#}"), "Lookup failed");
                return Outcome::Failed;
            }
        };
        tracing::info!(%key, status, "Lookup complete");

        match self.holdout.evaluate(target, &key, status, Instant::now()) {
            Verdict::Suppress { remaining } => {
                tracing::info!(
                    %key, %target,
                    remaining_secs = remaining.as_secs_f64(),
                    "Waiting an additional {:.1} seconds before replying for {key} in {target}",
                    remaining.as_secs_f64()
                );
                Outcome::Suppressed { remaining }
            }
            Verdict::Proceed { .. } => match self.resolver.reply_for(reference, status) {
                Some(text) => {
                    if let Err(e) = output::say(handle, reply_to, &text).await {
                        tracing::error!(%key, error = %e, "Failed to send reply");
                    }
                    Outcome::Replied(text)
                }
                None => {
                    tracing::info!(%key, status, "No reply");
                    Outcome::Silent { status }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinni_sdk::client::Command;

    fn jinni(password: Option<&str>) -> Arc<Jinni> {
        let config: Config = serde_json::from_value(serde_json::json!({
            "server": "irc.example.net",
            "nickname": "jinni",
            "password": password,
            "channels": ["#ops"],
        }))
        .unwrap();
        Arc::new(Jinni::new(&config).unwrap())
    }

    #[tokio::test]
    async fn registering_under_our_nick_only_identifies() {
        let bot = jinni(Some("pw"));
        let (handle, mut rx) = ClientHandle::loopback(8);
        bot.handle_event(&handle, Event::Registered { nick: "jinni".into() })
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Command::Privmsg { target: "NickServ".into(), text: "IDENTIFY pw".into() })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn registering_under_a_fallback_starts_recovery() {
        let bot = jinni(None);
        let (handle, mut rx) = ClientHandle::loopback(8);
        bot.handle_event(&handle, Event::Registered { nick: "jinni1".into() })
            .await
            .unwrap();
        assert_eq!(bot.current_nick(), "jinni1");
        assert_eq!(
            rx.recv().await,
            Some(Command::Privmsg { target: "NickServ".into(), text: "GHOST jinni".into() })
        );
        assert_eq!(rx.recv().await, Some(Command::Raw("NICK jinni".into())));

        bot.handle_event(
            &handle,
            Event::NickChanged { old_nick: "jinni1".into(), new_nick: "jinni".into() },
        )
        .await
        .unwrap();
        assert_eq!(bot.current_nick(), "jinni");
    }

    #[tokio::test]
    async fn other_users_nick_changes_are_ignored() {
        let bot = jinni(None);
        let (handle, _rx) = ClientHandle::loopback(8);
        bot.handle_event(
            &handle,
            Event::NickChanged { old_nick: "alice".into(), new_nick: "jinni".into() },
        )
        .await
        .unwrap();
        assert_eq!(bot.current_nick(), "jinni");
        bot.handle_event(
            &handle,
            Event::NickChanged { old_nick: "bob".into(), new_nick: "bobby".into() },
        )
        .await
        .unwrap();
        assert_eq!(bot.current_nick(), "jinni");
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let bot = jinni(None);
        let (handle, mut rx) = ClientHandle::loopback(8);
        bot.handle_event(
            &handle,
            Event::Message {
                from: "jinni".into(),
                target: "#ops".into(),
                text: "jinni: changelog".into(),
            },
        )
        .await
        .unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn changelog_goes_to_the_channel() {
        let bot = jinni(None);
        let (handle, mut rx) = ClientHandle::loopback(8);
        let outcomes = bot.on_message(&handle, "alice", "#ops", "Jinni changelog please").await;
        assert!(outcomes.is_empty());
        assert_eq!(
            rx.recv().await,
            Some(Command::Privmsg {
                target: "#ops".into(),
                text: "http://us-east.manta.joyent.com/Joyent_Dev/public/SmartOS/smartos.html"
                    .into(),
            })
        );
    }
}
