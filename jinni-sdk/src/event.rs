//! Events emitted by the IRC client for the bot layer to consume.

/// Events that the SDK emits to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// TCP (and TLS, if enabled) is up; registration has started.
    Connected,

    /// IRC registration complete. `nick` is the nick the server accepted,
    /// which may be a fallback if the configured one was taken.
    Registered {
        nick: String,
    },

    /// Someone (possibly us) joined a channel.
    Joined {
        channel: String,
        nick: String,
    },

    /// Someone left a channel.
    Parted {
        channel: String,
        nick: String,
    },

    /// A PRIVMSG in a channel or addressed to us.
    Message {
        from: String,
        target: String,
        text: String,
    },

    /// A NOTICE from a user or service (NickServ replies arrive here).
    Notice {
        from: String,
        target: String,
        text: String,
    },

    /// NAMES list for a channel (one 353 reply; may arrive in parts).
    Names {
        channel: String,
        nicks: Vec<String>,
    },

    /// A user changed nick.
    NickChanged {
        old_nick: String,
        new_nick: String,
    },

    /// One MOTD body line.
    Motd {
        text: String,
    },

    /// Server notice, error numeric, or ERROR line.
    ServerNotice {
        text: String,
    },

    /// Connection was closed.
    Disconnected {
        reason: String,
    },
}
