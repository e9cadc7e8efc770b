//! Client registration tests against a scripted loopback server.
//!
//! Tests cover:
//! - NICK/USER handshake and the Registered event
//! - PING answered with PONG
//! - PRIVMSG delivered as Event::Message, sends flushed to the wire
//! - Nick-in-use fallback before registration
//! - EOF surfaces as Event::Disconnected

use std::time::Duration;

use jinni_sdk::client::{self, ConnectConfig};
use jinni_sdk::event::Event;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

async fn listen() -> (TcpListener, ConnectConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ConnectConfig {
        server_addr: listener.local_addr().unwrap().to_string(),
        nick: "jinni".to_string(),
        user: "jinni".to_string(),
        realname: "jinni test".to_string(),
        tls: false,
        tls_insecure: false,
    };
    (listener, config)
}

async fn accept(
    listener: TcpListener,
) -> (tokio::io::Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
    let (sock, _) = listener.accept().await.unwrap();
    let (r, w) = sock.into_split();
    (BufReader::new(r).lines(), w)
}

async fn next_event(events: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream closed")
}

#[tokio::test]
async fn registers_answers_ping_and_relays_messages() {
    let (listener, config) = listen().await;
    let (seen_tx, mut seen_rx) = mpsc::channel::<String>(32);

    tokio::spawn(async move {
        let (mut lines, mut w) = accept(listener).await;
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK jinni");
        let user = lines.next_line().await.unwrap().unwrap();
        assert_eq!(user, "USER jinni 0 * :jinni test");
        w.write_all(b":irc.test 001 jinni :Welcome\r\n").await.unwrap();
        w.write_all(b"PING :abc\r\n").await.unwrap();
        w.write_all(b":alice!a@host PRIVMSG #ops :see FOO-123\r\n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            if seen_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let conn = client::establish_connection(&config).await.unwrap();
    let (handle, mut events) = client::connect_with_stream(conn, config);

    assert_eq!(next_event(&mut events).await, Event::Connected);
    assert_eq!(
        next_event(&mut events).await,
        Event::Registered { nick: "jinni".into() }
    );
    assert_eq!(
        next_event(&mut events).await,
        Event::Message {
            from: "alice".into(),
            target: "#ops".into(),
            text: "see FOO-123".into(),
        }
    );

    handle.privmsg("#ops", "https://smartos.org/bugview/FOO-123").await.unwrap();

    let mut seen = Vec::new();
    while let Ok(Some(line)) = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv()).await {
        let done = line.starts_with("PRIVMSG");
        seen.push(line);
        if done {
            break;
        }
    }
    assert!(seen.contains(&"PONG :abc".to_string()), "no PONG in {seen:?}");
    assert_eq!(
        seen.last().map(String::as_str),
        Some("PRIVMSG #ops :https://smartos.org/bugview/FOO-123")
    );
}

#[tokio::test]
async fn nick_in_use_falls_back_before_registration() {
    let (listener, config) = listen().await;

    tokio::spawn(async move {
        let (mut lines, mut w) = accept(listener).await;
        lines.next_line().await.unwrap();
        lines.next_line().await.unwrap();
        w.write_all(b":irc.test 433 * jinni :Nickname is already in use\r\n")
            .await
            .unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK jinni1");
        w.write_all(b":irc.test 001 jinni1 :Welcome\r\n").await.unwrap();
        // Hold the socket open until the client is done.
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    let conn = client::establish_connection(&config).await.unwrap();
    let (_handle, mut events) = client::connect_with_stream(conn, config);

    assert_eq!(next_event(&mut events).await, Event::Connected);
    assert_eq!(
        next_event(&mut events).await,
        Event::Registered { nick: "jinni1".into() }
    );
}

#[tokio::test]
async fn server_close_is_reported_as_disconnect() {
    let (listener, config) = listen().await;

    tokio::spawn(async move {
        let (mut lines, w) = accept(listener).await;
        lines.next_line().await.unwrap();
        lines.next_line().await.unwrap();
        drop(w);
        drop(lines);
    });

    let conn = client::establish_connection(&config).await.unwrap();
    let (_handle, mut events) = client::connect_with_stream(conn, config);

    assert_eq!(next_event(&mut events).await, Event::Connected);
    assert_eq!(
        next_event(&mut events).await,
        Event::Disconnected { reason: "EOF".into() }
    );
}
