//! Channel output.
//!
//! Replies are plain text, one IRC line per call to `privmsg`, broken on
//! word boundaries so nothing is truncated by the server.

use jinni_sdk::client::ClientHandle;

/// Longest text sent in one PRIVMSG; leaves room for the server prefix.
pub const MAX_LINE: usize = 400;

/// Send `text` to `target`, one line at a time.
pub async fn say(handle: &ClientHandle, target: &str, text: &str) -> anyhow::Result<()> {
    let lines = wrap_lines(text, MAX_LINE);
    let multi = lines.len() > 1;
    for line in lines {
        handle.privmsg(target, &line).await?;
        if multi {
            // Small delay between multi-line messages to avoid flood
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
    Ok(())
}

/// Wrap text into lines of at most `max_len` bytes, breaking on whitespace.
/// A single word longer than `max_len` is split on a char boundary.
fn wrap_lines(text: &str, max_len: usize) -> Vec<String> {
    let mut result = Vec::new();
    for line in text.lines() {
        if line.len() <= max_len {
            if !line.trim().is_empty() {
                result.push(line.to_string());
            }
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            if !current.is_empty() && current.len() + word.len() + 1 > max_len {
                result.push(std::mem::take(&mut current));
            }
            let mut word = word;
            while word.len() > max_len {
                let mut cut = max_len;
                while !word.is_char_boundary(cut) {
                    cut -= 1;
                }
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                result.push(word[..cut].to_string());
                word = &word[cut..];
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinni_sdk::client::Command;

    #[test]
    fn short_text_is_one_line() {
        assert_eq!(wrap_lines("https://smartos.org/bugview/OS-1", 400), vec![
            "https://smartos.org/bugview/OS-1"
        ]);
    }

    #[test]
    fn newlines_become_separate_lines() {
        assert_eq!(wrap_lines("a\r\nb\n\nc", 400), vec!["a", "b", "c"]);
    }

    #[test]
    fn long_lines_break_on_words() {
        let lines = wrap_lines("aaa bbb ccc ddd", 7);
        assert_eq!(lines, vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn oversized_word_is_split() {
        let lines = wrap_lines("xx abcdefghij", 4);
        assert_eq!(lines, vec!["xx", "abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn say_sends_privmsg() {
        let (handle, mut rx) = ClientHandle::loopback(4);
        say(&handle, "#ops", "hello").await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Command::Privmsg { target: "#ops".into(), text: "hello".into() })
        );
    }
}
