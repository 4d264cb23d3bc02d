//! Terminal commands: one line of stdin -> one user intent.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Grant,
    /// `scan` with no id means the user dismissed the chooser.
    Scan { id: Option<String>, name: Option<String> },
    Connect(String),
    Chat(String),
    Say(String),
    /// Remove the n-th message (1-based) of the open chat.
    Remove(usize),
    Clear,
    Camera,
    Nearby,
    Back,
    Flip,
    Snap(PathBuf),
    Captions,
    Pick(usize),
    Caption(String),
    Retake,
    Send,
    /// Simulate a message arriving from a peer.
    Incoming { from: String, text: String },
    Share,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
grant                      grant location + discovery access
scan [id [name]]           pick a nearby device (no id = dismiss chooser)
connect <id>               pair with a discovered device
chat <id>                  open the chat with a connected device
say <text>                 send text to the open chat
rm <n>                     remove the n-th message of the open chat
clear                      remove every message of the open chat
camera | nearby | back     navigate
flip                       switch front/back camera
snap <path>                take a photo (reads an image file)
captions                   ask for caption suggestions
pick <n>                   use the n-th suggestion
caption <text>             type a caption
retake                     drop the photo
send                       send the photo to the active peer
incoming <id> <text>       simulate a message from a peer
share                      share an invite link
show                       print the current screen
quit";

pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word {
        "grant" => Command::Grant,
        "scan" => {
            let (id, name) = split_first(rest);
            Command::Scan {
                id: id.map(str::to_string),
                name: name.map(str::to_string),
            }
        }
        "connect" => Command::Connect(required(rest, "connect <id>")?.to_string()),
        "chat" => Command::Chat(required(rest, "chat <id>")?.to_string()),
        "say" => Command::Say(required(rest, "say <text>")?.to_string()),
        "rm" => Command::Remove(index(rest, "rm <n>")?),
        "clear" => Command::Clear,
        "camera" => Command::Camera,
        "nearby" => Command::Nearby,
        "back" => Command::Back,
        "flip" => Command::Flip,
        "snap" => Command::Snap(PathBuf::from(required(rest, "snap <path>")?)),
        "captions" => Command::Captions,
        "pick" => Command::Pick(index(rest, "pick <n>")?),
        "caption" => Command::Caption(rest.to_string()),
        "retake" => Command::Retake,
        "send" => Command::Send,
        "incoming" => match split_first(rest) {
            (Some(from), Some(text)) => Command::Incoming {
                from: from.to_string(),
                text: text.to_string(),
            },
            _ => return Err(ParseError::Usage("incoming <id> <text>")),
        },
        "share" => Command::Share,
        "show" | "ls" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

fn split_first(rest: &str) -> (Option<&str>, Option<&str>) {
    if rest.is_empty() {
        return (None, None);
    }
    match rest.split_once(char::is_whitespace) {
        Some((a, b)) => (Some(a), Some(b.trim()).filter(|b| !b.is_empty())),
        None => (Some(rest), None),
    }
}

fn required<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, ParseError> {
    if rest.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(rest)
    }
}

/// 1-based index from the user -> 0-based.
fn index(rest: &str, usage: &'static str) -> Result<usize, ParseError> {
    match rest.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(ParseError::Usage(usage)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(parse("   "), Ok(None));
    }

    #[test]
    fn scan_variants() {
        assert_eq!(
            parse("scan").unwrap(),
            Some(Command::Scan {
                id: None,
                name: None
            })
        );
        assert_eq!(
            parse("scan a1 Sara's phone").unwrap(),
            Some(Command::Scan {
                id: Some("a1".into()),
                name: Some("Sara's phone".into())
            })
        );
    }

    #[test]
    fn text_keeps_inner_spaces() {
        assert_eq!(
            parse("say  hello  there ").unwrap(),
            Some(Command::Say("hello  there".into()))
        );
        assert_eq!(
            parse("incoming a1 hey you").unwrap(),
            Some(Command::Incoming {
                from: "a1".into(),
                text: "hey you".into()
            })
        );
    }

    #[test]
    fn indices_are_one_based() {
        assert_eq!(parse("pick 1").unwrap(), Some(Command::Pick(0)));
        assert_eq!(parse("rm 3").unwrap(), Some(Command::Remove(2)));
        assert_eq!(parse("pick 0"), Err(ParseError::Usage("pick <n>")));
    }

    #[test]
    fn usage_and_unknown_errors() {
        assert_eq!(parse("connect"), Err(ParseError::Usage("connect <id>")));
        assert_eq!(parse("incoming a1"), Err(ParseError::Usage("incoming <id> <text>")));
        assert_eq!(parse("dance"), Err(ParseError::Unknown("dance".into())));
    }

    #[test]
    fn snap_needs_a_path() {
        assert_eq!(parse("snap"), Err(ParseError::Usage("snap <path>")));
        assert_eq!(
            parse("snap /tmp/a.jpg").unwrap(),
            Some(Command::Snap(PathBuf::from("/tmp/a.jpg")))
        );
        assert_eq!(parse("share").unwrap(), Some(Command::Share));
    }
}
