//! Console front end: stdin line stream and the interactive chat loop.

use std::io::Write;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::Error;
use crate::screening::ScreeningSession;

pub type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Trimmed, non-empty stdin lines. Ends on EOF or read error.
pub fn stdin_lines() -> LineStream {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|line| (line, rx))
    }))
}

fn is_quit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "quit" | "/quit" | "exit" | "/exit")
}

/// Ask until a parseable answer arrives. `None` on EOF or quit.
async fn ask<S, W, T, F>(lines: &mut S, out: &mut W, question: &str, parse: F) -> Option<T>
where
    S: Stream<Item = String> + Unpin,
    W: Write,
    F: Fn(&str) -> Option<T>,
{
    loop {
        let _ = write!(out, "{question} ");
        let _ = out.flush();
        let line = lines.next().await?;
        if is_quit(&line) {
            return None;
        }
        match parse(&line) {
            Some(value) => return Some(value),
            None => {
                let _ = writeln!(out, "Sorry, I didn't catch that.");
            }
        }
    }
}

/// Collect patient details, start the session, then relay turns until the
/// conversation ends, the user quits, or input runs out.
pub async fn run_chat<S, W>(session: &ScreeningSession, mut lines: S, out: &mut W) -> Result<(), Error>
where
    S: Stream<Item = String> + Unpin,
    W: Write,
{
    let Some(name) = ask(&mut lines, out, "Your name:", |l| Some(l.to_string())).await else {
        return Ok(());
    };
    let Some(age) = ask(&mut lines, out, "Your age:", |l| {
        l.parse::<u32>().ok().filter(|age| (1..=120).contains(age))
    })
    .await
    else {
        return Ok(());
    };
    let Some(gender) = ask(&mut lines, out, "Your gender:", |l| Some(l.to_string())).await else {
        return Ok(());
    };

    let (patient, welcome) = session.start(&name, age, &gender).await?;
    tracing::debug!(patient = %patient.id, "Chat started");
    let _ = writeln!(out, "\n{welcome}\n");

    while let Some(line) = lines.next().await {
        if is_quit(&line) {
            break;
        }
        let turn = session.turn(&line).await?;
        if let Some(reply) = turn.reply {
            let _ = writeln!(out, "\n{reply}\n");
        }
        if turn.finished {
            break;
        }
    }
    Ok(())
}
