use std::future::Future;
use std::io;

use gemchat_core::{ChatController, ChatError, ChatResult};
use gemchat_storage::{Message, MessageId, Sender, SessionId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

pub const HELP: &str = "\
commands:
  <text>                    send a prompt to the current session
  /image <data-url> <text>  send a prompt with an attached image
  /sessions                 list sessions
  /new                      start a new session
  /open <session-id>        switch to a session
  /show                     print the current session
  /edit <message-id> <text> rewrite one of your messages and regenerate the reply
  /retry                    regenerate the reply for the last failed edit
  /save                     write all sessions to the backend
  /help                     show this help
  /quit                     exit (Ctrl-C at the prompt does the same)

Ctrl-C while a request runs cancels that request.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send { text: String, image: Option<String> },
    Sessions,
    New,
    Open(SessionId),
    Show,
    Edit { message_id: MessageId, text: String },
    Retry,
    Save,
    Help,
    Quit,
    Empty,
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send {
                text: line.to_string(),
                image: None,
            };
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        match name {
            "sessions" => Self::Sessions,
            "new" => Self::New,
            "show" => Self::Show,
            "retry" => Self::Retry,
            "save" => Self::Save,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "open" => match SessionId::parse(args) {
                Ok(session_id) => Self::Open(session_id),
                Err(_) => Self::Usage("/open <session-id>"),
            },
            "edit" => match split_argument(args) {
                Some((message_id, text)) => match MessageId::parse(message_id) {
                    Ok(message_id) => Self::Edit {
                        message_id,
                        text: text.to_string(),
                    },
                    Err(_) => Self::Usage("/edit <message-id> <text>"),
                },
                None => Self::Usage("/edit <message-id> <text>"),
            },
            "image" => match split_argument(args) {
                Some((image, text)) => Self::Send {
                    text: text.to_string(),
                    image: Some(image.to_string()),
                },
                None => Self::Usage("/image <data-url> <text>"),
            },
            other => Self::Unknown(other.to_string()),
        }
    }
}

fn split_argument(args: &str) -> Option<(&str, &str)> {
    let (head, tail) = args.split_once(char::is_whitespace)?;
    let tail = tail.trim();
    if tail.is_empty() {
        None
    } else {
        Some((head, tail))
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Reads commands line by line until `/quit`, end of input or Ctrl-C at the
/// prompt. Ctrl-C while a request runs only cancels that request.
pub async fn run<R, W>(controller: &mut ChatController, input: R, output: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    run_until(controller, input, output, interrupted).await
}

async fn run_until<R, W, I, F>(
    controller: &mut ChatController,
    input: R,
    output: &mut W,
    interrupt: I,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    I: Fn() -> F,
    F: Future<Output = ()>,
{
    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let line = tokio::select! {
            biased;
            line = lines.next_line() => line?,
            () = interrupt() => {
                output.write_all(b"\n").await?;
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if let Flow::Quit = execute(controller, Command::parse(&line), output, &interrupt).await? {
            break;
        }
    }
    output.flush().await
}

async fn execute<W, I, F>(
    controller: &mut ChatController,
    command: Command,
    output: &mut W,
    interrupt: &I,
) -> io::Result<Flow>
where
    W: AsyncWrite + Unpin,
    I: Fn() -> F,
    F: Future<Output = ()>,
{
    match command {
        Command::Empty => {}
        Command::Quit => return Ok(Flow::Quit),
        Command::Help => output.write_all(HELP.as_bytes()).await?,
        Command::Usage(usage) => write_line(output, &format!("usage: {usage}")).await?,
        Command::Unknown(name) => {
            write_line(output, &format!("unknown command '/{name}', type /help")).await?
        }
        Command::Sessions => {
            let current = controller.store().current_session_id().cloned();
            for session in controller.store().sessions() {
                let marker = if Some(&session.id) == current.as_ref() {
                    '*'
                } else {
                    ' '
                };
                let line = format!(
                    "{marker} {} ({} messages)",
                    session.id,
                    session.messages.len()
                );
                write_line(output, &line).await?;
            }
        }
        Command::New => {
            let session_id = controller.create_session();
            write_line(output, &format!("new session {session_id}")).await?;
        }
        Command::Open(session_id) => match controller.select_session(&session_id) {
            Ok(()) => write_line(output, &format!("opened {session_id}")).await?,
            Err(error) => report(output, &error.reason()).await?,
        },
        Command::Show => match controller.store().current_session() {
            Some(session) => {
                for message in &session.messages {
                    write_line(output, &render(message)).await?;
                }
            }
            None => report(output, "No current session found").await?,
        },
        Command::Send { text, image } => {
            let cancel = controller.cancellation();
            let work = controller.send_prompt(&text, image);
            let outcome = interruptible(cancel, work, interrupt()).await;
            if show_reply(output, outcome).await? {
                if let Err(error) = controller.save().await {
                    write_line(output, &format!("warning: {}", error.reason())).await?;
                }
            }
        }
        Command::Edit { message_id, text } => {
            let Some(session_id) = controller.store().current_session_id().cloned() else {
                report(output, "No current session found").await?;
                return Ok(Flow::Continue);
            };
            if let Err(error) = controller.begin_edit(&message_id) {
                report(output, &error.reason()).await?;
                return Ok(Flow::Continue);
            }
            controller.set_draft(text.clone());

            let cancel = controller.cancellation();
            let work = controller.save_edit(&session_id, &message_id, text);
            let outcome = interruptible(cancel, work, interrupt()).await;
            let unsaved = matches!(&outcome, Err(ChatError::Persistence { .. }));
            if !show_reply(output, outcome).await? {
                if unsaved {
                    write_line(output, "the reply is kept; /save writes it again").await?;
                } else if controller.edits().pending_regeneration().is_some() {
                    write_line(output, "the edit is kept; /retry regenerates the reply").await?;
                }
            }
        }
        Command::Retry => {
            let cancel = controller.cancellation();
            let work = controller.retry_last_edit();
            let outcome = interruptible(cancel, work, interrupt()).await;
            show_reply(output, outcome).await?;
        }
        Command::Save => match controller.save().await {
            Ok(()) => write_line(output, "saved").await?,
            Err(error) => report(output, &error.reason()).await?,
        },
    }
    Ok(Flow::Continue)
}

/// Runs `work`, cancelling its token when `interrupt` fires first.
async fn interruptible<T>(
    cancel: CancellationToken,
    work: impl Future<Output = ChatResult<T>>,
    interrupt: impl Future<Output = ()>,
) -> ChatResult<T> {
    tokio::pin!(work);
    tokio::select! {
        outcome = &mut work => outcome,
        () = interrupt => {
            cancel.cancel();
            work.await
        }
    }
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn show_reply<W>(output: &mut W, outcome: ChatResult<Message>) -> io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    match outcome {
        Ok(reply) => {
            write_line(output, &render(&reply)).await?;
            Ok(true)
        }
        Err(error) if error.is_cancelled() => {
            write_line(output, "cancelled").await?;
            Ok(false)
        }
        Err(error) => {
            report(output, &error.reason()).await?;
            Ok(false)
        }
    }
}

fn render(message: &Message) -> String {
    let speaker = match message.sender {
        Sender::User => "you",
        Sender::Ai => "ai",
    };
    format!("[{}] {speaker}> {}", message.id, message.text.to_plain_string())
}

async fn report<W>(output: &mut W, reason: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_line(output, &format!("error: {reason}")).await
}

async fn write_line<W>(output: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await
}
