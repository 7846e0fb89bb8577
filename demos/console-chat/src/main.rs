//! A terminal client for a Hot Topics chat server.
//!
//! Run it against a local server with:
//!
//! ```text
//! cargo run -p console-chat -- ws://127.0.0.1:8025/hottopics/chat
//! ```
//!
//! The program walks through three steps: pick a username, pick a room,
//! then chat. Everything typed at the chat prompt is sent as a message,
//! except for the slash commands listed by [`parse`].
//! Incoming chat messages and room size updates are pushed to observers and
//! printed as they arrive, while the login and room screens use
//! request/response exchanges. Set `RUST_LOG=hottopics_client=debug` to see
//! the packet traffic.

use std::sync::Arc;
use std::time::Duration;

use hottopics_client::hottopics_protocol::MAX_MESSAGE_LENGTH;
use hottopics_client::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Say(String),
    Rooms,
    Leave,
    Quit,
}

/// Turns one line typed at the chat prompt into a command.
///
/// Blank lines are ignored. Any line that isn't one of `/rooms`, `/leave`
/// or `/quit` is chat text, including unknown slash commands.
fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    match line {
        "" => None,
        "/rooms" => Some(Command::Rooms),
        "/leave" => Some(Command::Leave),
        "/quit" => Some(Command::Quit),
        text => Some(Command::Say(text.to_string())),
    }
}

type Input = Lines<BufReader<Stdin>>;

/// `None` once stdin is closed.
async fn prompt(input: &mut Input, question: &str) -> Option<String> {
    eprint!("{question} ");
    match input.next_line().await {
        Ok(Some(line)) => Some(line.trim().to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Chat flow
// ---------------------------------------------------------------------------

async fn login(client: &ChatClient, input: &mut Input) -> Result<Option<String>, ClientError> {
    loop {
        let Some(name) = prompt(input, "username:").await else {
            return Ok(None);
        };
        if let Err(e) = UsernameRequest::check(&name) {
            eprintln!("  {e}");
            continue;
        }
        if client.exchange(UsernameRequest::new(&name)).await?.response {
            return Ok(Some(name));
        }
        eprintln!("  {name} is taken");
    }
}

async fn choose_room(
    client: &ChatClient,
    input: &mut Input,
) -> Result<Option<String>, ClientError> {
    loop {
        let rooms = client.exchange(ChatroomsRequest {}).await?;
        eprintln!("rooms:");
        for room in &rooms.chatrooms {
            eprintln!("  {}", room.name);
        }
        let Some(name) = prompt(input, "join:").await else {
            return Ok(None);
        };
        if client.exchange(JoinChatroomRequest::new(&name)).await?.response {
            return Ok(Some(name));
        }
        eprintln!("  could not join {name}");
    }
}

/// Prints every packet of kind `T` as it arrives.
///
/// The router also buffers each packet for polling. Nothing in this program
/// polls broadcast kinds, so the observer removes the buffered copy once it
/// has shown it; otherwise the buffer would grow for as long as the chat
/// runs.
fn show_broadcasts<T, F>(client: &ChatClient, show: F) -> ObserverId
where
    T: PacketBody,
    F: Fn(&T) + Send + Sync + 'static,
{
    let router = Arc::downgrade(client.connection().router());
    client.observe::<T, _>(move |body| {
        show(body);
        if let Some(router) = router.upgrade() {
            let _ = router.take::<T>();
        }
    })
}

/// Keeps the session alive by exchanging an acknowledgement every
/// [`KEEPALIVE_INTERVAL`] while connected.
fn spawn_keepalive(client: ChatClient) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
        ticker.tick().await;
        while client.is_connected() {
            ticker.tick().await;
            if let Err(e) = client.exchange(AcknowledgementRequest {}).await {
                tracing::warn!(error = %e, "keep-alive went unanswered");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HOTTOPICS_URL").ok())
        .unwrap_or_else(|| hottopics_client::DEFAULT_SERVER_URL.to_string());

    let client = ChatClient::builder().url(url.as_str()).build()?;
    if !client.connect_and_wait().await {
        return Err(format!("could not reach {url}").into());
    }
    eprintln!("connected to {url}");

    let mut state = client.subscribe_state();
    tokio::spawn(async move {
        if state.wait_for(|s| *s == ConnectionState::Disconnected).await.is_ok() {
            eprintln!("*** connection lost");
        }
    });
    spawn_keepalive(client.clone());

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let Some(me) = login(&client, &mut input).await? else {
        client.disconnect();
        return Ok(());
    };

    show_broadcasts::<ReceiveMessage, _>(&client, |msg| {
        println!("<{}> {}", msg.author, msg.message);
    });
    show_broadcasts::<ChatroomUserCountUpdate, _>(&client, |update| {
        eprintln!("*** {} users here", update.size);
    });

    let Some(mut room) = choose_room(&client, &mut input).await? else {
        client.disconnect();
        return Ok(());
    };
    eprintln!("joined {room} as {me} (/rooms, /leave, /quit)");

    while let Ok(Some(line)) = input.next_line().await {
        match parse(&line) {
            None => {}
            Some(Command::Say(text)) => {
                let message = SendMessage::new(text);
                if message.is_valid() {
                    client.send(message);
                } else {
                    eprintln!("  message must be 1-{MAX_MESSAGE_LENGTH} characters");
                }
            }
            Some(Command::Rooms) => {
                let rooms = client.exchange(ChatroomsRequest {}).await?;
                let names: Vec<&str> = rooms.chatrooms.iter().map(|r| r.name.as_str()).collect();
                eprintln!("rooms: {}", names.join(", "));
            }
            Some(Command::Leave) => {
                if client.exchange(LeaveChatroomRequest {}).await?.response {
                    eprintln!("left {room}");
                    match choose_room(&client, &mut input).await? {
                        Some(next) => room = next,
                        None => break,
                    }
                    eprintln!("joined {room}");
                }
            }
            Some(Command::Quit) => break,
        }
    }

    client.disconnect();
    Ok(())
}
