use clap::{Parser, Subcommand};

use sockjs_xhr::client::{ClientError, XhrClient};
use sockjs_xhr::protocol::Frame;

#[derive(Parser)]
#[command(name = "sockjs-cli")]
#[command(about = "Client for SockJS XHR transports", long_about = None)]
struct Cli {
    /// Base URL including the prefix.
    #[arg(short, long, default_value = "http://127.0.0.1:8080/echo")]
    url: String,

    /// Server id segment; random when omitted.
    #[arg(long)]
    server: Option<String>,

    /// Session id segment; random when omitted.
    #[arg(long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the session and print each frame
    Poll {
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Open a streaming exchange and print frames until it ends
    Stream,
    /// Send messages to an existing session
    Send { messages: Vec<String> },
    /// Open a session, send messages and poll until they come back
    Echo { messages: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = match cli.session {
        Some(session) => {
            let server = cli.server.unwrap_or_else(|| "000".to_string());
            XhrClient::with_ids(&cli.url, server, session)?
        }
        None => XhrClient::new(&cli.url)?,
    };
    eprintln!("session {}/{}", client.server_id(), client.session_id());

    match cli.command {
        Commands::Poll { count } => {
            for _ in 0..count {
                for frame in client.poll().await? {
                    print_frame(&frame);
                }
            }
        }
        Commands::Stream => {
            let seen = client
                .stream(|frame| {
                    print_frame(&frame);
                    !matches!(frame, Frame::Close { .. })
                })
                .await?;
            eprintln!("stream ended after {} frames", seen);
        }
        Commands::Send { messages } => match client.send(&messages).await {
            Ok(()) => eprintln!("sent {} messages", messages.len()),
            Err(ClientError::SessionNotFound) => {
                eprintln!("Error: no such session; open it with `poll` first");
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Echo { messages } => {
            // The first poll opens the session.
            client.poll_until(|frame| *frame == Frame::Open, 1).await?;
            client.send(&messages).await?;

            let expected = messages.last().cloned();
            let frames = client
                .poll_until(
                    |frame| match (frame, &expected) {
                        (Frame::Message(batch), Some(last)) => batch.last() == Some(last),
                        (_, None) => true,
                        _ => false,
                    },
                    20,
                )
                .await?;
            for frame in frames {
                print_frame(&frame);
            }
        }
    }

    Ok(())
}

fn print_frame(frame: &Frame) {
    println!("{}", frame.body());
}
