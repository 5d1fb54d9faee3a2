mod client;
mod sse;

use std::io::Write;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatgate_types::{ChatRequest, Message};

use crate::client::{Client, StreamOutcome};

#[derive(Parser, Debug)]
#[command(name = "chatgate-cli", version)]
#[command(about = "Talk to a Chatgate server")]
struct Args {
    /// Base URL of the gateway API
    #[arg(
        long,
        env = "CHATGATE_URL",
        default_value = "http://localhost:8000/api/v1",
        global = true
    )]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server is up
    Health,

    /// Send one user message
    Chat {
        /// Message to send
        message: String,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,

        /// Provider to use (openai or ollama)
        #[arg(long)]
        provider: Option<String>,

        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// System prompt sent before the message
        #[arg(long)]
        system: Option<String>,
    },

    /// List models of every provider
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client = Client::new(&args.url);

    match args.command {
        Command::Health => {
            let health = client.health().await?;
            println!("{} (version {})", health.status, health.version);
        }
        Command::Models => {
            let list = client.models().await?;
            if list.models.is_empty() {
                println!("No models available");
            }
            for model in list.models {
                println!("{}\t{}", model.provider, model.name);
            }
        }
        Command::Chat {
            message,
            stream,
            provider,
            model,
            system,
        } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(message));

            let mut request = ChatRequest::new(messages);
            request.provider = provider;
            request.model = model;
            request.stream = stream;

            if stream {
                let mut stdout = std::io::stdout();
                let outcome = client
                    .chat_stream(&request, |content| {
                        write!(stdout, "{content}")?;
                        stdout.flush()?;
                        Ok(())
                    })
                    .await?;
                println!();

                match outcome {
                    StreamOutcome::Done => {}
                    StreamOutcome::Failed(error) => bail!("stream failed: {error}"),
                    StreamOutcome::Truncated => bail!("stream ended unexpectedly"),
                }
            } else {
                let response = client.chat(&request).await?;
                for choice in response.choices {
                    println!("{}", choice.message.content);
                }
            }
        }
    }

    Ok(())
}
