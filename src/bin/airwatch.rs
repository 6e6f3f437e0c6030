//! `airwatch` command line client.
//!
//! ```text
//! airwatch readings
//! airwatch readings --id @8688
//! airwatch conversations
//! airwatch new --title "Itwari smog"
//! airwatch show 3
//! airwatch chat 3 "Is it safe to jog in Ambazari today?"
//! ```

use airwatch::client::{stream_reply, AirwatchClient, ChatSession, DEFAULT_SERVER_URL};
use airwatch::models::{average_aqi, Reading, Role};
use airwatch::telemetry::{get_subscriber, init_subscriber};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;

#[derive(Parser, Debug)]
#[command(name = "airwatch", version, about = "Air quality readings and assistant chat")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "AIRWATCH_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Current readings, or one reading by id (`@uid` or a stored id)
    Readings {
        #[arg(long)]
        id: Option<String>,
    },
    /// List conversations, newest first
    Conversations,
    /// Start a conversation
    New {
        #[arg(long)]
        title: Option<String>,
    },
    /// Print a conversation with its messages
    Show { id: i32 },
    /// Send a message and stream the reply
    Chat { id: i32, message: String },
}

fn print_reading(reading: &Reading) {
    println!(
        "{:>8}  {:<32} AQI {:>3}  {}",
        reading.id.to_string(),
        reading.location_name,
        reading.aqi,
        reading.category()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = get_subscriber("airwatch-cli".into(), "warn".into(), std::io::stderr);
    init_subscriber(subscriber);

    let cli = Cli::parse();
    let client = AirwatchClient::new(&cli.server)?;

    match cli.command {
        Commands::Readings { id: Some(id) } => {
            let reading = client
                .reading(&id)
                .await
                .with_context(|| format!("Failed to fetch reading {}", id))?;
            print_reading(&reading);
            let pollutants = [
                ("PM2.5", reading.pm25),
                ("PM10", reading.pm10),
                ("NO2", reading.no2),
                ("O3", reading.o3),
                ("SO2", reading.so2),
                ("CO", reading.co),
            ];
            for (name, value) in pollutants {
                match value {
                    Some(value) => println!("          {:<6} {}", name, value),
                    None => println!("          {:<6} unknown", name),
                }
            }
            println!("          at {}", reading.timestamp);
        }
        Commands::Readings { id: None } => {
            let readings = client.readings().await.context("Failed to fetch readings")?;
            for reading in &readings {
                print_reading(reading);
            }
            match average_aqi(&readings) {
                Some(average) => println!("Average AQI {} across {} stations", average, readings.len()),
                None => println!("No readings available"),
            }
        }
        Commands::Conversations => {
            for conversation in client.conversations().await? {
                println!(
                    "{:>4}  {}  {}",
                    conversation.id,
                    conversation.created_at.format("%Y-%m-%d %H:%M"),
                    conversation.title
                );
            }
        }
        Commands::New { title } => {
            let conversation = client.create_conversation(title.as_deref()).await?;
            println!("{}  {}", conversation.id, conversation.title);
        }
        Commands::Show { id } => {
            let conversation = client.conversation(id).await?;
            println!("# {}", conversation.conversation.title);
            for message in conversation.messages {
                println!("[{}] {}", message.role, message.content);
            }
        }
        Commands::Chat { id, message } => {
            let history = client
                .conversation(id)
                .await
                .with_context(|| format!("Failed to open conversation {}", id))?;
            let mut session = ChatSession::new();
            session.open(id, history.messages);

            let ticket = session.begin_send(&message)?;
            let body = match client.send_message(id, &message).await {
                Ok(body) => body,
                Err(err) => {
                    session.fail(&ticket, err.to_string())?;
                    return Err(err).context("Failed to send message");
                }
            };

            let mut stdout = std::io::stdout();
            print!("[{}] ", Role::Assistant);
            let reply = stream_reply(&mut session, &ticket, body, |fragment| {
                print!("{}", fragment);
                let _ = stdout.flush();
            })
            .await;
            println!();
            reply.context("The reply did not complete")?;
        }
    }

    Ok(())
}
