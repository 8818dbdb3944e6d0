use anyhow::Result;
use clap::Parser;
use nutribot::ai::GeminiChatClient;
use nutribot::models::{AttachedImage, Config};
use nutribot::prompts;
use nutribot::session::{ChatSession, SubmitOutcome};
use std::io::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nutribot")]
#[command(about = "Chat with NutriBot, a nutrition-advice assistant")]
struct CliArgs {
    /// Override the Gemini model ID (otherwise GEMINI_MODEL or the default).
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nutribot=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let model = args.model.unwrap_or_else(|| config.model.clone());
    let credential_present = config.api_key.is_some();
    let client = GeminiChatClient::new(
        config.api_key.clone().unwrap_or_default(),
        model,
        config.request_timeout,
    );

    let mut session = ChatSession::new(Arc::new(client), credential_present);
    if let Some(delay) = config.stream_delay {
        session = session.with_stream_delay(delay);
    }

    print_banner(&session);
    repl(session).await
}

fn print_banner(session: &ChatSession) {
    println!("NutriBot - your personal nutrition assistant");
    println!();
    if let Some(seed) = session.messages().first() {
        println!("nutribot> {}", seed.text);
    }
    println!();
    println!("Quick prompts (type the number to send):");
    for (index, prompt) in prompts::QUICK_PROMPTS.iter().enumerate() {
        println!("  {}. {}", index + 1, prompt);
    }
    println!("Commands: /image <path> to attach an image, /quit to exit.");
    println!();
}

async fn repl(session: ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut staged_image: Option<AttachedImage> = None;

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();

        match line.as_str() {
            "/quit" | "/exit" => break,
            "" if staged_image.is_none() => continue,
            _ if line.starts_with("/image") => {
                staged_image = stage_image(line.trim_start_matches("/image").trim());
                continue;
            }
            _ => {}
        }

        let text = match quick_prompt(&line) {
            Some(prompt) => {
                println!("you> {}", prompt);
                prompt.to_string()
            }
            None => line,
        };

        run_turn(&session, &text, staged_image.take()).await?;
    }

    Ok(())
}

/// Map a bare shortcut number to its canned question.
fn quick_prompt(input: &str) -> Option<&'static str> {
    let index = input.parse::<usize>().ok()?;
    (1..=prompts::QUICK_PROMPTS.len())
        .contains(&index)
        .then(|| prompts::QUICK_PROMPTS[index - 1])
}

fn stage_image(path: &str) -> Option<AttachedImage> {
    if path.is_empty() {
        println!("Usage: /image <path>");
        return None;
    }

    match std::fs::read(path) {
        Ok(bytes) => {
            let image = AttachedImage::from_bytes(&bytes);
            println!(
                "Attached {} ({}); it will be sent with your next message.",
                path, image.mime_type
            );
            Some(image)
        }
        Err(e) => {
            println!("Could not read {}: {}", path, e);
            None
        }
    }
}

async fn run_turn(
    session: &ChatSession,
    text: &str,
    image: Option<AttachedImage>,
) -> Result<()> {
    print!("nutribot> ");
    std::io::stdout().flush()?;

    let mut printed = 0usize;
    let outcome = session
        .submit(text, image, |draft: &str| {
            // Each callback delivers the full accumulated reply; echo only
            // the unseen suffix.
            print!("{}", &draft[printed..]);
            let _ = std::io::stdout().flush();
            printed = draft.len();
        })
        .await;

    match outcome {
        SubmitOutcome::Committed => println!(),
        SubmitOutcome::Failed | SubmitOutcome::MissingCredential => {
            if let Some(message) = session.messages().last() {
                println!("{}", message.text);
            }
        }
        SubmitOutcome::Ignored => println!("(nothing to send)"),
        SubmitOutcome::Busy => println!("(still replying to the previous message)"),
    }
    println!();

    Ok(())
}
