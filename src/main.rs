use causerie::ui::chat_loop::run_chat;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "causerie")]
#[command(about = "A minimal terminal chat client for OpenAI-compatible APIs")]
#[command(long_about = "Causerie is a full-screen terminal chat client that streams responses \
from OpenAI-compatible APIs and renders them with basic markdown and table formatting.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    Your API key (required)\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\n\
Controls:\n\
  Enter             Send the message\n\
  Alt+Enter         Insert a newline\n\
  Esc               Interrupt a streaming response\n\
  Ctrl+T            Toggle light/dark theme\n\
  Ctrl+N            Clear the conversation\n\
  Up/Down/Mouse     Scroll through chat history\n\
  Ctrl+C            Quit")]
struct Args {
    /// Model to use for chat
    #[arg(short, long, default_value = "gpt-4o")]
    model: String,

    /// Append the transcript to this file
    #[arg(short, long)]
    log: Option<String>,

    /// Theme to use ("dark" or "light"), overriding the configured one
    #[arg(short, long)]
    theme: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr and are opt-in via RUST_LOG so they do not
    // fight the TUI by default.
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let args = Args::parse();
    run_chat(args.model, args.log, args.theme).await
}
