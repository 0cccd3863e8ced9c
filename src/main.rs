use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use lexchat::chat::render::TerminalRenderer;
use lexchat::chat::{ChatSession, TurnSettings};
use lexchat::config::Config;
use lexchat::dispatch::http::HttpDispatch;

const HELP: &str = "Commandes: /model <nom>, /models, /reasoning, /clear, /history, /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Load .env next to the binary first, then fall back to the CWD search.
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|path| path.exists());
    match beside_exe {
        Some(path) => {
            dotenvy::from_path(&path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = Config::load().inspect_err(|e| tracing::error!("startup failed: {e}"))?;
    tracing::debug!(?config, "configuration loaded");

    let dispatch = HttpDispatch::new(config.base_url.clone(), config.api_key.clone())?;
    let mut session = ChatSession::new(config.model.clone(), TurnSettings::from(&config));
    let mut show_reasoning = config.show_reasoning;

    println!("lexchat ({}) - {HELP}", session.model());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            let (name, arg) = command
                .split_once(char::is_whitespace)
                .map(|(n, a)| (n, a.trim()))
                .unwrap_or((command, ""));
            match name {
                "quit" | "exit" => break,
                "clear" => {
                    session.history.clear();
                    println!("Conversation effacée.");
                }
                "history" => println!("Messages en mémoire: {}", session.history.len()),
                "reasoning" => {
                    show_reasoning = !show_reasoning;
                    println!("Raisonnement affiché: {show_reasoning}");
                }
                "models" => {
                    for m in &config.models {
                        let marker = if m == session.model() { "*" } else { " " };
                        println!("{marker} {m}");
                    }
                }
                "model" if config.models.iter().any(|m| m == arg) => {
                    session.set_model(arg);
                    println!("Modèle: {arg}");
                }
                "model" => println!("Modèle inconnu: {arg:?}. Disponibles: {}", config.models.join(", ")),
                _ => println!("{HELP}"),
            }
            continue;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let mut renderer = TerminalRenderer::new(std::io::stdout(), show_reasoning);
        let result = session.run_turn(&dispatch, input, &mut renderer, cancel).await;
        watcher.abort();

        match result {
            Ok(result) => tracing::debug!(
                outcome = ?result.outcome,
                chars = result.text.len(),
                citations = result.citations.len(),
                "turn finished"
            ),
            Err(e) => tracing::error!("turn failed: {e}"),
        }
    }

    tracing::info!("lexchat shutting down");
    Ok(())
}
