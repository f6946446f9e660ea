use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod capture;
mod config;
mod error;
mod handlers;
mod llm;
mod pipeline;
mod state;
mod storage;
mod utils;
mod workflow;

use capture::NoCameraDevice;
use config::Config;
use llm::OpenAiClient;
use state::AppState;
use utils::http::build_http_client;
use utils::logging::init_logging;
use workflow::{
    download_image, GenerateOutcome, HttpRedesignApi, LocalPipeline, RedesignApi,
    WorkflowController,
};

#[derive(Debug, Clone, PartialEq)]
struct RedesignArgs {
    image: PathBuf,
    instruction: Option<String>,
    server: Option<String>,
    local: bool,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Serve,
    Redesign(RedesignArgs),
}

fn usage() -> &'static str {
    "Usage:\n  room_redesign_studio [serve]\n  room_redesign_studio redesign --image <path> [--instruction <text>] [--server <url>] [--local] [--output <path>]"
}

fn parse_args(args: &[String]) -> anyhow::Result<Mode> {
    match args.get(1).map(|value| value.as_str()) {
        None | Some("serve") => return Ok(Mode::Serve),
        Some("redesign") => {}
        Some("--help") | Some("-h") => return Err(anyhow!(usage())),
        Some(other) => return Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }

    let mut image: Option<PathBuf> = None;
    let mut instruction = None;
    let mut server = None;
    let mut local = false;
    let mut output = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--image" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --image"))?;
                image = Some(PathBuf::from(value));
            }
            "--instruction" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --instruction"))?;
                instruction = Some(value.clone());
            }
            "--server" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --server"))?;
                url::Url::parse(value).map_err(|_| anyhow!("Invalid --server URL: {value}"))?;
                server = Some(value.clone());
            }
            "--output" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --output"))?;
                output = Some(PathBuf::from(value));
            }
            "--local" => {
                local = true;
            }
            "--help" | "-h" => {
                return Err(anyhow!(usage()));
            }
            other => {
                return Err(anyhow!("Unknown redesign argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    let image = image.ok_or_else(|| anyhow!("--image is required"))?;
    Ok(Mode::Redesign(RedesignArgs {
        image,
        instruction,
        server,
        local,
        output,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::load()?;
    let _guards = init_logging(&config);

    let args: Vec<String> = std::env::args().collect();
    match parse_args(&args)? {
        Mode::Serve => serve(config).await,
        Mode::Redesign(redesign_args) => run_redesign(config, redesign_args).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    if config.openai_api_key.trim().is_empty() {
        return Err(anyhow!("OPENAI_API_KEY is required to serve"));
    }
    if !config.media_store_configured() {
        warn!("Cloudinary is not configured; /api/upload will report relay failures");
    }

    let http = build_http_client(&config).context("Failed to build HTTP client")?;
    let bind_addr = config.bind_addr.clone();
    let app = handlers::router(AppState::new(config, http));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!("Starting Room Redesign Studio on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn run_redesign(config: Config, args: RedesignArgs) -> anyhow::Result<()> {
    let http = build_http_client(&config).context("Failed to build HTTP client")?;

    let api: Arc<dyn RedesignApi> = if args.local {
        let openai = Arc::new(OpenAiClient::new(&config, http.clone()));
        Arc::new(LocalPipeline::new(openai.clone(), openai))
    } else {
        let server = args
            .server
            .as_deref()
            .unwrap_or(&config.redesign_server_url);
        Arc::new(HttpRedesignApi::new(http.clone(), server))
    };

    let controller = WorkflowController::new(
        api,
        Arc::new(NoCameraDevice),
        &config.default_redesign_instruction,
    );
    if let Some(instruction) = args.instruction.as_deref() {
        controller.set_instruction(instruction);
    }

    controller.load_file(&args.image).await?;

    match controller.generate().await {
        GenerateOutcome::Completed(result) => {
            if let Some(description) = controller.snapshot().description {
                println!("Description: {}", description.as_str());
            }
            println!("Image URL: {}", result.image_url);
            if let Some(output) = args.output.as_deref() {
                let written = download_image(&http, &result.image_url, output).await?;
                println!("Saved {} bytes to {}", written, output.display());
            }
            Ok(())
        }
        GenerateOutcome::Failed(err) => Err(anyhow!(err)),
        GenerateOutcome::Ignored | GenerateOutcome::Discarded => {
            Err(anyhow!("Redesign did not run"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("room_redesign_studio")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn defaults_to_serve() {
        assert_eq!(parse_args(&args(&[])).unwrap(), Mode::Serve);
        assert_eq!(parse_args(&args(&["serve"])).unwrap(), Mode::Serve);
    }

    #[test]
    fn parses_redesign_flags() {
        let mode = parse_args(&args(&[
            "redesign",
            "--image",
            "room.jpg",
            "--instruction",
            "japandi",
            "--server",
            "http://localhost:3000",
            "--local",
            "--output",
            "out.png",
        ]))
        .unwrap();
        assert_eq!(
            mode,
            Mode::Redesign(RedesignArgs {
                image: PathBuf::from("room.jpg"),
                instruction: Some("japandi".to_string()),
                server: Some("http://localhost:3000".to_string()),
                local: true,
                output: Some(PathBuf::from("out.png")),
            })
        );
    }

    #[test]
    fn rejects_bad_redesign_arguments() {
        assert!(parse_args(&args(&["redesign"])).is_err());
        assert!(parse_args(&args(&["redesign", "--image"])).is_err());
        assert!(parse_args(&args(&["redesign", "--image", "a.png", "--server", "not a url"])).is_err());
        assert!(parse_args(&args(&["redesign", "--image", "a.png", "--bogus"])).is_err());
        assert!(parse_args(&args(&["paint"])).is_err());
    }
}
