use clap::{Parser, Subcommand};
use rgenedit::{
    logger::{self, LogLevel, LoggerConfig},
    models::extension_for_mime,
    Config, EditClient, EditSession, GeminiClient, ImageEditor, ImageResource, Outcome,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rgenedit")]
#[command(about = "Edit images with a natural-language instruction using Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an edit to an image
    Edit {
        /// Path to the source image
        image: PathBuf,

        /// What to change, in plain words
        instruction: String,

        /// Where to write the edited image (extension follows the returned type)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List known image editing models
    Models,

    /// Check that the API key and model are accepted
    Health,

    /// Run the HTTP service
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (defaults to PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    let cli = Cli::parse();

    let mut logger_config = LoggerConfig::from_env();
    if cli.verbose {
        logger_config = logger_config.with_level(LogLevel::Debug);
    }
    if let Err(e) = logger::init_with_config(logger_config) {
        eprintln!("{}", e);
    }
    if dotenv_loaded {
        log::debug!("✅ .env file loaded");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Commands::Models = cli.command {
        for model in EditClient::supported_models() {
            println!("{}  {} ({})", model.id, model.name, model.provider);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::from_env();
    let gemini_config = config.gemini.clone().unwrap_or_default();
    let client = GeminiClient::new(gemini_config)?;
    logger::log_config_info(&config);

    match cli.command {
        Commands::Models => Ok(ExitCode::SUCCESS),
        Commands::Health => {
            client.health_check().await?;
            println!("ok: {}", client.model());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Edit {
            image,
            instruction,
            output,
            json,
        } => edit(client, image, instruction, output, json).await,
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            let config = match port {
                Some(port) => config.with_port(port),
                None => config,
            };
            rgenedit::server::run(config, client).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn edit(
    client: GeminiClient,
    image: PathBuf,
    instruction: String,
    output: Option<PathBuf>,
    json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let editor: Arc<dyn ImageEditor> = Arc::new(client.edit().clone());
    let session = EditSession::new("cli", editor);

    let outcome = session.edit(ImageResource::open(&image).await, &instruction).await?;

    if json {
        let body = match &outcome {
            Outcome::Edited(result) => serde_json::to_value(result)?,
            other => serde_json::json!({ "status": other.status(), "message": other.message() }),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    let result = match outcome {
        Outcome::Edited(result) => result,
        other => {
            if !json {
                eprintln!("{}", other.message().unwrap_or_default());
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Some((mime_type, bytes)) = result.decode_image()? {
        let path = output.unwrap_or_else(|| {
            let stem = image
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            PathBuf::from(format!("{}-edited.{}", stem, extension_for_mime(&mime_type)))
        });
        tokio::fs::write(&path, &bytes).await?;
        log::info!("💾 Edited image saved to {} ({} bytes)", path.display(), bytes.len());
        if !json {
            println!("{}", path.display());
        }
    } else {
        log::warn!("No image was returned, only a note");
    }

    if let (Some(text), false) = (&result.text, json) {
        println!("AI's note: \"{}\"", text);
    }

    Ok(ExitCode::SUCCESS)
}
