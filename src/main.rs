use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use rewards_client::{
    ApiClient, ApiRequest, ClientConfig, HttpMethod, KeychainStorage, Payload, Session,
};

#[derive(Parser, Debug)]
#[command(name = "rewards-client", version, about = "Rewards API client")]
struct Args {
    /// API origin (overrides REWARDS_API_URL / API_URL)
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session in the keychain
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Invalidate the session and clear stored credentials
    Logout,
    /// Show the cached user, refreshing the profile when logged in
    Whoami,
    /// Issue an authenticated request and print the response body
    Request {
        method: HttpMethod,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Show or set the language preference
    Language { code: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env from the working directory if present
    let _ = dotenvy::dotenv();

    env_logger::init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = args.api_url.as_deref() {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    log::info!("Using API at {}", config.base_url);

    let storage = Arc::new(KeychainStorage::new(&config.keychain_service));
    let api = Arc::new(ApiClient::new(config, storage));
    let session = Session::new(api.clone());

    match args.command {
        Command::Login { email, password } => {
            session.login(&email, &password).await?;
            println!("Logged in");
        }
        Command::Logout => {
            session.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => {
            if !session.restore().await {
                println!("Not logged in");
                return Ok(());
            }
            let user = match session.fetch_profile().await {
                Ok(user) => Some(user),
                Err(e) => {
                    log::warn!("Profile fetch failed, using cached user: {}", e);
                    session.current_user()
                }
            };
            match user {
                Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
                None => println!("Logged in (no profile cached)"),
            }
        }
        Command::Request { method, path, body } => {
            let mut request = ApiRequest::new(method, &path);
            if let Some(raw) = body {
                let value: serde_json::Value = serde_json::from_str(&raw)?;
                request = request.json(&value);
            }
            match api.execute(&request).await? {
                Payload::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Payload::Text(text) => println!("{}", text),
                Payload::Empty => {}
            }
        }
        Command::Language { code: None } => {
            println!("{}", api.preferences().language());
        }
        Command::Language { code: Some(code) } => match api.preferences().set_language(&code)? {
            Some(normalised) => println!("Language set to {}", normalised),
            None => return Err(format!("invalid language code: {}", code).into()),
        },
    }
    Ok(())
}
