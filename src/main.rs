use anyhow::{Context, Result};
use dialoguer::Password;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use ledger_client::api::LedgerApi;
use ledger_client::auth::{CredentialStore, FileStore, Navigator, Redirect};
use ledger_client::config::{Command, Config};
use ledger_client::transport::{ApiRequest, ReqwestTransport};
use ledger_client::HttpClient;

/// Terminal stand-in for the login redirect
struct CliNavigator;

impl Navigator for CliNavigator {
    fn navigate(&self, redirect: Redirect) {
        tracing::warn!(to = %redirect.to, "Session ended, credentials cleared");
        eprintln!("Session expired. Run `ledger-client login` to sign in again.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }

    tracing::debug!(
        base_url = %config.api_base_url,
        credentials = %config.credentials_file.display(),
        "Ledger client starting"
    );

    let store = Arc::new(
        CredentialStore::open(Arc::new(FileStore::new(config.credentials_file.clone())))
            .context("Failed to load stored credentials")?,
    );

    let transport = Arc::new(ReqwestTransport::new(
        &config.api_base_url,
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);

    let client = HttpClient::new(
        transport,
        store,
        Arc::new(CliNavigator),
        Duration::from_secs(config.refresh_timeout),
    );

    run(&LedgerApi::new(client), &config, command).await
}

async fn run(api: &LedgerApi, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => Password::new()
                    .with_prompt(format!("Password for {}", username))
                    .interact()
                    .context("Failed to read password")?,
            };
            api.client().login(&username, &password).await?;
            println!("✅ Logged in as {}", username);
        }

        Command::Logout => {
            api.client().logout()?;
            println!("Logged out");
        }

        Command::Whoami => print_json(&api.current_user().await?)?,

        Command::Status => {
            let credentials = api.client().credentials();
            println!("  Backend:      {}", config.api_base_url);
            println!("  Credentials:  {}", config.credentials_file.display());
            println!(
                "  Session:      {}",
                if api.client().session().is_authenticated() {
                    "authenticated"
                } else {
                    "signed out"
                }
            );
            if let Some(access) = credentials.access_token() {
                println!("  Access token: {}", access.redacted());
            }
        }

        Command::Profile => print_json(&api.profile().await?)?,

        Command::ProfileUpdate { body } => {
            print_json(&api.update_profile(parse_body(&body)?).await?)?
        }

        Command::List { resource, filters } => {
            print_json(&api.list(resource, &filters).await?)?
        }

        Command::Get { resource, id } => print_json(&api.get(resource, &id).await?)?,

        Command::Create { resource, body } => {
            print_json(&api.create(resource, parse_body(&body)?).await?)?
        }

        Command::Update { resource, id, body } => {
            print_json(&api.update(resource, &id, parse_body(&body)?).await?)?
        }

        Command::Patch { resource, id, body } => {
            print_json(&api.patch(resource, &id, parse_body(&body)?).await?)?
        }

        Command::Delete { resource, id } => {
            api.delete(resource, &id).await?;
            println!("Deleted {} {}", resource, id);
        }

        Command::Request { method, path, body } => {
            let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.json(parse_body(&body)?);
            }

            let response = api.client().send(request).await?;
            println!("{}", response.status);
            match response.json::<Value>() {
                Ok(value) => print_json(&value)?,
                Err(_) => println!("{}", response.text()),
            }
        }
    }

    Ok(())
}

fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).context("Body must be valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
