use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config::load_settings, AudioArtifact, ClientError, ClientSettings, InMemorySessionPersistence,
    LearningClient, Session, TransportFailure,
};
use shared::protocol::ProgressEntry;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "neuroadapt", about = "Adapt learning content and listen to it")]
struct Args {
    /// Overrides the configured API base URL.
    #[arg(long)]
    api_url: Option<String>,
    /// Overrides the configured local database.
    #[arg(long)]
    database_url: Option<String>,
    /// Keep the session in memory only.
    #[arg(long)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Sign in right after registering.
        #[arg(long)]
        login: bool,
    },
    Logout,
    Whoami,
    /// Request a simplified rewrite of TEXT.
    Adapt {
        text: String,
        /// Also synthesize the adapted text into this file.
        #[arg(long)]
        speak_to: Option<PathBuf>,
    },
    /// Synthesize TEXT as is.
    Speak {
        text: String,
        #[arg(long)]
        out: PathBuf,
    },
    Dyslexia {
        #[arg(value_enum)]
        mode: Toggle,
        /// Resolve the profile id from the remote catalog first.
        #[arg(long)]
        from_catalog: bool,
    },
    Profiles,
    Progress {
        #[command(subcommand)]
        action: ProgressAction,
    },
}

#[derive(Subcommand, Debug)]
enum ProgressAction {
    Save {
        content_id: String,
        status: String,
        #[arg(long)]
        score: Option<i64>,
    },
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

fn describe_failure(err: &ClientError) -> String {
    match err {
        ClientError::AuthRequired => {
            "Please log in first: neuroadapt login --email <email> --password <password>"
                .to_string()
        }
        ClientError::Transport {
            kind: TransportFailure::Connect,
            message,
        } => format!("Server unreachable; check the API URL and retry. ({message})"),
        ClientError::Transport {
            kind: TransportFailure::Timeout,
            message,
        } => format!("The server took too long to answer; retry later. ({message})"),
        err if err.requires_login() => {
            format!("Session rejected by the server; log in again. ({err})")
        }
        err => err.to_string(),
    }
}

fn resolve_settings(args: &Args) -> ClientSettings {
    let mut settings = load_settings();
    if let Some(api_url) = &args.api_url {
        settings.api_base_url = api_url.clone();
    }
    if let Some(database_url) = &args.database_url {
        settings.database_url = database_url.clone();
    }
    settings
}

/// Writes the artifact, naming the extension after its content type when `out` has none.
async fn save_audio(artifact: &AudioArtifact, out: &Path) -> Result<()> {
    let out = if out.extension().is_none() {
        out.with_extension(artifact.file_extension())
    } else {
        out.to_path_buf()
    };
    tokio::fs::write(&out, artifact.bytes())
        .await
        .with_context(|| format!("failed to write audio to '{}'", out.display()))?;
    println!(
        "Saved {} bytes of {} to {}",
        artifact.bytes().len(),
        artifact.content_type(),
        out.display()
    );
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let settings = resolve_settings(&args);
    debug!(
        api = %settings.api_base_url,
        database = %settings.database_url,
        ephemeral = args.ephemeral,
        "resolved settings"
    );
    let mut client = if args.ephemeral {
        LearningClient::connect_with_persistence(
            &settings,
            Arc::new(InMemorySessionPersistence::default()),
        )
        .await?
    } else {
        LearningClient::connect(&settings).await?
    };
    let session: Session = client.session.current().await;

    match args.command {
        Command::Login { email, password } => {
            let session = client.session.login(&email, &password).await?;
            println!(
                "Logged in as {}",
                session.user_email().unwrap_or_default()
            );
        }
        Command::Register {
            email,
            password,
            login,
        } => {
            client.session.register(&email, &password).await?;
            println!("Registered {email}");
            if login {
                client.session.login(&email, &password).await?;
                println!("Logged in as {email}");
            }
        }
        Command::Logout => {
            client.session.logout().await?;
            println!("Logged out");
        }
        Command::Whoami => match session.user_email() {
            Some(email) => println!("{email}"),
            None => println!("Not logged in"),
        },
        Command::Adapt { text, speak_to } => {
            let result = client.adaptation.adapt(&text, &session).await?;
            println!("{}", result.adapted_text);
            if let Some(out) = speak_to {
                let artifact = client.adaptation.speak(&text, &session).await?;
                save_audio(&artifact, &out).await?;
            }
        }
        Command::Speak { text, out } => {
            let artifact = client.adaptation.speak(&text, &session).await?;
            save_audio(&artifact, &out).await?;
        }
        Command::Dyslexia { mode, from_catalog } => {
            if from_catalog {
                client.profiles.refresh_mapping_from_catalog(&session).await?;
            }
            let selection = client
                .profiles
                .set_dyslexia_mode(mode == Toggle::On, &session)
                .await?;
            println!(
                "Dyslexia mode {} (profile {})",
                if selection.enabled { "enabled" } else { "disabled" },
                selection.profile_id
            );
        }
        Command::Profiles => {
            for profile in client.profiles.list_profiles(&session).await? {
                match profile.description {
                    Some(description) => {
                        println!("{}\t{}\t{}", profile.id, profile.name, description)
                    }
                    None => println!("{}\t{}", profile.id, profile.name),
                }
            }
        }
        Command::Progress { action } => match action {
            ProgressAction::Save {
                content_id,
                status,
                score,
            } => {
                let entry = ProgressEntry {
                    content_id,
                    status,
                    score,
                };
                client.progress.record(&entry, &session).await?;
                println!("Recorded progress for {}", entry.content_id);
            }
            ProgressAction::List => {
                let history = client.progress.history(&session).await?;
                println!("{}", serde_json::to_string_pretty(&history)?);
            }
        },
    }

    client.adaptation.clear().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(Args::parse()).await {
        let message = match err.downcast_ref::<ClientError>() {
            Some(client_err) => describe_failure(client_err),
            None => format!("{err:#}"),
        };
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_required_points_at_login() {
        assert!(describe_failure(&ClientError::AuthRequired).contains("neuroadapt login"));
    }

    #[test]
    fn connect_failures_are_reported_as_unreachable() {
        let err = ClientError::Transport {
            kind: TransportFailure::Connect,
            message: "server unreachable: connection refused".to_string(),
        };
        assert!(describe_failure(&err).starts_with("Server unreachable"));
    }

    #[test]
    fn timeouts_are_not_reported_as_unreachable() {
        let err = ClientError::Transport {
            kind: TransportFailure::Timeout,
            message: "request timed out: operation timed out".to_string(),
        };
        let described = describe_failure(&err);
        assert!(described.starts_with("The server took too long"));
        assert!(!described.contains("unreachable"));
    }

    #[test]
    fn other_transport_failures_keep_their_message() {
        let err = ClientError::Transport {
            kind: TransportFailure::Other,
            message: "request failed: builder error".to_string(),
        };
        assert_eq!(describe_failure(&err), "request failed: builder error");
    }

    #[test]
    fn rejected_tokens_prompt_for_login() {
        let err = ClientError::Request {
            status: Some(401),
            message: "Invalid authentication credentials".to_string(),
        };
        let described = describe_failure(&err);
        assert!(described.contains("log in again"));
        assert!(described.contains("Invalid authentication credentials"));
    }

    #[test]
    fn parses_dyslexia_toggle() {
        let args = Args::try_parse_from(["neuroadapt", "--ephemeral", "dyslexia", "on"])
            .expect("parse");
        assert!(args.ephemeral);
        assert!(matches!(
            args.command,
            Command::Dyslexia {
                mode: Toggle::On,
                from_catalog: false
            }
        ));
    }
}
