//! Thingbox - command-line client
//!
//! Signs in against a Thingbox server, keeps the session token in the user
//! config directory and prints API results as JSON.

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use thingbox_client::items::{drafts_from_json, ImportFields, ImportOverrides};
use thingbox_client::{
    ApiClient, ApiError, ClientConfig, ContentCache, ItemDraft, KeyValueStore, MemoryStore,
    SealingKey, SystemBrowser,
};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();

    // Initialize logging, defaulting to info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e.downcast_ref::<ApiError>() {
            Some(ApiError::Unauthenticated) => {
                eprintln!("Not signed in or session expired. Run `thingbox sign-in` first.")
            }
            Some(ApiError::Forbidden) => {
                eprintln!("You don't have permission to do that.")
            }
            _ => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    let config = cli::apply_to_config(&cli, config);
    tracing::debug!("Using server {}", config.base_url);

    let client = match &cli.auth_token {
        // An explicit token lives only for this invocation
        Some(token) => {
            let store = Arc::new(MemoryStore::new());
            store.set(&config.token_key, token)?;
            ApiClient::new(config.base_url.clone(), store)?
                .with_token_key(config.token_key.clone())
        }
        None => ApiClient::from_config(&config).context("Failed to create API client")?,
    }
    .with_navigator(Arc::new(SystemBrowser));

    match cli.command {
        Commands::SignIn { switch } => match client.sign_in(switch).await? {
            Some(redirect_url) => {
                println!("Complete sign-in at: {}", redirect_url);
            }
            None => println!("Already signed in."),
        },
        Commands::SignOut => {
            client.sign_out()?;
            println!("Signed out.");
        }
        Commands::User => print_json(&client.get_user().await?)?,
        Commands::Items => print_json(&client.get_items().await?)?,
        Commands::PublicKey => println!("{}", client.get_public_key().await?),
        Commands::AdminToken => println!("{}", client.get_admin_token().await?),
        Commands::Templates => print_json(&client.get_templates().await?)?,
        Commands::ClearTemplateCache => {
            print_json(&serde_json::json!({ "cleared": client.clear_template_cache().await? }))?
        }
        Commands::UpdateTemplate {
            id,
            template_type,
            file,
        } => {
            let body = read_input(None, file.as_deref())?;
            let success = client.update_template(&id, body, &template_type).await?;
            print_json(&serde_json::json!({ "success": success }))?;
        }
        Commands::CheckTwitter { user_id } => print_json(&client.check_twitter(&user_id).await?)?,
        Commands::Content { ids } if !ids.is_empty() => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            print_json(&client.fetch_public_content(&ids).await?)?;
        }
        Commands::Content { .. } => {
            let cache = ContentCache::load(Arc::new(client)).await?;
            print_json(&*cache.snapshot())?;
        }
        Commands::Encrypt { data, file } => {
            let plaintext = read_input(data, file.as_deref())?;
            let key = SealingKey::from_b58(&client.fetch_public_key().await?)?;
            println!("{}", key.seal(plaintext.as_bytes())?);
        }
        Commands::AddItem {
            target_user,
            template,
            category,
            data,
            batch,
            file,
        } => {
            let [target_type, target_id] = <[String; 2]>::try_from(target_user)
                .map_err(|_| anyhow::anyhow!("--target-user takes TYPE and ID"))?;
            let draft = ItemDraft {
                target_type,
                target_id,
                category,
                template,
                content: read_input(data, file.as_deref())?,
            };
            let key = SealingKey::from_b58(&client.fetch_public_key().await?)?;
            client.add_item(&draft.seal(&key)?, batch.as_deref()).await?;
            println!("item created for {} {}", draft.target_type, draft.target_id);
        }
        Commands::ImportItems {
            send,
            target_type_field,
            target_id_field,
            category_field,
            template_field,
            content_field,
            target_type,
            target_id,
            category,
            template,
            batch,
            file,
        } => {
            let input = read_input(None, file.as_deref())?;
            let records: Vec<serde_json::Value> =
                serde_json::from_str(&input).context("Items must be a JSON array")?;
            let fields = ImportFields {
                target_type: target_type_field,
                target_id: target_id_field,
                category: category_field,
                template: template_field,
                content: content_field,
            };
            let overrides = ImportOverrides {
                target_type,
                target_id,
                category,
                template,
            };
            let drafts = drafts_from_json(&records, &fields, &overrides)?;

            if !send {
                for (i, draft) in drafts.iter().enumerate() {
                    println!("#{} [DRY_RUN]: {} {} =", i, draft.target_type, draft.target_id);
                    println!("{}", draft.content);
                }
                return Ok(());
            }

            let key = SealingKey::from_b58(&client.fetch_public_key().await?)?;
            let mut failed = 0;
            for (i, draft) in drafts.iter().enumerate() {
                let result = match draft.seal(&key) {
                    Ok(item) => client.add_item(&item, batch.as_deref()).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => println!(
                        "#{}: item created for {} {}",
                        i, draft.target_type, draft.target_id
                    ),
                    // Without a session every later item fails the same way
                    Err(e @ (ApiError::Unauthenticated | ApiError::Forbidden)) => {
                        return Err(e.into())
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::error!(
                            "#{}: failed for {} {}: {}",
                            i,
                            draft.target_type,
                            draft.target_id,
                            e
                        );
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} items failed", failed, drafts.len());
            }
        }
    }

    Ok(())
}

/// `inline` if given, else the contents of `file`, else all of stdin
fn read_input(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(inline) = inline {
        return Ok(inline);
    }
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
