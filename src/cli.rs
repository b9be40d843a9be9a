//! Command-line interface definition and argument parsing
//!
//! This module uses clap to define and parse command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thingbox_client::ClientConfig;

/// Command-line arguments for the Thingbox client
#[derive(Parser, Debug)]
#[command(
    name = "thingbox",
    about = "Sign in to a Thingbox server and read your things",
    version
)]
pub struct Cli {
    /// API base URL (overrides THINGBOX__BASE_URL and the config file)
    #[arg(short, long, env = "TB_SERVER")]
    pub server: Option<String>,

    /// Session token to use instead of the stored one
    #[arg(short, long, env = "TB_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for the Thingbox client
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a session (no-op when already signed in)
    SignIn {
        /// Ask for a different account and open the sign-in page
        #[arg(long)]
        switch: bool,
    },

    /// Forget the stored session token
    SignOut,

    /// Show the signed-in user
    User,

    /// List your items
    Items,

    /// Print the server's base58 public key
    PublicKey,

    /// Get a one-time admin token
    AdminToken,

    /// List item templates
    Templates,

    /// Drop the server's rendered template cache
    ClearTemplateCache,

    /// Replace a template with the contents of a file (or stdin)
    UpdateTemplate {
        /// Template ID
        id: String,

        /// Template type
        #[arg(short = 't', long = "type")]
        template_type: String,

        /// File holding the new template body
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List items already recorded for a Twitter user id
    CheckTwitter {
        user_id: String,
    },

    /// Encrypt input to the server's public key and print it as base64
    Encrypt {
        /// Plaintext (read from FILE or stdin when omitted)
        #[arg(short, long)]
        data: Option<String>,

        file: Option<PathBuf>,
    },

    /// Encrypt and add an item for a user
    AddItem {
        /// Target user, e.g. `--target-user twitter 44196397`
        #[arg(short = 'u', long, num_args = 2, value_names = ["TYPE", "ID"], required = true)]
        target_user: Vec<String>,

        /// Template ID to render with
        #[arg(short, long)]
        template: Option<String>,

        /// Item category
        #[arg(short, long)]
        category: Option<String>,

        /// Item data in plaintext (read from FILE or stdin when omitted)
        #[arg(short, long)]
        data: Option<String>,

        /// Import batch to tag the item with
        #[arg(long)]
        batch: Option<String>,

        file: Option<PathBuf>,
    },

    /// Encrypt and add items from a JSON array (dry run unless --send)
    ImportItems {
        /// Send to the server rather than printing
        #[arg(short = 'x', long)]
        send: bool,

        /// Field containing the target type
        #[arg(short = 'y', long, default_value = "target_type")]
        target_type_field: String,

        /// Field containing the target user ID
        #[arg(short = 'i', long, default_value = "target_id")]
        target_id_field: String,

        /// Field containing the item category
        #[arg(short = 'c', long, default_value = "category")]
        category_field: String,

        /// Field containing the template ID
        #[arg(short = 't', long, default_value = "template")]
        template_field: String,

        /// Field containing the plaintext content
        #[arg(long, default_value = "content")]
        content_field: String,

        /// Set the target type for all items
        #[arg(long)]
        target_type: Option<String>,

        /// Set the target user ID for all items
        #[arg(long)]
        target_id: Option<String>,

        /// Set the category for all items
        #[arg(long)]
        category: Option<String>,

        /// Set the template for all items
        #[arg(long)]
        template: Option<String>,

        /// Import batch to tag the items with
        #[arg(long)]
        batch: Option<String>,

        file: Option<PathBuf>,
    },

    /// Print public content fragments (the site content set when no ids are given)
    Content {
        ids: Vec<String>,
    },
}

/// Apply command-line overrides on top of the loaded configuration
pub fn apply_to_config(cli: &Cli, config: ClientConfig) -> ClientConfig {
    match &cli.server {
        Some(server) => config.with_base_url(server.clone()),
        None => config,
    }
}
