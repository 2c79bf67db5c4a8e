//! Command-line interface for content-store.
//!
//! Operator tooling for inspecting and maintaining a store: creating
//! records from JSON files, attaching and reading files, listing and
//! deleting content.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::StoreSettings;
use crate::domain::{ContentId, User};
use crate::store::ContentStore;

/// content-store - Directory-backed content storage
#[derive(Parser, Debug)]
#[command(name = "content-store")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Store root (overrides config file and CONTENT_STORE_ROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Acting user id
    #[arg(long, global = true, default_value = "cli", env = "CONTENT_STORE_USER")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a content object from two JSON documents
    Create {
        /// Metadata document (h5p.json)
        #[arg(short, long)]
        metadata: PathBuf,

        /// Primary content document (content.json)
        #[arg(short, long)]
        content: PathBuf,

        /// Use this id instead of drawing a random one
        #[arg(long)]
        id: Option<ContentId>,
    },

    /// Check whether a content object exists
    Exists { id: ContentId },

    /// Delete a content object and all of its files
    Delete { id: ContentId },

    /// Attach a file to a content object
    Attach {
        id: ContentId,

        /// Path inside the content file area
        path: String,

        /// Local file to copy
        source: PathBuf,
    },

    /// List attached files
    Files { id: ContentId },

    /// Write an attached file to stdout
    Cat { id: ContentId, path: String },

    /// Show size and modification time of an attached file
    Stat { id: ContentId, path: String },

    /// Remove one attached file
    Rm { id: ContentId, path: String },

    /// Print the metadata document
    Metadata { id: ContentId },

    /// List all content ids
    List,

    /// Show the permissions the acting user holds
    Permissions { id: ContentId },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let store = self.open_store()?;
        let user = User::new(self.user.clone(), self.user.clone());

        match self.command {
            Commands::Create {
                metadata,
                content,
                id,
            } => create_content(&store, &user, &metadata, &content, id).await,
            Commands::Exists { id } => {
                println!("{}", store.content_exists(id).await?);
                Ok(())
            }
            Commands::Delete { id } => {
                store.delete_content(id, Some(&user)).await?;
                println!("Deleted content {}", id);
                Ok(())
            }
            Commands::Attach { id, path, source } => {
                attach_file(&store, &user, id, &path, &source).await
            }
            Commands::Files { id } => {
                let mut files = store.get_content_files(id, &user).await?;
                files.sort();
                for file in files {
                    println!("{}", file);
                }
                Ok(())
            }
            Commands::Cat { id, path } => cat_file(&store, &user, id, &path).await,
            Commands::Stat { id, path } => {
                let stats = store.get_content_file_stats(id, &path, &user).await?;
                println!("Path: {}", path);
                println!("Size: {} bytes", stats.size);
                if let Some(modified) = stats.modified {
                    println!("Modified: {}", modified.to_rfc3339());
                }
                Ok(())
            }
            Commands::Rm { id, path } => {
                store.delete_content_file(id, &path, &user).await?;
                println!("Removed {} from content {}", path, id);
                Ok(())
            }
            Commands::Metadata { id } => {
                let metadata: Value = store.get_metadata(id, &user).await?;
                println!("{}", serde_json::to_string_pretty(&metadata)?);
                Ok(())
            }
            Commands::List => {
                for id in store.list_content().await? {
                    println!("{}", id);
                }
                Ok(())
            }
            Commands::Permissions { id } => {
                let granted = store.get_user_permissions(id, &user).await?;
                let names: Vec<String> = granted.iter().map(|p| p.to_string()).collect();
                println!("{}", names.join(", "));
                Ok(())
            }
            Commands::Config => show_config(&store),
        }
    }

    fn open_store(&self) -> Result<ContentStore> {
        match &self.root {
            Some(root) => {
                let config = crate::config::config()?;
                let settings = StoreSettings {
                    root: root.clone(),
                    ..config.store.clone()
                };
                Ok(ContentStore::new(settings))
            }
            None => ContentStore::from_config(),
        }
    }
}

async fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn create_content(
    store: &ContentStore,
    user: &User,
    metadata_path: &Path,
    content_path: &Path,
    id: Option<ContentId>,
) -> Result<()> {
    let metadata = read_json(metadata_path).await?;
    let content = read_json(content_path).await?;

    let id = store.create_content(&metadata, &content, user, id).await?;
    println!("{}", id);
    Ok(())
}

async fn attach_file(
    store: &ContentStore,
    user: &User,
    id: ContentId,
    path: &str,
    source: &Path,
) -> Result<()> {
    let mut file = fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open {}", source.display()))?;

    let written = store.add_content_file(id, path, &mut file, user).await?;
    eprintln!("Attached {} ({} bytes) to content {}", path, written, id);
    Ok(())
}

async fn cat_file(store: &ContentStore, user: &User, id: ContentId, path: &str) -> Result<()> {
    let mut stream = store.get_content_file_stream(id, path, user).await?;
    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut stream, &mut stdout)
        .await
        .context("Failed to write file to stdout")?;
    stdout.flush().await?;
    Ok(())
}

fn show_config(store: &ContentStore) -> Result<()> {
    let config = crate::config::config()?;

    println!("Store root: {}", store.root().display());
    println!("Id attempts: {}", config.store.max_id_attempts);
    println!("Max id: {}", config.store.max_id);
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    Ok(())
}
