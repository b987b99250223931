//! the `authkeys` subcommand - mint and list auth keys directly in the database

use clap::{Args, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use tidescale_db::{Repository, TidescaleDb};
use tidescale_policy::PolicyEngine;
use tidescale_types::{AuthKey, AuthKeyId, AuthKeyToken, Tag, Tailnet, TailnetId, User, UserId};
use tracing::info;

use super::ConfigArgs;

/// manage auth keys
#[derive(Subcommand, Debug)]
pub enum AuthkeysCommand {
    /// create a new auth key
    Create(CreateArgs),

    /// list a tailnet's auth keys
    List(ListArgs),
}

/// create a new auth key
#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    common: ConfigArgs,

    /// tailnet name (defaults to the configured default tailnet)
    #[arg(long)]
    tailnet: Option<String>,

    /// login name of the owning user, created if missing
    #[arg(short, long)]
    user: String,

    /// make registered nodes ephemeral (deleted once inactive)
    #[arg(long, default_value_t = false)]
    ephemeral: bool,

    /// registered nodes skip machine authorization
    #[arg(long, default_value_t = false)]
    preauthorized: bool,

    /// key expiration in days; omit for a key that never expires
    #[arg(long)]
    expiration_days: Option<i64>,

    /// tags to apply to nodes registered with this key (comma-separated)
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
}

/// list auth keys
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    common: ConfigArgs,

    /// tailnet name (defaults to the configured default tailnet)
    #[arg(long)]
    tailnet: Option<String>,
}

impl AuthkeysCommand {
    /// run the authkeys command
    pub async fn run(self) -> Result<()> {
        match self {
            AuthkeysCommand::Create(args) => {
                let config = args.common.load()?;
                let db = TidescaleDb::new(&config)
                    .await
                    .context("failed to open database")?;
                let tailnet = args
                    .tailnet
                    .clone()
                    .unwrap_or_else(|| config.default_tailnet.clone());
                let (key, token) = create_key(&db, &tailnet, &args).await?;

                println!("Created auth key:");
                println!("  Key:           {token}");
                println!("  Tailnet:       {tailnet}");
                println!("  User:          {}", args.user);
                println!("  Ephemeral:     {}", key.ephemeral);
                println!("  Preauthorized: {}", key.pre_authorized);
                println!(
                    "  Expires:       {}",
                    key.expires_at
                        .map(|e| e.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
                if !key.tags.is_empty() {
                    let tags: Vec<&str> = key.tags.iter().map(Tag::as_str).collect();
                    println!("  Tags:          {}", tags.join(", "));
                }
                Ok(())
            }
            AuthkeysCommand::List(args) => {
                let config = args.common.load()?;
                let db = TidescaleDb::new(&config)
                    .await
                    .context("failed to open database")?;
                let name = args.tailnet.unwrap_or(config.default_tailnet);
                let tailnet = db
                    .get_tailnet_by_name(&name)
                    .await?
                    .ok_or_else(|| eyre!("no tailnet named {name}"))?;
                list_keys(&db.list_auth_keys(tailnet.id).await?);
                Ok(())
            }
        }
    }
}

/// normalize tag to have tag: prefix
fn normalize_tag(tag: &str) -> String {
    if tag.starts_with("tag:") {
        tag.to_string()
    } else {
        format!("tag:{}", tag)
    }
}

async fn create_key(
    db: &TidescaleDb,
    tailnet_name: &str,
    args: &CreateArgs,
) -> Result<(AuthKey, AuthKeyToken)> {
    let tailnet = match db.get_tailnet_by_name(tailnet_name).await? {
        Some(tailnet) => tailnet,
        None => db
            .create_tailnet(&Tailnet::new(TailnetId(0), tailnet_name))
            .await
            .context("failed to create tailnet")?,
    };
    let user = match db.get_user_by_name(tailnet.id, &args.user).await? {
        Some(user) => user,
        None => db
            .create_user(&User::new(UserId(0), tailnet.id, args.user.as_str()))
            .await
            .context("failed to create user")?,
    };

    // key tags are not checked again at registration, so they are checked here
    let tags = Tag::parse_all(args.tags.iter().map(|t| normalize_tag(t)))?;
    if !tags.is_empty() {
        let engine = PolicyEngine::from_document(&tailnet.acl_policy)
            .map_err(|e| eyre!("tailnet policy is invalid: {e}"))?;
        engine.check_tag_owners(&tags, &user)?;
    }

    let now = chrono::Utc::now();
    let token = AuthKeyToken::generate();
    let key = AuthKey {
        id: AuthKeyId(0),
        key: token.key().to_string(),
        secret_hash: token.secret_hash().to_vec(),
        tailnet_id: tailnet.id,
        user_id: user.id,
        ephemeral: args.ephemeral,
        pre_authorized: args.preauthorized,
        tags,
        expires_at: args
            .expiration_days
            .map(|days| now + chrono::Duration::days(days)),
        created_at: now,
    };
    let key = db.create_auth_key(&key).await?;
    info!(key_id = %key.id, tailnet = %tailnet.name, "auth key created");
    Ok((key, token))
}

fn list_keys(keys: &[AuthKey]) {
    if keys.is_empty() {
        println!("No auth keys found.");
        return;
    }

    println!(
        "{:<6} {:<14} {:<6} {:<9} {:<8} {:<20} TAGS",
        "ID", "KEY", "USER", "EPHEMERAL", "PREAUTH", "EXPIRES"
    );
    println!("{}", "-".repeat(80));

    for key in keys {
        let expires = key
            .expires_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        let tags = if key.tags.is_empty() {
            "-".to_string()
        } else {
            key.tags
                .iter()
                .map(Tag::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };

        println!(
            "{:<6} {:<14} {:<6} {:<9} {:<8} {:<20} {}",
            key.id.0, key.key, key.user_id.0, key.ephemeral, key.pre_authorized, expires, tags
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(user: &str, tags: &[&str]) -> CreateArgs {
        CreateArgs {
            common: ConfigArgs::default(),
            tailnet: None,
            user: user.to_string(),
            ephemeral: true,
            preauthorized: false,
            expiration_days: Some(7),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("server"), "tag:server");
        assert_eq!(normalize_tag("tag:server"), "tag:server");
    }

    #[tokio::test]
    async fn test_create_key_bootstraps_tailnet_and_user() {
        let db = TidescaleDb::new_in_memory().await.unwrap();
        let (key, token) = create_key(&db, "home", &args("alice@example.com", &[]))
            .await
            .unwrap();

        let stored = db.get_auth_key(token.key()).await.unwrap().unwrap();
        assert!(stored.verify(&token));
        assert!(stored.ephemeral);
        assert!(key.expires_at.is_some());

        let tailnet = db.get_tailnet_by_name("home").await.unwrap().unwrap();
        assert_eq!(stored.tailnet_id, tailnet.id);

        // a second key reuses both
        create_key(&db, "home", &args("alice@example.com", &[]))
            .await
            .unwrap();
        assert_eq!(db.list_tailnets().await.unwrap().len(), 1);
        assert_eq!(db.list_auth_keys(tailnet.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tagged_key_needs_owner() {
        let db = TidescaleDb::new_in_memory().await.unwrap();
        let mut tailnet = Tailnet::new(TailnetId(0), "home");
        tailnet.acl_policy = r#"{"tagOwners": {"tag:server": ["alice@example.com"]}}"#.to_string();
        db.create_tailnet(&tailnet).await.unwrap();

        assert!(create_key(&db, "home", &args("bob@example.com", &["server"])).await.is_err());

        let (key, _) = create_key(&db, "home", &args("alice@example.com", &["server"]))
            .await
            .unwrap();
        assert_eq!(key.tags[0].as_str(), "tag:server");
    }
}
