//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::{Database, NewUser, UserRole};
use crate::principal::hash_password;
use crate::tokens::{TokenConfig, generate_secret};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokengate",
    about = "Cookie session authentication with silent token renewal"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291", env = "TOKENGATE_PORT")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "tokengate.db", env = "TOKENGATE_DATABASE")]
    pub database: String,

    /// Deployment name used to prefix cookie names (slugged)
    #[arg(long, default_value = "tokengate", env = "TOKENGATE_COOKIE_PREFIX")]
    pub cookie_prefix: String,

    /// Access token lifetime, re-applied on every request
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub access_ttl_minutes: u64,

    /// Refresh token lifetime, re-applied on every renewal
    #[arg(long, default_value_t = 1440, value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_ttl_minutes: u64,

    /// Replace access tokens this close to expiry instead of extending them (0 disables)
    #[arg(long, default_value_t = 0)]
    pub refresh_threshold_minutes: u64,

    /// User ID whose existing tokens survive a new login (repeatable)
    #[arg(long = "protected-owner", value_name = "USER_ID")]
    pub protected_owners: Vec<i64>,

    /// Omit the Secure flag on cookies (plain HTTP development setups only)
    #[arg(long)]
    pub insecure_cookies: bool,

    /// Use the first X-Forwarded-For entry as client IP (requires a reverse proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Do not run the expired token cleanup task
    #[arg(long)]
    pub no_cleanup: bool,

    /// Create an admin account with this email on startup and print its password
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Build the token policy from arguments.
/// Returns None and logs an error if the combination is unusable.
pub fn token_config(args: &Args) -> Option<TokenConfig> {
    if args.refresh_threshold_minutes >= args.access_ttl_minutes {
        error!(
            threshold = args.refresh_threshold_minutes,
            access_ttl = args.access_ttl_minutes,
            "Refresh threshold must be shorter than the access token lifetime"
        );
        return None;
    }

    if args.refresh_ttl_minutes < args.access_ttl_minutes {
        warn!("Refresh tokens expire before access tokens; sessions cannot be renewed");
    }

    Some(TokenConfig {
        access_ttl: Duration::from_secs(args.access_ttl_minutes * 60),
        refresh_ttl: Duration::from_secs(args.refresh_ttl_minutes * 60),
        refresh_threshold: Duration::from_secs(args.refresh_threshold_minutes * 60),
        protected_owner_ids: args.protected_owners.clone(),
    })
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database) -> Option<ServerConfig> {
    let token_config = token_config(args)?;

    if args.insecure_cookies {
        warn!("Cookies are sent without the Secure flag");
    }

    Some(ServerConfig {
        db,
        token_config,
        cookie_prefix: args.cookie_prefix.clone(),
        secure_cookies: !args.insecure_cookies,
        trust_forwarded_for: args.trust_forwarded_for,
    })
}

/// Handle the --create-admin flag: create the admin and print a one-time password.
/// An existing account with that email is left untouched.
pub async fn handle_create_admin(db: &Database, email: &str) {
    let email = email.trim();
    if !email.contains('@') {
        error!(email = %email, "Admin email is not a valid address");
        std::process::exit(1);
    }

    match db.users().get_by_email(email).await {
        Ok(Some(existing)) => {
            println!();
            println!("Account already exists: {}", existing.email);
            println!();
        }
        Ok(None) => {
            let password = generate_secret();
            let password_hash = match hash_password(&password) {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };
            let uuid = Uuid::new_v4().to_string();
            let name = email.split('@').next().unwrap_or(email);

            let new_user = NewUser {
                uuid: &uuid,
                email,
                name,
                password_hash: &password_hash,
                role: UserRole::Admin,
            };
            match db.users().create(&new_user).await {
                Ok(id) => {
                    info!(user_id = id, "Admin user created");
                    println!();
                    println!("Admin user created: {}", email);
                    println!("Password (shown once): {}", password);
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["tokengate"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.cookie_prefix, "tokengate");
        assert!(!args.insecure_cookies);

        let config = token_config(&args).unwrap();
        assert_eq!(config.access_ttl, Duration::from_secs(600));
        assert_eq!(config.refresh_ttl, Duration::from_secs(86400));
        assert_eq!(config.refresh_threshold, Duration::ZERO);
        assert!(config.protected_owner_ids.is_empty());
    }

    #[test]
    fn test_protected_owners_repeat() {
        let args = parse(&["--protected-owner", "1", "--protected-owner", "7"]);
        let config = token_config(&args).unwrap();
        assert!(config.is_protected(1));
        assert!(config.is_protected(7));
        assert!(!config.is_protected(2));
    }

    #[test]
    fn test_threshold_must_be_below_access_ttl() {
        let args = parse(&["--access-ttl-minutes", "5", "--refresh-threshold-minutes", "5"]);
        assert!(token_config(&args).is_none());

        let args = parse(&["--access-ttl-minutes", "5", "--refresh-threshold-minutes", "2"]);
        assert_eq!(
            token_config(&args).unwrap().refresh_threshold,
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let argv = ["tokengate", "--access-ttl-minutes", "0"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[tokio::test]
    async fn test_create_admin() {
        let db = Database::open(":memory:").await.unwrap();
        handle_create_admin(&db, " root@example.com ").await;

        let admin = db.users().get_by_email("root@example.com").await.unwrap().unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.name, "root");

        // Second call leaves the account alone.
        handle_create_admin(&db, "root@example.com").await;
        let again = db.users().get_by_email("root@example.com").await.unwrap().unwrap();
        assert_eq!(again.uuid, admin.uuid);
    }
}
