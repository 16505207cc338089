use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::ingest::ManualArgs;
use commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "adl")]
#[command(about = "AdLedger ingestion CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Store tokens for a connected platform account
    Connect {
        #[arg(long)]
        user: String,

        /// google_ads | meta_ads | tiktok_ads | stripe | revenuecat
        #[arg(long)]
        platform: String,

        /// Access token, or the secret API key for key-authenticated platforms
        #[arg(long)]
        access_token: String,

        #[arg(long)]
        refresh_token: Option<String>,

        /// Access token lifetime in seconds (default one hour)
        #[arg(long)]
        expires_in: Option<i64>,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Full resync of one platform account over a date window
    Sync {
        #[arg(long)]
        user: String,

        #[arg(long)]
        platform: String,

        /// Provider-side account id (customer id, ad account, advertiser id)
        #[arg(long)]
        account: String,

        /// First day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        start: String,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        end: String,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Extra criterion-id -> country JSON mapping for Google Ads
        #[arg(long)]
        geo_mapping: Option<String>,
    },

    /// Feed a stored webhook payload through the ingest path
    Webhook {
        #[command(subcommand)]
        cmd: WebhookCmd,
    },

    /// Overwrite one aggregate key with hand-entered values
    Manual {
        #[arg(long)]
        user: String,

        #[arg(long, default_value = "manual")]
        platform: String,

        /// Day, YYYY-MM-DD
        #[arg(long)]
        date: String,

        /// Alpha-2 country. Required unless --campaign is given.
        #[arg(long)]
        country: Option<String>,

        /// Write a campaign row instead of a country row
        #[arg(long)]
        campaign: Option<String>,

        #[arg(long)]
        campaign_name: Option<String>,

        #[arg(long, default_value = "0")]
        spend: String,

        #[arg(long, default_value = "0")]
        revenue: String,

        #[arg(long, default_value_t = 0)]
        impressions: i64,

        #[arg(long, default_value_t = 0)]
        clicks: i64,

        #[arg(long, default_value_t = 0)]
        purchases: i64,

        /// Currency of --spend/--revenue
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Add to the stored value instead of replacing it
        #[arg(long, default_value_t = false)]
        add: bool,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Per-campaign country attribution settings
    Attribution {
        #[command(subcommand)]
        cmd: AttributionCmd,
    },

    /// Country view (direct + attributed) for a user over a window
    Rollup {
        #[arg(long)]
        user: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,
    },

    /// Exchange-rate utilities
    Fx {
        #[command(subcommand)]
        cmd: FxCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum WebhookCmd {
    /// RevenueCat event JSON
    Revenuecat {
        #[arg(long)]
        user: String,

        /// Path to the request body
        #[arg(long)]
        file: String,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum AttributionCmd {
    /// Create or replace a campaign's setting
    Set {
        #[arg(long)]
        user: String,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        campaign: String,

        /// none | single | multiple
        #[arg(long)]
        mode: String,

        /// Required when --mode single
        #[arg(long)]
        country: Option<String>,
    },

    /// List a user's stored settings
    Show {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum FxCmd {
    /// Convert an amount into USD
    Convert {
        #[arg(long)]
        amount: String,

        #[arg(long)]
        currency: String,

        #[arg(long = "config")]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = adl_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = adl_db::status(&pool).await?;
                    println!("db_ok={} has_aggregate_tables={}", s.ok, s.has_aggregate_tables);
                }
                DbCmd::Migrate => {
                    adl_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = adl_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Connect {
            user,
            platform,
            access_token,
            refresh_token,
            expires_in,
            config_paths,
        } => {
            commands::sync::run_connect(user, platform, access_token, refresh_token, expires_in, config_paths)
                .await?;
        }

        Commands::Sync {
            user,
            platform,
            account,
            start,
            end,
            config_paths,
            geo_mapping,
        } => {
            commands::sync::run_sync(SyncArgs {
                user,
                platform,
                account,
                start,
                end,
                config_paths,
                geo_mapping,
            })
            .await?;
        }

        Commands::Webhook { cmd } => match cmd {
            WebhookCmd::Revenuecat {
                user,
                file,
                config_paths,
            } => commands::ingest::run_webhook_revenuecat(user, file, config_paths).await?,
        },

        Commands::Manual {
            user,
            platform,
            date,
            country,
            campaign,
            campaign_name,
            spend,
            revenue,
            impressions,
            clicks,
            purchases,
            currency,
            add,
            config_paths,
        } => {
            commands::ingest::run_manual(ManualArgs {
                user,
                platform,
                date,
                country,
                campaign,
                campaign_name,
                spend,
                revenue,
                impressions,
                clicks,
                purchases,
                currency,
                add,
                config_paths,
            })
            .await?;
        }

        Commands::Attribution { cmd } => match cmd {
            AttributionCmd::Set {
                user,
                platform,
                campaign,
                mode,
                country,
            } => commands::attribution::run_attribution_set(user, platform, campaign, mode, country).await?,
            AttributionCmd::Show { user } => commands::attribution::run_attribution_show(user).await?,
        },

        Commands::Rollup { user, start, end } => {
            commands::attribution::run_rollup(user, start, end).await?;
        }

        Commands::Fx { cmd } => match cmd {
            FxCmd::Convert {
                amount,
                currency,
                config_paths,
            } => commands::ingest::run_fx_convert(amount, currency, config_paths).await?,
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
