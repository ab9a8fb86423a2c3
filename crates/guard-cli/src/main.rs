//! Guardian CLI
//!
//! Command-line surface for the Guardian content-access policy engine. Wires
//! a JSON-file store and rule sink to the synchronization trigger, so every
//! list mutation is followed by a full rule-set rebuild, and gates the
//! commands the options surfaces gate behind a verified credential.

mod license;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast;

use guard_auth::{
    generate_recovery_kit, has_password, set_password, verify_credential, RecoveryKit,
    Verification, VerifyMethod,
};
use guard_compiler::{blocklog, lists, Engine, RuleSink, SyncTrigger};
use guard_core::matcher::{match_navigation, NavigationVerdict};
use guard_core::notice::{obfuscate_url, BlockNotice};
use guard_core::storage::{self, keys, ChangeNotification, StorageBackend, StorageMap};

use crate::store::{JsonFileStore, JsonRuleSink};

#[derive(Parser)]
#[command(name = "guardian")]
#[command(about = "Guardian content-access policy engine")]
struct Cli {
    /// Path to the JSON store
    #[arg(long, global = true, default_value = "guardian.json")]
    store: PathBuf,

    /// Path to the installed-rules file
    #[arg(long, global = true, default_value = "guardian-rules.json")]
    rules: PathBuf,

    /// Credential for gated commands (password, recovery code, or phrase)
    #[arg(
        long,
        short = 'p',
        global = true,
        env = "GUARDIAN_PASSWORD",
        hide_env_values = true
    )]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the password, generate a recovery kit, and turn protection on
    Init {
        /// The new password (at least 8 characters)
        #[arg(value_name = "NEW_PASSWORD")]
        new_password: String,

        /// Also apply the recommended block lists
        #[arg(long)]
        recommended: bool,
    },

    /// Show protection status and counters
    Status,

    /// Turn protection on
    Enable,

    /// Turn protection off (credential-gated)
    Disable,

    /// Block a domain or keyword
    Block {
        /// A domain like shop.test or a keyword of 3+ characters
        value: String,
    },

    /// Remove a blocked domain or keyword (credential-gated)
    Unblock { value: String },

    /// Add a standing allow for a domain (credential-gated)
    Allow {
        domain: String,

        /// Also allow its subdomains
        #[arg(long)]
        subdomains: bool,
    },

    /// Time-boxed allow for a domain or an exact URL (credential-gated)
    TempAllow {
        /// A domain, or a full http(s) URL
        subject: String,

        /// Minutes until the grant expires
        #[arg(long, default_value_t = 10)]
        minutes: i64,
    },

    /// Recompile and install the rule set
    Rebuild,

    /// Evaluate a navigation URL against the installed rules
    Check {
        url: String,

        /// Record a block event in the log
        #[arg(long)]
        record: bool,
    },

    /// Regenerate the recovery kit (credential-gated)
    Recovery,

    /// Show recent block events
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Manage the local pro license
    License {
        #[command(subcommand)]
        action: LicenseAction,
    },
}

#[derive(Subcommand)]
enum LicenseAction {
    /// Show license state
    Status,
    /// Activate a local key
    Activate { key: String },
    /// Generate a fresh local key
    Generate,
}

struct App {
    store: Arc<JsonFileStore>,
    sink: Arc<JsonRuleSink>,
    trigger: SyncTrigger<JsonFileStore, JsonRuleSink>,
    password: Option<String>,
    changes: broadcast::Receiver<ChangeNotification>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let store = Arc::new(JsonFileStore::new(&cli.store));
    let changes = store.subscribe();
    let sink = Arc::new(JsonRuleSink::new(&cli.rules));
    let trigger = SyncTrigger::new(Engine::new(store.clone(), sink.clone()));

    let mut app = App {
        store,
        sink,
        trigger,
        password: cli.password,
        changes,
    };

    let result = match cli.command {
        Commands::Init {
            new_password,
            recommended,
        } => cmd_init(&mut app, &new_password, recommended).await,
        Commands::Status => cmd_status(&app).await,
        Commands::Enable => cmd_set_enabled(&mut app, true).await,
        Commands::Disable => cmd_set_enabled(&mut app, false).await,
        Commands::Block { value } => cmd_block(&mut app, &value).await,
        Commands::Unblock { value } => cmd_unblock(&mut app, &value).await,
        Commands::Allow { domain, subdomains } => cmd_allow(&mut app, &domain, subdomains).await,
        Commands::TempAllow { subject, minutes } => {
            cmd_temp_allow(&mut app, &subject, minutes).await
        }
        Commands::Rebuild => cmd_rebuild(&app).await,
        Commands::Check { url, record } => cmd_check(&app, &url, record).await,
        Commands::Recovery => cmd_recovery(&mut app).await,
        Commands::Log { limit } => cmd_log(&app, limit).await,
        Commands::License { action } => cmd_license(&app, action).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

impl App {
    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Run queued change notifications through the synchronization trigger,
    /// in delivery order.
    async fn sync_pending(&mut self) -> Result<(), String> {
        loop {
            match self.changes.try_recv() {
                Ok(notification) => {
                    self.trigger
                        .handle_change(&notification.changed_keys, Self::now_ms())
                        .await
                        .map_err(|e| e.to_string())?;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    self.trigger
                        .engine()
                        .rebuild(Self::now_ms())
                        .await
                        .map_err(|e| e.to_string())?;
                }
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Gate a mutating command the way the options page gates its actions:
    /// skipped when the lock is off or no password exists yet, otherwise a
    /// credential must verify.
    async fn require_credential(&self) -> Result<(), String> {
        let map = self
            .store
            .get(&[keys::LOCK_ENABLED])
            .await
            .map_err(|e| e.to_string())?;
        if !storage::bool_flag(&map, keys::LOCK_ENABLED, true) {
            return Ok(());
        }
        if !has_password(self.store.as_ref())
            .await
            .map_err(|e| e.to_string())?
        {
            return Ok(());
        }

        let Some(candidate) = self.password.as_deref() else {
            return Err(
                "this command is locked; pass --password or set GUARDIAN_PASSWORD".to_string(),
            );
        };
        match verify_credential(self.store.as_ref(), candidate)
            .await
            .map_err(|e| e.to_string())?
        {
            Verification::Accepted {
                method: VerifyMethod::RecoveryCode,
                ..
            } => {
                println!("Unlocked with a recovery code; that code is now invalid.");
                Ok(())
            }
            Verification::Accepted { .. } => Ok(()),
            Verification::Rejected => Err("invalid password or recovery credential".to_string()),
        }
    }
}

async fn cmd_init(app: &mut App, new_password: &str, recommended: bool) -> Result<(), String> {
    if has_password(app.store.as_ref())
        .await
        .map_err(|e| e.to_string())?
    {
        app.require_credential().await?;
    }

    set_password(app.store.as_ref(), new_password)
        .await
        .map_err(|e| e.to_string())?;
    let kit = generate_recovery_kit(app.store.as_ref())
        .await
        .map_err(|e| e.to_string())?;

    let map = app
        .store
        .get(&[keys::LOCK_ENABLED])
        .await
        .map_err(|e| e.to_string())?;
    let mut entries = StorageMap::new();
    entries.insert(keys::SETUP_COMPLETE.to_string(), json!(true));
    entries.insert(keys::ENABLED.to_string(), json!(true));
    if !map.contains_key(keys::LOCK_ENABLED) {
        entries.insert(keys::LOCK_ENABLED.to_string(), json!(true));
    }
    app.store.set(entries).await.map_err(|e| e.to_string())?;

    if recommended {
        apply_recommended(app.store.as_ref()).await?;
    }
    app.sync_pending().await?;

    println!("Password set. Protection is ON.");
    print_recovery_kit(&kit);
    Ok(())
}

/// Merge the recommended lists in one write per key family.
async fn apply_recommended(store: &JsonFileStore) -> Result<(), String> {
    let map = store
        .get(&[
            keys::BLOCKED_DOMAINS,
            keys::BLOCKED_SUBDOMAINS,
            keys::BLOCKED_KEYWORDS,
        ])
        .await
        .map_err(|e| e.to_string())?;

    let mut domains = storage::string_list(&map, keys::BLOCKED_DOMAINS);
    let mut subdomains = storage::string_list(&map, keys::BLOCKED_SUBDOMAINS);
    let mut keywords = storage::string_list(&map, keys::BLOCKED_KEYWORDS);

    for &domain in lists::RECOMMENDED_BLOCKED_DOMAINS {
        if !domains.iter().any(|d| d == domain) {
            domains.push(domain.to_string());
        }
        if !subdomains.iter().any(|d| d == domain) {
            subdomains.push(domain.to_string());
        }
    }
    for &keyword in lists::RECOMMENDED_BLOCKED_KEYWORDS {
        if !keywords.iter().any(|k| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }

    let mut entries = StorageMap::new();
    entries.insert(keys::BLOCKED_DOMAINS.to_string(), json!(domains));
    entries.insert(keys::BLOCKED_SUBDOMAINS.to_string(), json!(subdomains));
    entries.insert(keys::BLOCKED_KEYWORDS.to_string(), json!(keywords));
    store.set(entries).await.map_err(|e| e.to_string())
}

fn print_recovery_kit(kit: &RecoveryKit) {
    println!();
    println!("Recovery codes (each works once):");
    for code in &kit.codes {
        println!("  {code}");
    }
    println!();
    println!("Recovery phrase (reusable):");
    println!("  {}", kit.phrase);
    println!();
    println!("Store these somewhere safe; they are not shown again.");
}

async fn cmd_status(app: &App) -> Result<(), String> {
    let snapshot = lists::ListSnapshot::read(app.store.as_ref())
        .await
        .map_err(|e| e.to_string())?;
    let map = app
        .store
        .get(&[keys::SETUP_COMPLETE])
        .await
        .map_err(|e| e.to_string())?;
    let setup = storage::bool_flag(&map, keys::SETUP_COMPLETE, false)
        && has_password(app.store.as_ref())
            .await
            .map_err(|e| e.to_string())?;

    let installed = app
        .sink
        .installed_rules()
        .await
        .map_err(|e| e.to_string())?;
    let blocked = blocklog::blocked_count(app.store.as_ref())
        .await
        .map_err(|e| e.to_string())?;
    let pro = license::is_pro(app.store.as_ref())
        .await
        .map_err(|e| e.to_string())?;

    if !setup {
        println!("Setup required: run `guardian init <password>`.");
    }
    println!(
        "Protection: {}",
        if snapshot.enabled { "ON" } else { "OFF" }
    );
    println!(
        "Blocked lists: {} domains, {} subdomains, {} keywords",
        snapshot.blocked_domains.len(),
        snapshot.blocked_subdomains.len(),
        snapshot.blocked_keywords.len()
    );
    println!(
        "Allow lists: {} domains, {} subdomains",
        snapshot.allow_domains.len(),
        snapshot.allow_subdomains.len()
    );
    println!(
        "Temporary allows: {} domains, {} urls",
        snapshot.temp_allow_domains.len(),
        snapshot.temp_allow_urls.len()
    );
    println!("Installed rules: {}", installed.len());
    println!("Navigations blocked: {blocked}");
    println!("License: {}", if pro { "pro" } else { "free" });
    Ok(())
}

async fn cmd_set_enabled(app: &mut App, enabled: bool) -> Result<(), String> {
    if !enabled {
        app.require_credential().await?;
    }
    lists::set_enabled(app.store.as_ref(), enabled)
        .await
        .map_err(|e| e.to_string())?;
    app.sync_pending().await?;
    println!("Protection {}", if enabled { "ON" } else { "OFF" });
    Ok(())
}

async fn cmd_block(app: &mut App, value: &str) -> Result<(), String> {
    let added = lists::quick_add(app.store.as_ref(), value)
        .await
        .map_err(|e| e.to_string())?;
    app.sync_pending().await?;
    match added {
        lists::QuickAdd::Domain(domain) => {
            println!("Blocking {domain} and its subdomains.");
        }
        lists::QuickAdd::Keyword(keyword) => {
            println!("Blocking URLs containing {keyword:?}.");
        }
    }
    Ok(())
}

async fn cmd_unblock(app: &mut App, value: &str) -> Result<(), String> {
    app.require_credential().await?;
    let domain = guard_core::normalize::normalize_domain(value);
    if guard_core::normalize::is_likely_domain(&domain) {
        lists::remove_blocked_domain(app.store.as_ref(), value)
            .await
            .map_err(|e| e.to_string())?;
        println!("Unblocked {domain}.");
    } else {
        lists::remove_blocked_keyword(app.store.as_ref(), value)
            .await
            .map_err(|e| e.to_string())?;
        println!("Unblocked keyword {:?}.", guard_core::normalize::normalize_keyword(value));
    }
    app.sync_pending().await
}

async fn cmd_allow(app: &mut App, domain: &str, subdomains: bool) -> Result<(), String> {
    app.require_credential().await?;
    let added = lists::add_allow_domain(app.store.as_ref(), domain, subdomains)
        .await
        .map_err(|e| e.to_string())?;
    app.sync_pending().await?;
    if subdomains {
        println!("Allowing {added} and its subdomains.");
    } else {
        println!("Allowing {added}.");
    }
    Ok(())
}

async fn cmd_temp_allow(app: &mut App, subject: &str, minutes: i64) -> Result<(), String> {
    app.require_credential().await?;
    let now_ms = App::now_ms();
    let entry = if subject.starts_with("http://") || subject.starts_with("https://") {
        lists::temp_allow_url(app.store.as_ref(), subject, minutes, now_ms)
            .await
            .map_err(|e| e.to_string())?
    } else {
        lists::temp_allow_domain(app.store.as_ref(), subject, minutes, now_ms)
            .await
            .map_err(|e| e.to_string())?
    };
    app.sync_pending().await?;
    println!(
        "Temporarily allowing {} for {} minute(s).",
        entry.subject, minutes
    );
    Ok(())
}

async fn cmd_rebuild(app: &App) -> Result<(), String> {
    let summary = app
        .trigger
        .engine()
        .rebuild(App::now_ms())
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "Installed {} rules (removed {}).",
        summary.installed, summary.removed
    );
    Ok(())
}

async fn cmd_check(app: &App, url: &str, record: bool) -> Result<(), String> {
    let rules = app
        .sink
        .installed_rules()
        .await
        .map_err(|e| e.to_string())?;

    match match_navigation(&rules, url) {
        NavigationVerdict::Unmatched => println!("ALLOWED (no rule matched)"),
        NavigationVerdict::Allowed { rule_id } => println!("ALLOWED by rule {rule_id}"),
        NavigationVerdict::Blocked {
            rule_id,
            kind,
            matched,
        } => {
            let notice = BlockNotice {
                kind,
                matched,
                url: url.trim().to_string(),
            };
            println!("BLOCKED by rule {rule_id}: {}", notice.reason());
            println!("redirect: /blocked/blocked.html?{}", notice.to_query());
            if record {
                blocklog::record_block(app.store.as_ref(), &notice, Utc::now())
                    .await
                    .map_err(|e| e.to_string())?;
                println!("Event recorded.");
            }
        }
    }
    Ok(())
}

async fn cmd_recovery(app: &mut App) -> Result<(), String> {
    app.require_credential().await?;
    let kit = generate_recovery_kit(app.store.as_ref())
        .await
        .map_err(|e| e.to_string())?;
    println!("New recovery kit generated; the previous one no longer works.");
    print_recovery_kit(&kit);
    Ok(())
}

async fn cmd_log(app: &App, limit: usize) -> Result<(), String> {
    let entries = blocklog::read_log(app.store.as_ref(), limit)
        .await
        .map_err(|e| e.to_string())?;
    let total = blocklog::blocked_count(app.store.as_ref())
        .await
        .map_err(|e| e.to_string())?;

    if entries.is_empty() {
        println!("No blocked navigations recorded.");
    }
    for entry in &entries {
        println!("{}  {}  {}", entry.at, entry.reason, obfuscate_url(&entry.url));
    }
    println!("Total blocked: {total}");
    Ok(())
}

async fn cmd_license(app: &App, action: LicenseAction) -> Result<(), String> {
    match action {
        LicenseAction::Status => {
            let pro = license::is_pro(app.store.as_ref())
                .await
                .map_err(|e| e.to_string())?;
            println!("License: {}", if pro { "pro" } else { "free" });
            for &feature in license::PRO_FEATURES {
                let usable = license::can_use_feature(app.store.as_ref(), feature)
                    .await
                    .map_err(|e| e.to_string())?;
                println!("  {feature}: {}", if usable { "available" } else { "locked" });
            }
        }
        LicenseAction::Activate { key } => {
            match license::activate_local_key(app.store.as_ref(), &key)
                .await
                .map_err(|e| e.to_string())?
            {
                Some(normalized) => println!("Activated {normalized}."),
                None => return Err("invalid license key".to_string()),
            }
        }
        LicenseAction::Generate => {
            let key = license::generate_license_key(&mut rand::thread_rng());
            println!("{key}");
        }
    }
    Ok(())
}
