use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;

use parley_server::ai::ReplyClient;
use parley_server::call::state::CallRegistry;
use parley_server::config::{generate_config_template, Config};
use parley_server::notify::Notifier;
use parley_server::state::AppState;
use parley_server::{db, routes, users, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "parley_server=info".parse().expect("valid filter")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "parley_server=info".parse().expect("valid filter")),
            )
            .init();
    }

    tracing::info!("Parley server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Media-room token secret: generate an ephemeral one if unset
    let mut media = config.media.clone().unwrap_or_default();
    if media.server_secret.is_empty() {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        media.server_secret = STANDARD.encode(secret);
        tracing::warn!(
            "media.server_secret not configured; generated an ephemeral secret. \
             issued tokens will not survive a restart"
        );
    }

    // Resolve the assistant identity before any traffic flows, so the
    // routing hot path checks a shared id instead of a magic value.
    let assistant_cfg = config.assistant.clone().unwrap_or_default();
    let assistant_id = Arc::new(RwLock::new(None));
    if assistant_cfg.enabled {
        let resolved = {
            let conn = db.lock().map_err(|_| "database lock poisoned")?;
            users::store::ensure_assistant(&conn, &assistant_cfg.username)?
        };
        if let Ok(mut guard) = assistant_id.write() {
            *guard = Some(resolved);
        }
    }

    // Reply-generation collaborator (best-effort; absent when disabled)
    let reply_client = if assistant_cfg.enabled && !assistant_cfg.api_url.is_empty() {
        match ReplyClient::new(&assistant_cfg) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "Assistant reply client unavailable");
                None
            }
        }
    } else {
        None
    };

    // Build application state
    let sessions = ws::new_session_registry();
    let calls = CallRegistry::new();
    calls.spawn_sweeper();

    let notifier = Arc::new(Notifier::new());

    let app_state = AppState {
        db,
        sessions: sessions.clone(),
        calls,
        notifier: notifier.clone(),
        assistant_id,
        reply_client,
        media,
    };

    // Build router, then attach the live transport to the notifier;
    // anything emitted before this point was queued and drains now.
    let app = routes::build_router(app_state);
    notifier.attach_transport(sessions);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
