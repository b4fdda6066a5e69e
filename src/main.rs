//! Rally - campaign creation service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rally::{
    auth::{AuthProvider, JwtValidator},
    config::Args,
    db::MongoClient,
    evidence::{
        HttpImageStore, HttpObjectStore, ImageStore, MemoryImageStore, MemoryObjectStore,
        NatsValidationQueue, ObjectStore, ValidationQueue,
    },
    nats::NatsClient,
    server::{self, AppState, Backends},
    store::{CampaignStore, MemoryCampaignStore, MongoCampaignStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("rally={},info", args.log_level).into());
    if args.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Rally - campaign creation service");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!(
        "Evidence validation: {}",
        if args.enable_ai_validation { "enabled" } else { "disabled" }
    );
    info!("======================================");

    // Campaign store (in-memory fallback in dev mode)
    let connected = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => MongoCampaignStore::new(client).await,
        Err(e) => Err(e),
    };
    let (store, store_kind): (Arc<dyn CampaignStore>, &'static str) = match connected {
        Ok(store) => {
            info!("MongoDB connected successfully");
            (Arc::new(store), "mongodb")
        }
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
            (Arc::new(MemoryCampaignStore::new()), "memory")
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let auth: Arc<dyn AuthProvider> = match &args.jwt_secret {
        Some(secret) => Arc::new(JwtValidator::new(secret.clone(), args.jwt_expiry_seconds)?),
        None => {
            warn!("JWT_SECRET not set, using the development signing secret");
            Arc::new(JwtValidator::new_dev())
        }
    };

    let objects: Arc<dyn ObjectStore> = match &args.object_store_url {
        Some(url) => Arc::new(HttpObjectStore::new(
            url,
            args.object_store_token.clone(),
            args.request_timeout(),
        )?),
        None => {
            warn!("OBJECT_STORE_URL not set, evidence files are kept in memory");
            Arc::new(MemoryObjectStore::new())
        }
    };

    let images: Arc<dyn ImageStore> = match &args.image_store_url {
        Some(url) => Arc::new(HttpImageStore::new(
            url,
            args.image_store_key.clone(),
            args.request_timeout(),
        )?),
        None => {
            warn!("IMAGE_STORE_URL not set, evidence images are kept in memory");
            Arc::new(MemoryImageStore::new())
        }
    };

    // Validation queue (optional; unavailable broker is fatal outside dev mode)
    let queue: Option<Arc<dyn ValidationQueue>> = if args.enable_ai_validation {
        match NatsClient::new(&args.nats, "rally").await {
            Ok(client) => {
                info!("NATS connected, publishing on {}", args.validation_subject);
                Some(Arc::new(NatsValidationQueue::new(
                    client,
                    args.validation_subject.clone(),
                )))
            }
            Err(e) if args.dev_mode => {
                warn!("NATS connection failed (dev mode, validation disabled): {}", e);
                None
            }
            Err(e) => {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let state = Arc::new(AppState::new(
        args,
        Backends {
            store,
            store_kind,
            auth,
            objects,
            images,
            queue,
        },
    ));

    server::run(state).await?;
    info!("Rally stopped");
    Ok(())
}
