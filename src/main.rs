use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use storefront_auth::authority::TokenAuthority;
use storefront_auth::cli::{
    Args, build_config, handle_create_admin, init_logging, load_secrets, open_database,
    validate_client_origin,
};
use storefront_auth::jwt::{JwtConfig, TokenLifetimes};
use storefront_auth::{create_app, init_cleanup};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env is fine; real deployments set the environment directly
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_format);

    let Some((access_secret, refresh_secret)) = load_secrets(&args) else {
        std::process::exit(1);
    };

    let Some(client_origin) = validate_client_origin(&args.client_origin) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if args.create_admin {
        let jwt = JwtConfig::with_lifetimes(
            access_secret.as_bytes(),
            refresh_secret.as_bytes(),
            TokenLifetimes {
                access_secs: args.access_ttl_secs,
                refresh_secs: args.refresh_ttl_secs,
            },
        );
        let authority = TokenAuthority::new(db.clone(), Arc::new(jwt));
        handle_create_admin(&authority, &args).await;
    }

    init_cleanup(&db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let config = build_config(&args, db, access_secret, refresh_secret, client_origin);
    let app = create_app(&config);

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
