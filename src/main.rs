use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use country_favorites::{
    build_api_route_filter, handle_api_errors, init_logging, Api, ApiConfig, Args,
    RestCountriesClient, SqlStore,
};
use tokio::sync::Mutex;
use tracing::{error, info};
use warp::Filter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let countries =
        RestCountriesClient::with_timeout(&args.countries_api_url, args.countries_api_timeout)
            .unwrap_or_else(|e| {
                error!(error = %e, "Invalid country API configuration");
                std::process::exit(1);
            });

    let store = SqlStore::connect(&args.database_url)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, url = %args.database_url, "Failed to open database");
            std::process::exit(1);
        });
    info!(url = %args.database_url, "Database ready");

    let store = Arc::new(Mutex::new(store));

    let config = ApiConfig {
        tokens: args.token_config(),
        users: store.clone(),
        favorites: store,
        countries: Arc::new(countries),
    };

    let api = Api::new(config).unwrap_or_else(|e| {
        error!(error = %e, "Refusing to start without token secrets");
        std::process::exit(1);
    });

    // origins are already checked by `parse_origin`
    let cors = warp::cors()
        .allow_origins(args.allowed_origins.iter().map(String::as_str))
        .allow_credentials(true)
        .allow_headers(vec!["authorization", "content-type"])
        .allow_methods(vec!["GET", "POST", "DELETE"]);

    let routes = build_api_route_filter(&api)
        .recover(handle_api_errors)
        .with(cors)
        .with(warp::trace::request());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    match (args.tls_cert, args.tls_key) {
        (Some(cert), Some(key)) => {
            info!(address = %addr, "Listening (TLS)");
            warp::serve(routes)
                .tls()
                .cert_path(cert)
                .key_path(key)
                .run(addr)
                .await;
        }
        _ => {
            info!(address = %addr, "Listening");
            warp::serve(routes).run(addr).await;
        }
    }
}
