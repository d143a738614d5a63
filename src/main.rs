use actix_web::{web::Data, App, HttpServer};
use anyhow::Context;
use log::{info, warn};

mod config;
mod error;
mod handlers;
mod models;
mod services;
mod util;

use config::AppConfig;
use handlers::instance_handler;
use models::machine_image::ImageCatalog;
use services::aws_service::aws_compute_factory;
use services::launch_service::Provisioner;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("grobid_launcher=info,actix_web=info"),
    )
    .init();

    let config = AppConfig::from_env()?;
    let catalog = ImageCatalog::load(config.ami_table_path.as_deref())
        .context("Failed to load the AMI table")?;
    info!(
        "Loaded AMI table covering {} regions",
        catalog.regions().len()
    );
    match catalog.provenance() {
        Some(provenance) => info!(
            "AMI table release {} looked up {}",
            provenance.release,
            provenance
                .looked_up
                .map_or_else(|| "never".to_string(), |date| date.to_string())
        ),
        None => info!("AMI table does not record its release"),
    }
    if !catalog.is_verified() {
        warn!("AMI ids have no lookup date; point GROBID_AMI_TABLE_PATH at a refreshed table before launching");
    }

    let provisioner = Data::new(Provisioner::new(
        aws_compute_factory(),
        catalog,
        config.wait,
    ));
    let bind_address = config.bind_address.clone();
    if config.cors_origins.is_empty() {
        info!("No CORS origins configured; cross-origin requests are refused");
    }
    let config = Data::new(config);

    info!("Listening on {}", bind_address);
    HttpServer::new(move || {
        App::new()
            .wrap(config.cors())
            .app_data(provisioner.clone())
            .app_data(config.clone())
            .configure(instance_handler::configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
