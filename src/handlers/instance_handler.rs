use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::Deserialize;

use super::handler::{DataResponse, ErrorResponse};
use crate::config::AppConfig;
use crate::error::CloudError;
use crate::models::cloud_instance::{LaunchCloudInstance, DEFAULT_INSTANCE_TYPE};
use crate::services::launch_service::Provisioner;

// -----------------------------------------------------------------------------
// DTOs
// -----------------------------------------------------------------------------

/// Launch body; every field is optional.
#[derive(Debug, Deserialize)]
pub struct LaunchInstanceDto {
    pub region: Option<String>,
    #[serde(flatten)]
    pub launch: LaunchCloudInstance,
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub region: Option<String>,
    pub instance_type: Option<String>,
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

async fn launch_instance_handler(
    provisioner: web::Data<Provisioner>,
    config: web::Data<AppConfig>,
    body: web::Json<LaunchInstanceDto>,
) -> impl Responder {
    let LaunchInstanceDto { region, mut launch } = body.into_inner();
    launch.region = region.unwrap_or_else(|| config.default_region.clone());

    match provisioner.launch(&launch).await {
        Ok(instance) => HttpResponse::Created().json(DataResponse::new(instance)),
        Err(err) => {
            error!("Launch of {} in {} failed: {}", launch.instance_name, launch.region, err);
            error_response(&err)
        }
    }
}

async fn terminate_instance_handler(
    provisioner: web::Data<Provisioner>,
    config: web::Data<AppConfig>,
    path: web::Path<String>,
    query: web::Query<RegionQuery>,
) -> impl Responder {
    let instance_id = path.into_inner();
    let region = query
        .into_inner()
        .region
        .unwrap_or_else(|| config.default_region.clone());

    match provisioner.terminate(&instance_id, &region).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(err) => {
            error!("Termination of {} in {} failed: {}", instance_id, region, err);
            error_response(&err)
        }
    }
}

async fn get_image_handler(
    provisioner: web::Data<Provisioner>,
    config: web::Data<AppConfig>,
    query: web::Query<ImageQuery>,
) -> impl Responder {
    let query = query.into_inner();
    let region = query.region.unwrap_or_else(|| config.default_region.clone());
    let instance_type = query
        .instance_type
        .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.to_string());

    match provisioner.select_image(&region, &instance_type) {
        Ok(image) => HttpResponse::Ok().json(DataResponse::new(image)),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &CloudError) -> HttpResponse {
    let body = ErrorResponse::new(err.to_string());

    match err {
        CloudError::ImageNotFound { .. } => HttpResponse::NotFound().json(body),
        CloudError::NoDefaultVpc
        | CloudError::ImageSnapshotNotFound(_)
        | CloudError::InvalidInstanceType(_)
        | CloudError::InvalidRegion(_)
        | CloudError::InvalidDockerImage(_)
        | CloudError::TemplateIo { .. } => HttpResponse::BadRequest().json(body),
        CloudError::Provider { .. }
        | CloudError::MissingField(_)
        | CloudError::InstanceNotRunning { .. }
        | CloudError::WaitTimeout { .. }
        | CloudError::LaunchIncomplete { .. } => HttpResponse::BadGateway().json(body),
        CloudError::Template(_) | CloudError::ImageTable(_) | CloudError::Client(_) => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/instances", web::post().to(launch_instance_handler))
        .route(
            "/instances/{instance_id}",
            web::delete().to(terminate_instance_handler),
        )
        .route("/images", web::get().to(get_image_handler));
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
