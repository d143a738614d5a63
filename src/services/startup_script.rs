//! Renders the boot-time user data that pulls and runs the service container.

use std::path::Path;

use handlebars::Handlebars;
use serde_json::json;

use crate::error::{CloudError, CloudResult};
use crate::models::cloud_instance::validate_docker_image;

const TEMPLATE_NAME: &str = "startup-script";
const BUNDLED_TEMPLATE: &str = include_str!("../../static/startup-script.hbs");

/// Creates an engine that fails on missing variables and leaves shell
/// metacharacters untouched.
fn new_engine() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

pub fn render(template: &str, docker_image: &str, api_port: u16) -> CloudResult<String> {
    validate_docker_image(docker_image)?;

    let mut engine = new_engine();
    engine
        .register_template_string(TEMPLATE_NAME, template)
        .map_err(|err| CloudError::Template(err.to_string()))?;

    engine
        .render(
            TEMPLATE_NAME,
            &json!({
                "docker_image": docker_image,
                "api_port": api_port,
            }),
        )
        .map_err(|err| CloudError::Template(err.to_string()))
}

/// Renders the template at `path`, or the bundled one when no path is given.
pub fn render_startup_script(
    path: Option<&Path>,
    docker_image: &str,
    api_port: u16,
) -> CloudResult<String> {
    match path {
        Some(path) => {
            let template = std::fs::read_to_string(path).map_err(|source| CloudError::TemplateIo {
                path: path.display().to_string(),
                source,
            })?;
            render(&template, docker_image, api_port)
        }
        None => render(BUNDLED_TEMPLATE, docker_image, api_port),
    }
}
