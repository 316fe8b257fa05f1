use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use error_stack::Report;
use fastly::http::{Method, StatusCode};
use fastly::{Error, Request, Response};
use log_fastly::Logger;
use serde_json::json;

use trust_center_common::constants::HEADER_X_REQUEST_ID;
use trust_center_common::error::TrustCenterError;
use trust_center_common::settings::{Logging, Settings};
use trust_center_common::settings_data::get_settings;
use trust_center_common::trust_center::{
    build_trust_center, handle_index, handle_sign, handle_verify, TrustCenter,
};

mod error;
use crate::error::{to_error_response, to_fastly_response};

#[fastly::main]
fn main(req: Request) -> Result<Response, Error> {
    let settings = match get_settings() {
        Ok(s) => s,
        Err(e) => {
            init_logger(&Logging::default());
            log::error!("Failed to load settings: {:?}", e);
            return Ok(to_error_response(&e));
        }
    };
    init_logger(&settings.logging);

    let request_id = req
        .get_header_str(HEADER_X_REQUEST_ID.as_str())
        .map(str::to_string);

    let mut response = match (req.get_method(), req.get_path()) {
        (&Method::GET, "/") => to_fastly_response(handle_index()),
        (&Method::POST, "/sign") => route_request(&settings, req, "sign", handle_sign),
        (&Method::POST, "/verify") => route_request(&settings, req, "verify", handle_verify),
        (method, path) => {
            log::info!("No route for {} {}", method, path);
            Response::from_status(StatusCode::NOT_FOUND)
                .with_body_json(&json!({ "message": "Not Found" }))?
        }
    };

    if let Some(request_id) = request_id {
        response.set_header(HEADER_X_REQUEST_ID.as_str(), request_id);
    }
    Ok(response)
}

type Handler =
    fn(&TrustCenter, &[u8], DateTime<Utc>) -> Result<http::Response<String>, Report<TrustCenterError>>;

/// Runs a trust center operation, logging entry, success and failure with the caller's address.
fn route_request(settings: &Settings, mut req: Request, operation: &str, handler: Handler) -> Response {
    let client_ip = req
        .get_client_ip_addr()
        .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
    let now = Utc::now();

    log::info!(
        "TrustCenter::{} Called by {} on {}",
        operation,
        client_ip,
        now.to_rfc3339_opts(SecondsFormat::Secs, false)
    );

    let result = build_trust_center(settings)
        .and_then(|center| handler(&center, &req.take_body_bytes(), now));

    match result {
        Ok(response) => {
            log::info!("TrustCenter::{} Called successfully", operation);
            to_fastly_response(response)
        }
        Err(e) => {
            log_failure(&client_ip, &e);
            to_error_response(&e)
        }
    }
}

fn log_failure(client_ip: &str, report: &Report<TrustCenterError>) {
    match report.current_context() {
        TrustCenterError::Conflict { .. } | TrustCenterError::Validation { .. } => {
            log::warn!("[{}] {}", client_ip, report.current_context());
        }
        _ => log::error!("[{}] {:?}", client_ip, report),
    }
}

fn init_logger(logging: &Logging) {
    let level = log::LevelFilter::from_str(&logging.level).unwrap_or(log::LevelFilter::Info);

    let logger = Logger::builder()
        .default_endpoint(logging.endpoint.as_str())
        .max_level(level)
        .build()
        .expect("Failed to build Logger");

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Local::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(Box::new(logger) as Box<dyn log::Log>)
        .apply()
        .expect("Failed to initialize logger");
}
