use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::middleware::Next;
use actix_web::{Error, HttpResponse, web};
use base64::Engine as _;
use serde_json::json;

use hnscan_config::Config;

fn unauthorized(req: ServiceRequest) -> ServiceResponse {
    let resp = HttpResponse::build(StatusCode::UNAUTHORIZED)
        .insert_header(("WWW-Authenticate", "Basic realm=\"hnscan\""))
        .json(json!({
            "error": {
                "type": "UnauthorizedError",
                "code": 401,
                "message": "invalid api key",
            }
        }));
    req.into_response(resp)
}

/// HTTP Basic check: any username, password equal to the configured API key.
/// Disabled entirely for loopback listeners or when no key is set.
pub async fn basic_auth(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<actix_web::body::EitherBody<impl MessageBody + 'static>>, Error> {
    let config = req.app_data::<web::Data<Config>>().cloned();
    let enabled = config.as_ref().map(|c| c.auth_enabled()).unwrap_or(false);
    if !enabled {
        return Ok(next.call(req).await?.map_into_left_body());
    }

    let presented = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|token| base64::engine::general_purpose::STANDARD.decode(token).ok())
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|creds| creds.split_once(':').map(|(_, pass)| pass.to_string()));

    let expected = config.map(|c| c.api_key.clone()).unwrap_or_default();
    match presented {
        Some(pass) if !expected.is_empty() && pass == expected => {
            Ok(next.call(req).await?.map_into_left_body())
        }
        _ => Ok(unauthorized(req).map_into_right_body()),
    }
}
