use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;
use tracing::debug;

fn reject(req: ServiceRequest, body: serde_json::Value) -> ServiceResponse<BoxBody> {
    let resp = HttpResponse::Unauthorized().json(body);
    req.into_response(resp.map_into_boxed_body())
}

/// Gates the protected scope. A verified caller is stored in the request
/// extensions so handlers can extract [`AuthUser`] without decoding again.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?
        .clone();

    let header_value = match req.headers().get("Authorization") {
        Some(h) => match h.to_str() {
            Ok(v) => v.to_owned(),
            Err(_) => {
                return Ok(reject(req, json!({"error": "Invalid Authorization header encoding"})));
            }
        },
        None => return Ok(reject(req, json!({"error": "Missing Authorization header"}))),
    };

    let token = match header_value.strip_prefix("Bearer ") {
        Some(t) => t,
        None => {
            return Ok(reject(
                req,
                json!({"error": "Authorization header must start with Bearer"}),
            ));
        }
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, path = %req.path(), "Rejected bearer token");
            return Ok(reject(req, json!({"error": "Invalid or expired token", "details": e})));
        }
    };

    if claims.token_type != TokenType::Access {
        return Ok(reject(req, json!({"error": "Access token required"})));
    }

    let role = match Role::from_id(claims.role) {
        Some(role) => role,
        None => return Ok(reject(req, json!({"error": "Invalid role"}))),
    };

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        name: claims.sub,
        role,
    });

    next.call(req).await
}
