use actix_web::error::{InternalError, JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};

use crate::domain::{Envelope, LedgerError};

// ============================================================================
// HTTP Error Mapping
// ============================================================================
//
// Business rule and validation failures are the caller's problem (400),
// a lost version race is 409, anything from the store is 500. Every error
// body uses the same envelope as successful responses.
//
// ============================================================================

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Conflict { .. } => StatusCode::CONFLICT,
            LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (message, details) = match self {
            LedgerError::Validation(errors) => (
                self.to_string(),
                serde_json::to_value(errors).ok().map(|errors| {
                    serde_json::json!({ "kind": self.kind(), "errors": errors })
                }),
            ),
            LedgerError::Store(err) => {
                tracing::error!(error = %err, "Request failed on the ledger store");
                (
                    "Internal server error".to_string(),
                    Some(serde_json::json!({ "kind": self.kind() })),
                )
            }
            _ => (self.to_string(), Some(serde_json::json!({ "kind": self.kind() }))),
        };

        HttpResponse::build(status).json(Envelope::failure(message, details))
    }
}

fn bad_request(message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(Envelope::failure(
        message,
        Some(serde_json::json!({ "kind": "invalid_data" })),
    ))
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = bad_request(format!("Invalid request body: {}", err));
    InternalError::from_response(err, response).into()
}

pub fn path_error_handler(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    let response = bad_request(format!("Invalid path parameter: {}", err));
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = bad_request(format!("Invalid query string: {}", err));
    InternalError::from_response(err, response).into()
}
