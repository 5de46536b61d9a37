use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::domain::{CommandContext, LedgerError};

pub const PERFORMED_BY_HEADER: &str = "X-Performed-By";
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Command context built from request headers.
///
/// `X-Performed-By` must carry the acting user's UUID. `X-Correlation-Id`
/// is optional; a fresh id is generated when it is absent or malformed.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub CommandContext);

fn header_uuid(req: &HttpRequest, name: &str) -> Option<Result<Uuid, ()>> {
    req.headers().get(name).map(|value| {
        value
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or(())
    })
}

impl FromRequest for Actor {
    type Error = LedgerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let performed_by = match header_uuid(req, PERFORMED_BY_HEADER) {
            Some(Ok(id)) => id,
            Some(Err(())) => {
                return ready(Err(LedgerError::InvalidData(format!(
                    "{} must be a UUID",
                    PERFORMED_BY_HEADER
                ))))
            }
            None => {
                return ready(Err(LedgerError::InvalidData(format!(
                    "{} header is required",
                    PERFORMED_BY_HEADER
                ))))
            }
        };

        let mut ctx = CommandContext::new(performed_by);
        if let Some(Ok(correlation_id)) = header_uuid(req, CORRELATION_ID_HEADER) {
            ctx = ctx.with_correlation(correlation_id);
        }
        ready(Ok(Actor(ctx)))
    }
}

/// Decode a body that may be omitted entirely. Empty bodies yield the
/// command's default; malformed ones are rejected.
pub fn optional_body<T: DeserializeOwned + Default>(body: &web::Bytes) -> Result<T, LedgerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| LedgerError::InvalidData(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::CancelOrder;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn test_actor_from_headers() {
        let user = Uuid::new_v4();
        let correlation = Uuid::new_v4();
        let (req, mut payload) = TestRequest::default()
            .insert_header((PERFORMED_BY_HEADER, user.to_string()))
            .insert_header((CORRELATION_ID_HEADER, correlation.to_string()))
            .to_http_parts();

        let Actor(ctx) = Actor::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(ctx.performed_by, user);
        assert_eq!(ctx.correlation_id, correlation);
    }

    #[actix_web::test]
    async fn test_missing_or_invalid_performer_is_rejected() {
        let (req, mut payload) = TestRequest::default().to_http_parts();
        let err = Actor::from_request(&req, &mut payload).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidData(_)));

        let (req, mut payload) = TestRequest::default()
            .insert_header((PERFORMED_BY_HEADER, "nurse-7"))
            .to_http_parts();
        assert!(Actor::from_request(&req, &mut payload).await.is_err());
    }

    #[test]
    fn test_optional_body() {
        let empty: CancelOrder = optional_body(&web::Bytes::new()).unwrap();
        assert!(empty.reason.is_none());

        let given: CancelOrder = optional_body(&web::Bytes::from_static(br#"{"reason":"no show"}"#)).unwrap();
        assert_eq!(given.reason.as_deref(), Some("no show"));

        assert!(optional_body::<CancelOrder>(&web::Bytes::from_static(b"{oops")).is_err());
    }
}
