//! Request extractors shared by the OAuth handlers

use crate::api::oauth::models::IntrospectionRequest;
use crate::errors::ApiError;
use crate::state::AppState;
use axum::extract::{Form, FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::HeaderMap;
use log::debug;
use oauth_engine::OAuthError;

/// Resource owner identified by the upstream session layer through the
/// configured `session_user_header`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser(pub String);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = state
            .settings
            .session_user_header
            .as_deref()
            .and_then(|name| parts.headers.get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user {
            Some(user) => Ok(Self(user.to_string())),
            None => {
                debug!("No session user on request to {}", parts.uri.path());
                Err(OAuthError::AuthenticationRequired.into())
            }
        }
    }
}

/// Client credentials sent with HTTP Basic authentication (RFC 6749 §2.3.1).
/// Other schemes yield `None`.
pub fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    let Some((scheme, encoded)) = value.trim().split_once(' ') else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Ok(None);
    }

    let malformed =
        || ApiError::from(OAuthError::InvalidClient("malformed Basic credentials".to_string()));
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (client_id, client_secret) = decoded.split_once(':').ok_or_else(malformed)?;
    Ok(Some((client_id.to_string(), client_secret.to_string())))
}

/// Accepts an introspection request as form data or JSON
pub struct IntrospectionRequestExtractor(pub IntrospectionRequest);

impl<S> FromRequest<S> for IntrospectionRequestExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("application/json") {
            match Json::<IntrospectionRequest>::from_request(req, state).await {
                Ok(Json(request)) => Ok(Self(request)),
                Err(_) => Err(ApiError::invalid_request("Invalid JSON in request body")),
            }
        } else {
            match Form::<IntrospectionRequest>::from_request(req, state).await {
                Ok(Form(request)) => Ok(Self(request)),
                Err(_) => Err(ApiError::invalid_request(
                    "Invalid form data in request body",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn with_authorization(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_basic_credentials() {
        let encoded = STANDARD.encode("c1:s3:cret");
        let credentials = basic_credentials(&with_authorization(&format!("Basic {encoded}")))
            .unwrap()
            .unwrap();
        assert_eq!(credentials, ("c1".to_string(), "s3:cret".to_string()));
    }

    #[test]
    fn test_other_schemes_are_ignored() {
        assert!(basic_credentials(&HeaderMap::new()).unwrap().is_none());
        assert!(basic_credentials(&with_authorization("Bearer abc"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_basic_credentials() {
        let err = basic_credentials(&with_authorization("Basic !!!")).unwrap_err();
        assert_eq!(err.body.error, "invalid_client");

        let encoded = STANDARD.encode("no-colon");
        assert!(basic_credentials(&with_authorization(&format!("Basic {encoded}"))).is_err());
    }
}
