use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH_TAG: &str = "OAuth 2.0";
pub(crate) const SETTINGS_TAG: &str = "Settings API";

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::api::health::healthy_check,
        crate::api::health::ready_check,
        crate::api::oauth::handlers::authorize,
        crate::api::oauth::handlers::authorize_decision,
        crate::api::oauth::handlers::token,
        crate::api::oauth::handlers::introspect,
        crate::api::oauth::handlers::revoke,
        crate::api::oauth::handlers::token_info,
        crate::api::oauth::settings::list_clients,
        crate::api::oauth::settings::create_client,
        crate::api::oauth::settings::delete_client,
        crate::api::oauth::settings::rotate_client_secret,
        crate::api::oauth::settings::list_tokens,
        crate::api::oauth::settings::create_token,
        crate::api::oauth::settings::revoke_token,
    ),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH_TAG, description = "Authorization, token, introspection and revocation endpoints"),
        (name = SETTINGS_TAG, description = "Client and personal token management for the logged-in user"),
    ),
    info(
        title = "OAuth 2.0 Authorization Server",
        description = "Issues and validates OAuth 2.0 access tokens",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
