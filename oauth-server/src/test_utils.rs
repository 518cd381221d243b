use crate::config::{SeedClient, Settings};
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use oauth_engine::{parse_scopes, AuthorizationRequest, Decision, ResponseType, Scope, Token};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

/// Redirect URI registered for every fixture client
pub const REDIRECT_URI: &str = "https://app.example/cb";
/// Secret of the confidential fixture client `c1`
pub const SECRET: &str = "secret";
/// Public fixture client, sharing `c1`'s redirect URI
pub const PUBLIC_CLIENT: &str = "spa";
/// Header the fixture trusts to carry the logged-in user
pub const SESSION_HEADER: &str = "x-session-user";

/// Headers identifying `user` to the consent and settings endpoints
pub fn session_headers(user: &str) -> [(&'static str, &str); 1] {
    [(SESSION_HEADER, user)]
}

/// Test fixture for setting up a complete application on an in-memory store.
///
/// The fixture registers two scopes (`read` and `write`), a confidential
/// client `c1` owned by `owner` and allowed `read`, and the public client
/// [`PUBLIC_CLIENT`]. Requests are sent through the full router, middleware
/// included.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .post_form("/oauth/token", "grant_type=client_credentials&client_id=c1&client_secret=secret")
///         .await;
///
///     response.assert_ok();
///     assert_eq!(response.json["scope"], "read");
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// State shared with the router, for driving the engine directly
    pub state: AppState,
}

impl TestFixture {
    /// Creates a new test fixture from [`TestFixture::settings`].
    pub async fn new() -> Self {
        Self::customized(Self::settings(), |state| state).await
    }

    /// Creates a fixture from `settings`, letting `customize` adjust the
    /// state before the router is built.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let mut settings = TestFixture::settings();
    /// settings.oauth.password_grant_enabled = true;
    /// let fixture = TestFixture::customized(settings, |state| {
    ///     state.with_user_authenticator(Arc::new(StaticUserAuthenticator::new()))
    /// })
    /// .await;
    /// ```
    pub async fn customized<F>(settings: Settings, customize: F) -> Self
    where
        F: FnOnce(AppState) -> AppState,
    {
        Self::setup_logger(LevelFilter::Debug);

        let state = AppState::new(settings)
            .await
            .expect("Failed to initialize application state");
        let state = customize(state);
        let app = create_app(state.clone()).await;

        Self { app, state }
    }

    /// Settings used by [`TestFixture::new`]
    pub fn settings() -> Settings {
        let mut settings = Settings::for_test();
        settings.session_user_header = Some(SESSION_HEADER.to_string());
        settings.housekeeping_interval = 0;
        settings.scopes = vec![
            Scope::new("read", "Read your records", "records"),
            Scope::new("write", "Change your records", "records"),
        ];
        settings.clients = vec![
            SeedClient {
                client_id: "c1".to_string(),
                client_secret: Some(SECRET.to_string()),
                name: "Records app".to_string(),
                owner_id: "owner".to_string(),
                redirect_uris: vec![REDIRECT_URI.to_string()],
                is_confidential: true,
                is_internal: false,
                allowed_scopes: vec!["read".to_string()],
            },
            SeedClient {
                client_id: PUBLIC_CLIENT.to_string(),
                client_secret: None,
                name: "Single page app".to_string(),
                owner_id: "owner".to_string(),
                redirect_uris: vec![REDIRECT_URI.to_string()],
                is_confidential: false,
                is_internal: false,
                allowed_scopes: Vec::new(),
            },
        ];
        settings
    }

    /// Initializes the test logger with customized settings.
    ///
    /// Called by every fixture constructor with `Debug`; later calls are
    /// ignored by `env_logger`.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Runs the authorization code flow for `user` through the engine and
    /// returns the token issued to `c1`.
    pub async fn authorization_code_token(&self, user: &str, scope: &str) -> Token {
        let request = AuthorizationRequest {
            response_type: ResponseType::Code,
            client_id: "c1".to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            scopes: parse_scopes(Some(scope)),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
        };
        let grant = self
            .state
            .engine
            .request_authorization(
                &request,
                Decision::Approve {
                    user_id: user.to_string(),
                },
            )
            .await
            .expect("Failed to authorize");
        self.state
            .engine
            .exchange_code("c1", Some(SECRET), &grant.code, REDIRECT_URI, None)
            .await
            .expect("Failed to exchange code")
    }

    fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder
    }

    /// Sends a GET request to the specified URI.
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    /// Sends a GET request with custom headers.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let response = fixture
    ///     .get_with_headers("/oauth/info", &[("authorization", "Bearer abc")])
    ///     .await;
    /// ```
    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.send_with_headers(Method::GET, uri, headers).await
    }

    /// Sends a bodiless request with any method and custom headers.
    pub async fn send_with_headers(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let request = self
            .request_builder(method, uri, headers)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with an already encoded form body.
    pub async fn post_form(&self, uri: impl AsRef<str>, body: &str) -> TestResponse {
        self.post_form_with_headers(uri, body, &[]).await
    }

    /// Sends a POST request with a form body and custom headers.
    pub async fn post_form_with_headers(
        &self,
        uri: impl AsRef<str>,
        body: &str,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let request = self
            .request_builder(Method::POST, uri, headers)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI.
    pub async fn post_json<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        self.post_json_with_headers(uri, body, &[]).await
    }

    /// Sends a POST request with a JSON body and custom headers.
    pub async fn post_json_with_headers<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri, headers)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a prepared request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }
}

/// Response from a test request that provides convenient access to status,
/// headers and JSON body.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// The redirect target of a 302 response
    pub fn location(&self) -> Url {
        let location = self
            .headers
            .get(LOCATION)
            .expect("Response has no Location header")
            .to_str()
            .expect("Location header is not valid UTF-8");
        Url::parse(location).expect("Location header is not a valid URL")
    }
}
