use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use tracing::instrument;

use crate::{
    auth::dto::{
        CheckTokenResponse, CurrentUserResponse, EmailRequest, LoginRequest, LoginResponse,
        MessageResponse, PublicUser, RegisterRequest, ResetPasswordRequest, SetUserTypeRequest,
        SuccessResponse, TokenRequest,
    },
    error::{AuthError, AuthResult},
    state::AppState,
};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists with that email, a password reset link has been sent.";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(current_user))
        .route("/auth/user-type", put(set_user_type))
        .route("/auth/verify-email", post(verify_email).get(verify_email_link))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/reset-password/check", get(check_reset_token))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AuthError>,
) -> AuthResult<(StatusCode, Json<MessageResponse>)> {
    state
        .accounts
        .register(
            &payload.name,
            &payload.email,
            &payload.password,
            payload.user_type,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::ok(
            "Registration successful! Please check your email to verify your account.",
        )),
    ))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AuthError>,
) -> AuthResult<(HeaderMap, Json<LoginResponse>)> {
    let mut headers = HeaderMap::new();
    let session = state
        .sessions
        .login(&payload.email, &payload.password, &mut headers)
        .await?;
    let token = state.sessions.exposes_token().then_some(session.token);
    Ok((
        headers,
        Json(LoginResponse {
            success: true,
            user: PublicUser::from(session.user),
            token,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> (HeaderMap, Json<SuccessResponse>) {
    let mut headers = HeaderMap::new();
    state.sessions.logout(&mut headers);
    (headers, Json(SuccessResponse { success: true }))
}

#[instrument(skip_all)]
pub async fn current_user(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> (HeaderMap, Json<CurrentUserResponse>) {
    let mut headers = HeaderMap::new();
    let user = state
        .sessions
        .current_user(&request_headers, &mut headers)
        .await;
    (
        headers,
        Json(CurrentUserResponse {
            success: user.is_some(),
            user: user.map(PublicUser::from),
        }),
    )
}

#[instrument(skip(state, request_headers))]
pub async fn set_user_type(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    WithRejection(Json(payload), _): WithRejection<Json<SetUserTypeRequest>, AuthError>,
) -> AuthResult<Json<SuccessResponse>> {
    state
        .sessions
        .set_user_type(&request_headers, payload.user_type)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn confirm_email(state: &AppState, token: &str) -> AuthResult<Json<MessageResponse>> {
    state.accounts.verify_email(token).await?;
    Ok(Json(MessageResponse::ok(
        "Email verified successfully. You can now log in.",
    )))
}

#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<TokenRequest>, AuthError>,
) -> AuthResult<Json<MessageResponse>> {
    confirm_email(&state, &payload.token).await
}

/// `GET /auth/verify-email?token=...`, the shape of the emailed link.
#[instrument(skip_all)]
pub async fn verify_email_link(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<TokenRequest>, AuthError>,
) -> AuthResult<Json<MessageResponse>> {
    confirm_email(&state, &query.token).await
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn resend_verification(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<EmailRequest>, AuthError>,
) -> AuthResult<Json<MessageResponse>> {
    state.accounts.resend_verification(&payload.email).await?;
    Ok(Json(MessageResponse::ok(
        "Verification email sent. Please check your inbox.",
    )))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn forgot_password(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<EmailRequest>, AuthError>,
) -> AuthResult<Json<MessageResponse>> {
    state.accounts.forgot_password(&payload.email).await?;
    Ok(Json(MessageResponse::ok(FORGOT_PASSWORD_MESSAGE)))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ResetPasswordRequest>, AuthError>,
) -> AuthResult<Json<MessageResponse>> {
    state
        .accounts
        .reset_password(&payload.token, &payload.password)
        .await?;
    Ok(Json(MessageResponse::ok(
        "Password has been reset successfully. You can now log in.",
    )))
}

#[instrument(skip_all)]
pub async fn check_reset_token(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<TokenRequest>, AuthError>,
) -> AuthResult<Json<CheckTokenResponse>> {
    let valid = state.accounts.validate_reset_token(&query.token).await?;
    Ok(Json(CheckTokenResponse {
        success: valid,
        error: (!valid).then(|| AuthError::InvalidOrExpiredToken.public_message()),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::app::build_app;
    use crate::auth::memory::MemoryUserStore;
    use crate::auth::repo::UserStore;
    use crate::mailer::FakeMailer;

    use super::*;

    fn test_app() -> (Router, Arc<MemoryUserStore>, Arc<FakeMailer>) {
        let (state, store, mailer) = AppState::fake();
        (build_app(state), store, mailer)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>, cookie: Option<&str>) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(res: Response) -> Vec<u8> {
        to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json(res: Response) -> Value {
        serde_json::from_slice(&body_bytes(res).await).unwrap()
    }

    fn session_cookie(res: &Response) -> String {
        let set = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        set.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn alice_registers_verifies_and_logs_in() {
        let (app, store, _) = test_app();

        let res = call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({"name": "Alice", "email": "alice@example.com", "password": "password123", "userType": "Homeowner"})),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(body_json(res).await["success"], true);

        let token = store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .expect("outstanding verification token");

        let login_body = json!({"email": "alice@example.com", "password": "password123"});
        let res = call(&app, Method::POST, "/api/v1/auth/login", Some(login_body.clone()), None).await;
        assert!(res.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["needsVerification"], true);

        let res = call(&app, Method::POST, "/api/v1/auth/verify-email", Some(json!({"token": token})), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["success"], true);

        let res = call(&app, Method::POST, "/api/v1/auth/login", Some(login_body), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = session_cookie(&res);
        assert!(cookie.starts_with("auth_token="));
        let body = body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert_eq!(body["user"]["emailVerified"], true);
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body.get("token").is_none());

        let res = call(&app, Method::GET, "/api/v1/auth/me", None, Some(&cookie)).await;
        let body = body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["name"], "Alice");
    }

    #[tokio::test]
    async fn verify_link_works_once() {
        let (app, store, _) = test_app();
        call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({"name": "Bob", "email": "bob@example.com", "password": "password123", "userType": "pro"})),
            None,
        )
        .await;
        let token = store
            .find_by_email("bob@example.com")
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .unwrap();

        let uri = format!("/api/v1/auth/verify-email?token={token}");
        let res = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let res = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (app, _, _) = test_app();
        let body = json!({"name": "Alice", "email": "alice@example.com", "password": "password123", "userType": "homeowner"});
        call(&app, Method::POST, "/api/v1/auth/register", Some(body.clone()), None).await;
        let res = call(&app, Method::POST, "/api/v1/auth/register", Some(body), None).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(res).await["success"], false);
    }

    #[tokio::test]
    async fn forgot_password_is_indistinguishable() {
        let (app, _, mailer) = test_app();
        call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({"name": "Alice", "email": "alice@example.com", "password": "password123", "userType": "homeowner"})),
            None,
        )
        .await;

        let known = call(&app, Method::POST, "/api/v1/auth/forgot-password", Some(json!({"email": "alice@example.com"})), None).await;
        let unknown = call(&app, Method::POST, "/api/v1/auth/forgot-password", Some(json!({"email": "nonexistent@x.com"})), None).await;
        assert_eq!(known.status(), unknown.status());
        assert_eq!(body_bytes(known).await, body_bytes(unknown).await);
        assert!(mailer
            .last_message()
            .unwrap()
            .html
            .contains("/reset-password?token="));
    }

    #[tokio::test]
    async fn reset_flow_over_http() {
        let (app, store, _) = test_app();
        call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({"name": "Alice", "email": "alice@example.com", "password": "password123", "userType": "homeowner"})),
            None,
        )
        .await;
        call(&app, Method::POST, "/api/v1/auth/forgot-password", Some(json!({"email": "alice@example.com"})), None).await;
        let token = store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap()
            .reset_token
            .unwrap();

        let check = format!("/api/v1/auth/reset-password/check?token={token}");
        let body = body_json(call(&app, Method::GET, &check, None, None).await).await;
        assert_eq!(body, json!({"success": true}));

        let res = call(
            &app,
            Method::POST,
            "/api/v1/auth/reset-password",
            Some(json!({"token": token, "password": "newpass456"})),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(call(&app, Method::GET, &check, None, None).await).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn anonymous_session_endpoints() {
        let (app, _, _) = test_app();

        let res = call(&app, Method::GET, "/api/v1/auth/me", None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await, json!({"success": false, "user": null}));

        let res = call(&app, Method::GET, "/api/v1/auth/me", None, Some("auth_token=garbage")).await;
        let cleared = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(cleared.contains("Max-Age=0"));
        assert_eq!(body_json(res).await["user"], Value::Null);

        let res = call(&app, Method::PUT, "/api/v1/auth/user-type", Some(json!({"userType": "professional"})), None).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"], "Not authenticated");

        let res = call(&app, Method::POST, "/api/v1/auth/logout", None, None).await;
        assert!(res.headers().get(header::SET_COOKIE).is_some());
        assert_eq!(body_json(res).await, json!({"success": true}));
    }

    #[tokio::test]
    async fn resend_verification_over_http() {
        let (app, _, mailer) = test_app();
        call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({"name": "Alice", "email": "alice@example.com", "password": "password123", "userType": "homeowner"})),
            None,
        )
        .await;
        let sent_before = mailer.sent_messages().len();

        let res = call(&app, Method::POST, "/api/v1/auth/resend-verification", Some(json!({"email": "alice@example.com"})), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(mailer.sent_messages().len(), sent_before + 1);

        let res = call(&app, Method::POST, "/api/v1/auth/resend-verification", Some(json!({"email": "ghost@example.com"})), None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "User not found or already verified");
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let (app, _, _) = test_app();

        let res = call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({"name": "Alice", "email": "alice@example.com", "password": "password123", "userType": "landlord"})),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res).await,
            json!({"success": false, "error": "Invalid request"})
        );

        let res = call(&app, Method::GET, "/api/v1/auth/reset-password/check", None, None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Invalid request");

        let res = call(&app, Method::POST, "/api/v1/auth/login", None, None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["success"], false);
    }

    #[tokio::test]
    async fn health_check() {
        let (app, _, _) = test_app();
        let res = call(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_bytes(res).await, b"ok");
    }
}
