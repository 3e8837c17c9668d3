use crate::AppState;
use crate::api::error::AppError;
use crate::models::{LoginRequest, LoginResponse};
use axum::{
    Form, Json, async_trait,
    extract::{FromRequest, Multipart, Request, State, multipart::MultipartError},
    http::header,
    response::{IntoResponse, Response},
};

/// Login credentials, accepted URL-encoded, as JSON or as multipart text fields.
///
/// A body of any other type carries no credentials and is treated as empty, so it
/// is denied like any other bad login.
pub struct LoginForm(pub LoginRequest);

#[async_trait]
impl<S> FromRequest<S> for LoginForm
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if content_type.starts_with("application/json") {
            let Json(body) = Json::<LoginRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(body))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<LoginRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(body))
        } else if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            read_multipart(multipart)
                .await
                .map(Self)
                .map_err(IntoResponse::into_response)
        } else {
            Ok(Self(LoginRequest::default()))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<LoginRequest, MultipartError> {
    let mut credentials = LoginRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "userId" => credentials.user_id = field.text().await?,
            "password" => credentials.password = field.text().await?,
            _ => {}
        }
    }

    Ok(credentials)
}

#[utoipa::path(
    post,
    path = "/login",
    request_body(content = LoginRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = LoginResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    LoginForm(credentials): LoginForm,
) -> Result<Json<LoginResponse>, AppError> {
    let token = state
        .tokens
        .issue(&credentials.user_id, &credentials.password)
        .inspect_err(|_| tracing::warn!("Rejected login attempt"))?;

    tracing::info!("🔑 Issued token for {}", credentials.user_id);
    Ok(Json(LoginResponse::granted(token)))
}
