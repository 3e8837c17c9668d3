use crate::AppState;
use crate::api::error::AppError;
use crate::services::staging::{StagedFile, UploadError};
use crate::services::token_service::Claims;
use crate::utils::validation::validate_search;
use axum::{
    Extension,
    extract::{Multipart, State},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use tracing::{debug, info};

/// Multipart fields of one search request, with the image already staged.
#[derive(Default)]
struct SearchForm {
    image: Option<StagedFile>,
    market: Option<String>,
    safe_search: Option<String>,
}

async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<SearchForm, AppError> {
    let mut form = SearchForm::default();
    let limit = state.config.max_file_size;
    let upload_error = move |e| UploadError::from_multipart(e, limit);

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" if form.image.is_none() => {
                // A plain text field named `image` is not a file
                let Some(original_name) = field.file_name().map(str::to_owned) else {
                    return Err(UploadError::NotAnImage.into());
                };
                let content_type = field.content_type().map(str::to_owned);

                let staged = state
                    .staging
                    .stage(
                        &original_name,
                        content_type.as_deref(),
                        field.map_err(upload_error),
                    )
                    .await?;
                form.image = Some(staged);
            }
            "mkt" => form.market = Some(field.text().await.map_err(upload_error)?),
            "safesearch" => {
                form.safe_search = Some(field.text().await.map_err(upload_error)?)
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

/// Stage → validate → forward → release, shared by the gated and legacy routes.
///
/// Once the image is staged every path goes through `release`; an early `?` while
/// the form is still being read is covered by the staged file's drop guard.
pub async fn search_pipeline(
    state: &AppState,
    subject: Option<&str>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = read_form(state, multipart).await?;
    let Some(staged) = form.image else {
        info!("Request without an image file, nothing to forward");
        return Err(UploadError::NotAnImage.into());
    };

    info!(
        "🖼️  Staged {} ({} bytes) for {}",
        staged.original_name,
        staged.size_bytes,
        subject.unwrap_or("anonymous")
    );

    let outcome = async {
        let request = validate_search(form.market.as_deref(), form.safe_search.as_deref())?;
        let result = state.upstream.search(&staged, &request).await?;
        Ok::<_, AppError>(result)
    }
    .await;

    // Only after the upstream call has finished reading the file
    staged.release();

    Ok(outcome?.into_response())
}

#[utoipa::path(
    post,
    path = "/visualsearch",
    request_body(content = crate::models::VisualSearchForm, content_type = "multipart/form-data"),
    params(
        ("authkey" = String, Header, description = "Token issued by /login")
    ),
    responses(
        (status = 200, description = "Search results fetched successfully"),
        (status = 400, description = "Invalid request: bad parameters, non-image upload or upstream failure"),
        (status = 403, description = "No token provided"),
        (status = 413, description = "Uploaded file too large"),
        (status = 500, description = "Invalid token or processing failure")
    ),
    tag = "visual search"
)]
pub async fn visual_search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    search_pipeline(&state, Some(&claims.sub), multipart).await
}

#[utoipa::path(
    post,
    path = "/api/v1/visualsearch",
    request_body(content = crate::models::VisualSearchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Search results fetched successfully"),
        (status = 400, description = "Invalid request: bad parameters, non-image upload or upstream failure"),
        (status = 413, description = "Uploaded file too large"),
        (status = 500, description = "Processing failure")
    ),
    tag = "visual search"
)]
pub async fn visual_search_legacy(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    search_pipeline(&state, None, multipart).await
}
