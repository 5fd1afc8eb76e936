use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Multipart, State};
use axum::extract::multipart::MultipartError;
use std::sync::Arc;
use tracing::debug;
use vitrine_search::{SearchError, SearchRequest, SearchResponse};

pub const TEXT_FIELD: &str = "text_query";
pub const IMAGE_FIELD: &str = "image_query";
pub const TOP_K_FIELD: &str = "top_k";

/// `POST /search`: multipart hybrid query.
pub async fn search(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ServerResult<Json<SearchResponse>> {
    let request = read_search_form(multipart).await?;
    debug!(
        has_text = request.text.is_some(),
        image_bytes = request.image.as_ref().map_or(0, Vec::len),
        top_k = request.top_k,
        "search request"
    );

    let search = Arc::clone(&state.search);
    let response = tokio::task::spawn_blocking(move || search.search(&request))
        .await
        .map_err(|e| ServerError::Internal(format!("search task failed: {e}")))??;

    Ok(Json(response))
}

async fn read_search_form(mut multipart: Multipart) -> ServerResult<SearchRequest> {
    let mut request = SearchRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        match field.name() {
            Some(TEXT_FIELD) => {
                request.text = Some(field.text().await.map_err(upload_error)?);
            }
            Some(IMAGE_FIELD) => {
                let bytes = field.bytes().await.map_err(upload_error)?;
                request.image = (!bytes.is_empty()).then(|| bytes.to_vec());
            }
            Some(TOP_K_FIELD) => {
                request.top_k = parse_top_k(&field.text().await.map_err(upload_error)?)?;
            }
            other => debug!(field = ?other, "ignoring unknown form field"),
        }
    }

    Ok(request)
}

/// Blank means "use the default"; anything else must be a positive integer.
fn parse_top_k(raw: &str) -> ServerResult<Option<usize>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => Err(SearchError::InvalidTopK.into()),
        Ok(top_k) => Ok(Some(top_k)),
    }
}

fn upload_error(err: MultipartError) -> ServerError {
    ServerError::Upload {
        status: err.status(),
        message: err.body_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_top_k;

    #[test]
    fn top_k_parsing() {
        assert_eq!(parse_top_k("").expect("blank"), None);
        assert_eq!(parse_top_k(" 5 ").expect("five"), Some(5));
        assert!(parse_top_k("0").is_err());
        assert!(parse_top_k("-3").is_err());
        assert!(parse_top_k("ten").is_err());
    }
}
