//! Download and preview of produced files.

use std::path::{Component, Path, PathBuf};

use axum::extract::{Path as UrlPath, Request, State};
use axum::http::header::CONTENT_DISPOSITION;
use axum::http::HeaderValue;
use axum::response::Response;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Attachment,
    Inline,
}

/// Send a file as an attachment.
pub async fn download(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    request: Request,
) -> ApiResult<Response> {
    serve(&state.config, &path, request, Disposition::Attachment).await
}

/// Send a file for in-browser display.
pub async fn preview(
    State(state): State<AppState>,
    UrlPath(path): UrlPath<String>,
    request: Request,
) -> ApiResult<Response> {
    serve(&state.config, &path, request, Disposition::Inline).await
}

async fn serve(
    config: &ApiConfig,
    requested: &str,
    request: Request,
    disposition: Disposition,
) -> ApiResult<Response> {
    let file = resolve_file(&config.allowed_roots(), requested).await?;

    let response = match ServeFile::new(&file).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(axum::body::Body::new);

    if disposition == Disposition::Attachment {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().replace('"', ""))
            .unwrap_or_else(|| "download".to_string());
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)) {
            response.headers_mut().insert(CONTENT_DISPOSITION, value);
        }
    }

    Ok(response)
}

/// Resolve a request path to an existing file inside one of `roots`.
///
/// The route wildcard drops the leading slash, so a relative path is tried
/// against the working directory first and then as an absolute path.
/// Symlinks are followed before the containment check.
async fn resolve_file(roots: &[PathBuf], requested: &str) -> ApiResult<PathBuf> {
    let relative = Path::new(requested);
    if relative.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ApiError::forbidden("Path escapes the served directories"));
    }

    let candidates = if relative.is_absolute() {
        vec![relative.to_path_buf()]
    } else {
        vec![
            std::env::current_dir()?.join(relative),
            Path::new("/").join(relative),
        ]
    };

    let mut canonical = None;
    for candidate in &candidates {
        match tokio::fs::canonicalize(candidate).await {
            Ok(path) => {
                canonical = Some(path);
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let canonical =
        canonical.ok_or_else(|| ApiError::not_found(format!("File not found: {}", requested)))?;

    let mut allowed = false;
    for root in roots {
        if let Ok(root) = tokio::fs::canonicalize(root).await {
            if canonical.starts_with(&root) {
                allowed = true;
                break;
            }
        }
    }
    if !allowed {
        return Err(ApiError::forbidden("Path escapes the served directories"));
    }

    if !tokio::fs::metadata(&canonical).await?.is_file() {
        return Err(ApiError::not_found(format!("File not found: {}", requested)));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_inside_root() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("face-clip.mp4");
        tokio::fs::write(&file, b"video").await.unwrap();

        let resolved = resolve_file(
            &[root.path().to_path_buf()],
            file.to_str().unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(resolved, tokio::fs::canonicalize(&file).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_rejects_outside_root() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let file = other.path().join("secret.txt");
        tokio::fs::write(&file, b"secret").await.unwrap();

        let err = resolve_file(&[root.path().to_path_buf()], file.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = resolve_file(&[root.path().to_path_buf()], "Output/../../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_resolve_without_leading_slash() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("face-clip.png");
        tokio::fs::write(&file, b"png").await.unwrap();

        let stripped = file.to_str().unwrap().trim_start_matches('/');
        let resolved = resolve_file(&[root.path().to_path_buf()], stripped)
            .await
            .unwrap();
        assert_eq!(resolved, tokio::fs::canonicalize(&file).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_missing_and_directory() {
        let root = TempDir::new().unwrap();
        let roots = [root.path().to_path_buf()];

        let missing = root.path().join("nope.png");
        let err = resolve_file(&roots, missing.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = resolve_file(&roots, root.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
