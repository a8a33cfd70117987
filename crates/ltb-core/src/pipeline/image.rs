use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};

use crate::{errors::Error, model::ImageSource, Result};

/// Turn an optional remote URL / local file into a single image reference.
///
/// A URL is used as-is. A local file must exist and have an image extension; it
/// is read whole and inlined as a data URI. Size limits are the guards' job and
/// are not re-checked here.
pub async fn prepare_image(path: Option<&Path>, url: Option<&str>) -> Result<Option<ImageSource>> {
    if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(Some(ImageSource::Url(url.to_string())));
    }
    let Some(path) = path else {
        return Ok(None);
    };

    let invalid = |reason: String| Error::InvalidPath {
        path: path.to_path_buf(),
        reason,
    };

    match tokio::fs::metadata(path).await {
        Ok(md) if md.is_file() => {}
        Ok(_) => return Err(invalid("not a regular file".to_string())),
        Err(_) => return Err(invalid("file not found".to_string())),
    }

    let mime = mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_().as_str() == "image")
        .ok_or_else(|| invalid("file does not look like an image".to_string()))?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| invalid(format!("failed to read image: {e}")))?;

    Ok(Some(ImageSource::DataUri {
        mime: mime.essence_str().to_string(),
        base64: BASE64_STANDARD.encode(bytes),
    }))
}
