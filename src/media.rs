use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serializer;
use uuid::Uuid;

use crate::error::AppError;

pub const MEDIA_URL: &str = "/media/";
const RECIPE_IMAGES_DIR: &str = "recipes/images";

#[derive(Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: &'static str,
    pub bytes: Vec<u8>,
}

/// Decodes a `data:image/<type>;base64,<payload>` URI.
pub fn decode_data_uri(uri: &str) -> Result<DecodedImage, AppError> {
    let invalid = || AppError::BadRequest("Image must be a base64 data URI".to_string());

    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;

    let extension = match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => {
            return Err(AppError::BadRequest(format!(
                "Unsupported image type: {mime}"
            )))
        }
    };

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(invalid());
    }

    Ok(DecodedImage { extension, bytes })
}

/// Writes a recipe image under `media_root` and returns its relative path.
pub async fn save_recipe_image(media_root: &Path, uri: &str) -> Result<String, AppError> {
    let image = decode_data_uri(uri)?;
    let relative = format!("{}/{}.{}", RECIPE_IMAGES_DIR, Uuid::new_v4(), image.extension);

    let target = media_root.join(&relative);
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            tracing::error!("Failed to create media directory: {:?}", e);
            AppError::InternalServerError
        })?;
    }
    tokio::fs::write(&target, &image.bytes).await.map_err(|e| {
        tracing::error!("Failed to store image {}: {:?}", target.display(), e);
        AppError::InternalServerError
    })?;

    Ok(relative)
}

/// Best-effort removal of a stored file; a missing file is not an error.
pub async fn remove(media_root: &Path, relative: &str) {
    if let Err(e) = tokio::fs::remove_file(media_root.join(relative)).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove media file {}: {:?}", relative, e);
        }
    }
}

pub fn url(relative: &str) -> String {
    format!("{MEDIA_URL}{relative}")
}

/// Serializes a stored relative path as its public URL.
pub fn serialize_url<S>(relative: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&url(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn decodes_png_data_uri() {
        let image = decode_data_uri(PNG).unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_non_image_and_malformed_uris() {
        assert!(decode_data_uri("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(decode_data_uri("iVBORw0KGgo=").is_err());
        assert!(decode_data_uri("data:image/png;base64,***").is_err());
        assert!(decode_data_uri("data:image/png,plain").is_err());
    }

    #[test]
    fn url_prefixes_media_root() {
        assert_eq!(url("recipes/images/a.png"), "/media/recipes/images/a.png");
    }

    #[tokio::test]
    async fn stores_image_under_media_root() {
        let root = std::env::temp_dir().join(format!("foodgram-media-{}", Uuid::new_v4()));
        let relative = save_recipe_image(&root, PNG).await.unwrap();

        assert!(relative.starts_with("recipes/images/"));
        assert!(relative.ends_with(".png"));
        assert!(root.join(&relative).exists());

        remove(&root, &relative).await;
        assert!(!root.join(&relative).exists());
        let _ = std::fs::remove_dir_all(&root);
    }
}
