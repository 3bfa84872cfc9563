use std::path::PathBuf;

use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::fs;
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Multipart field name the frontend sends the image under
const PICTURE_FIELD: &str = "profile_picture";
const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

fn picture_dir(uploads_dir: &str) -> PathBuf {
    PathBuf::from(uploads_dir).join("profile_pictures")
}

/// Map a stored `/uploads/profile_pictures/<file>` URL back to its path on
/// disk. Returns None for URLs that don't point into the picture dir.
fn disk_path_for_url(uploads_dir: &str, url: &str) -> Option<PathBuf> {
    let filename = url.strip_prefix("/uploads/profile_pictures/")?;
    if filename.is_empty() || filename.contains('/') || filename.contains("..") {
        return None;
    }
    Some(picture_dir(uploads_dir).join(filename))
}

fn authorize(claims: &Claims, user_id: Uuid) -> AppResult<()> {
    if claims.sub != user_id && claims.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "You can only manage your own profile picture".to_string(),
        ));
    }
    Ok(())
}

/// Best-effort removal of a previously stored picture; a missing file is
/// not an error, the database reference is cleaned up regardless.
async fn remove_stored_picture(uploads_dir: &str, url: &str) {
    if let Some(path) = disk_path_for_url(uploads_dir, url) {
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove old profile picture {:?}: {}", path, e);
            }
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ProfilePictureResponse {
    pub message: String,
    pub profile_picture_url: Option<String>,
}

/// Upload a profile picture (multipart, images only, 5 MiB cap). Replaces
/// and deletes the previous picture if one was stored.
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ProfilePictureResponse>> {
    authorize(&claims, user_id)?;

    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut picture: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart payload: {}", e)))?
    {
        if field.name() != Some(PICTURE_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::BadRequest(
                "Only image files are allowed".to_string(),
            ));
        }

        let extension = field
            .file_name()
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
            .or_else(|| content_type.strip_prefix("image/").map(str::to_string))
            .unwrap_or_else(|| "jpg".to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read image: {}", e)))?;

        if data.len() > MAX_PICTURE_BYTES {
            return Err(AppError::BadRequest(
                "Image exceeds the 5 MiB size limit".to_string(),
            ));
        }

        picture = Some((extension, data.to_vec()));
        break;
    }

    let (extension, data) = picture.ok_or_else(|| {
        AppError::BadRequest(format!("Missing '{}' image field", PICTURE_FIELD))
    })?;

    let dir = picture_dir(&state.config.uploads_dir);
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create uploads dir: {}", e)))?;

    let filename = format!("{}-{}.{}", user_id, Uuid::new_v4(), extension);
    let path = dir.join(&filename);
    fs::write(&path, &data)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store image: {}", e)))?;

    let url = format!("/uploads/profile_pictures/{}", filename);

    // Drop the previous picture once the new one is on disk
    if let Some(old_url) = user.profile_picture_url.clone() {
        remove_stored_picture(&state.config.uploads_dir, &old_url).await;
    }

    let mut active: user::ActiveModel = user.into();
    active.profile_picture_url = Set(Some(url.clone()));
    active.update(&state.db).await?;

    Ok(Json(ProfilePictureResponse {
        message: "Profile picture updated".to_string(),
        profile_picture_url: Some(url),
    }))
}

/// Remove the stored profile picture and clear the reference
pub async fn delete_profile_picture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ProfilePictureResponse>> {
    authorize(&claims, user_id)?;

    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let url = user
        .profile_picture_url
        .clone()
        .ok_or_else(|| AppError::NotFound("User has no profile picture".to_string()))?;

    remove_stored_picture(&state.config.uploads_dir, &url).await;

    let mut active: user::ActiveModel = user.into();
    active.profile_picture_url = Set(None);
    active.update(&state.db).await?;

    Ok(Json(ProfilePictureResponse {
        message: "Profile picture removed".to_string(),
        profile_picture_url: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_path_maps_only_into_picture_dir() {
        let path = disk_path_for_url("uploads", "/uploads/profile_pictures/abc.png").unwrap();
        assert!(path.ends_with("profile_pictures/abc.png"));

        assert!(disk_path_for_url("uploads", "/etc/passwd").is_none());
        assert!(disk_path_for_url("uploads", "/uploads/profile_pictures/../../etc/passwd").is_none());
        assert!(disk_path_for_url("uploads", "/uploads/profile_pictures/").is_none());
    }
}
