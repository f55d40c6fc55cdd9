//! Multipart form decoding for account forms
use actix_multipart::Multipart;
use bytes::BytesMut;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{EditInput, RegisterInput};
use crate::services::{UploadError, UploadedFile};

/// Form part carrying the avatar file
pub const AVATAR_FIELD: &str = "avatar";

/// Combined size cap for the text parts of one form
const MAX_TEXT_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct AccountForm {
    fields: HashMap<String, String>,
    pub avatar: Option<UploadedFile>,
}

impl AccountForm {
    /// Drain `payload`, keeping text parts and at most one avatar file of up
    /// to `max_file_bytes`.
    pub async fn read(mut payload: Multipart, max_file_bytes: usize) -> Result<Self> {
        let mut form = AccountForm::default();
        let mut text_bytes = 0usize;

        while let Some(item) = payload.next().await {
            let mut field =
                item.map_err(|e| AppError::Validation(format!("Invalid form data: {}", e)))?;

            let name = field.name().unwrap_or_default().to_string();
            let file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
            let content_type = field.content_type().map(|m| m.to_string());
            let is_avatar = name == AVATAR_FIELD;
            let limit = if is_avatar { max_file_bytes } else { MAX_TEXT_BYTES };

            let mut data = BytesMut::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk
                    .map_err(|e| AppError::Validation(format!("Invalid form data: {}", e)))?;
                data.extend_from_slice(&chunk);

                if is_avatar && data.len() > limit {
                    return Err(UploadError::TooLarge {
                        size: data.len(),
                        limit,
                    }
                    .into());
                }
                if !is_avatar && text_bytes + data.len() > limit {
                    return Err(AppError::Validation("Form fields are too large".to_string()));
                }
            }

            if is_avatar {
                // Browsers send an empty part when no file was picked
                if data.is_empty() && file_name.as_deref().unwrap_or_default().is_empty() {
                    continue;
                }
                form.avatar = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: data.freeze(),
                });
            } else {
                text_bytes += data.len();
                let value = String::from_utf8(data.to_vec()).map_err(|_| {
                    AppError::Validation(format!("{} must be valid UTF-8", name))
                })?;
                form.fields.insert(name, value);
            }
        }

        debug!(
            fields = form.fields.len(),
            has_avatar = form.avatar.is_some(),
            "Decoded account form"
        );
        Ok(form)
    }

    /// Trimmed value of a text part; absent and blank are the same
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        match self.text(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => Ok(None),
            Some("true" | "1" | "on" | "yes" | "private") => Ok(Some(true)),
            Some("false" | "0" | "off" | "no" | "public") => Ok(Some(false)),
            Some(other) => Err(AppError::Validation(format!(
                "{}: '{}' is not a boolean",
                key, other
            ))),
        }
    }

    pub fn registration(&self) -> Result<RegisterInput> {
        let required = |key: &str| self.text(key).unwrap_or_default();

        Ok(RegisterInput {
            username: required("username"),
            name: required("name"),
            email: required("email"),
            password: self.fields.get("password").cloned().unwrap_or_default(),
            bio: self.text("bio").unwrap_or_default(),
            website: self.text("website"),
            phone: required("phone"),
            language: required("language"),
            privacy: self.flag("privacy")?.unwrap_or(false),
        })
    }

    pub fn edit(&self) -> Result<EditInput> {
        Ok(EditInput {
            name: self.text("name"),
            email: self.text("email"),
            password: self.fields.get("password").filter(|p| !p.is_empty()).cloned(),
            bio: self.text("bio"),
            website: self.text("website"),
            phone: self.text("phone"),
            language: self.text("language"),
            privacy: self.flag("privacy")?,
        })
    }
}
