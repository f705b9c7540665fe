//! Request body reading and multipart uploads

use actix_multipart::{Field, Multipart};
use actix_web::http::header::HeaderMap;
use actix_web::web;
use futures::{StreamExt, TryStreamExt};

use towers_common::error::{Error, Result};
use towers_functions::UploadedFile;

use crate::form;

/// Field name for a single upload
pub const SINGLE_FILE_FIELD: &str = "file";
/// Field name for multiple uploads
pub const MULTIPLE_FILES_FIELD: &str = "files";

/// Which multipart field may carry files, and how many
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePolicy {
    /// At most one file under `file`
    Single,
    /// Up to `n` files under `files`
    Multiple(u32),
}

impl FilePolicy {
    /// Policy for a function's `max_files`
    pub fn for_max_files(max_files: Option<u32>) -> Self {
        match max_files {
            Some(max) if max > 1 => Self::Multiple(max),
            _ => Self::Single,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            Self::Single => SINGLE_FILE_FIELD,
            Self::Multiple(_) => MULTIPLE_FILES_FIELD,
        }
    }

    pub fn limit(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Multiple(max) => max as usize,
        }
    }

    /// Check one more file arriving under `field` after `received` files
    ///
    /// # Errors
    /// `Upload` when the field is not the expected one or the limit is hit.
    pub fn accept(self, field: &str, received: usize) -> Result<()> {
        if field != self.field() {
            return Err(Error::Upload("Unexpected field".into()));
        }
        if received >= self.limit() {
            return Err(Error::Upload("Too many files".into()));
        }
        Ok(())
    }
}

/// Size limits applied while reading a request
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    /// JSON, form and multipart text fields
    pub body: usize,
    /// Each uploaded file
    pub file: usize,
}

/// Read the whole payload, failing once it exceeds `limit` bytes
///
/// # Errors
/// `PayloadTooLarge` past the limit, `InvalidBody` on a broken stream.
pub async fn read_payload(mut payload: web::Payload, limit: usize) -> Result<web::Bytes> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| Error::InvalidBody(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(Error::PayloadTooLarge { max_size: limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Parsed multipart request: text fields and files
#[derive(Debug, Default)]
pub struct MultipartBody {
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub files: Vec<UploadedFile>,
}

/// Read a multipart request, applying the function's file policy.
///
/// Text fields become body fields, named as in a form body. Parts with a
/// file name are files.
///
/// # Errors
/// `Upload` for malformed multipart or policy violations,
/// `PayloadTooLarge` when a file exceeds the file limit or the text fields
/// together exceed the body limit.
pub async fn read_multipart(
    headers: &HeaderMap,
    payload: web::Payload,
    policy: FilePolicy,
    limits: BodyLimits,
) -> Result<MultipartBody> {
    let mut multipart = Multipart::new(headers, payload);
    let mut body = MultipartBody::default();
    // Names and values of all text fields count against the body limit
    let mut text_bytes = 0;

    while let Some(mut field) = multipart
        .try_next()
        .await
        .map_err(|e| Error::Upload(e.to_string()))?
    {
        let Some(disposition) = field.content_disposition() else {
            continue;
        };
        let name = disposition.get_name().unwrap_or_default().to_string();
        let file_name = disposition.get_filename().map(str::to_string);

        match file_name {
            Some(file_name) => {
                policy.accept(&name, body.files.len())?;
                let content_type = field.content_type().map(ToString::to_string);
                let data = read_field(&mut field, 0, limits.file).await?;
                body.files.push(UploadedFile {
                    field: name,
                    file_name,
                    content_type,
                    data,
                });
            }
            None => {
                text_bytes += name.len();
                let data = read_field(&mut field, text_bytes, limits.body).await?;
                text_bytes += data.len();
                let value = serde_json::Value::String(String::from_utf8_lossy(&data).into_owned());
                form::append_field(&mut body.fields, &name, value);
            }
        }
    }

    Ok(body)
}

/// Read one part; `already` bytes were spent against `limit` before it
async fn read_field(field: &mut Field, already: usize, limit: usize) -> Result<Vec<u8>> {
    if already > limit {
        return Err(Error::PayloadTooLarge { max_size: limit });
    }
    let mut data = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| Error::Upload(e.to_string()))?
    {
        if already + data.len() + chunk.len() > limit {
            return Err(Error::PayloadTooLarge { max_size: limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}
