use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use session_protocol::{FileReference, InlineAttachment};

/// Decoded-size ceiling for inline transmission: 5 MiB.
pub const INLINE_ATTACHMENT_LIMIT: u64 = 5 * 1024 * 1024;

/// One part of an outbound user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text {
        text: String,
    },
    /// Hidden file content appended to the prompt as a context block.
    FileContent {
        path: String,
        content: String,
    },
    Image {
        /// Base64-encoded bytes.
        data: String,
        media_type: String,
        file_name: Option<String>,
        /// Where the image also exists on disk, when known. Oversized
        /// images without one cannot be demoted to a reference.
        local_path: Option<PathBuf>,
    },
    File {
        path: PathBuf,
        file_name: Option<String>,
        media_type: Option<String>,
        byte_len: Option<u64>,
    },
}

/// Why an image part was not transmitted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    OversizedWithoutPath,
    UndecodableData,
}

/// An image part excluded from the turn, kept observable for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedAttachment {
    pub file_name: Option<String>,
    pub media_type: String,
    pub decoded_len: u64,
    pub reason: DropReason,
}

/// Result of bucketing message parts for transmission. The two lists
/// are disjoint; `dropped` records oversized images with nowhere to go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedAttachments {
    pub inline: Vec<InlineAttachment>,
    pub file_references: Vec<FileReference>,
    pub dropped: Vec<DroppedAttachment>,
}

/// Buckets message parts into inline payloads and file references.
///
/// Images at or under [`INLINE_ATTACHMENT_LIMIT`] decoded bytes go
/// inline. Oversized images are demoted to a file reference when a
/// local path is available, and dropped otherwise. Non-image file parts
/// are always references. Pure function; no side effects.
pub fn classify_attachments(parts: &[MessagePart]) -> ClassifiedAttachments {
    classify_with_limit(parts, INLINE_ATTACHMENT_LIMIT)
}

fn classify_with_limit(parts: &[MessagePart], limit: u64) -> ClassifiedAttachments {
    let mut classified = ClassifiedAttachments::default();

    for part in parts {
        match part {
            MessagePart::Image {
                data,
                media_type,
                file_name,
                local_path,
            } => {
                let decoded_len = match BASE64.decode(data) {
                    Ok(bytes) => bytes.len() as u64,
                    Err(_) => {
                        classified.dropped.push(DroppedAttachment {
                            file_name: file_name.clone(),
                            media_type: media_type.clone(),
                            decoded_len: 0,
                            reason: DropReason::UndecodableData,
                        });
                        continue;
                    }
                };

                if decoded_len <= limit {
                    classified.inline.push(InlineAttachment {
                        data: data.clone(),
                        media_type: media_type.clone(),
                        file_name: file_name.clone(),
                        decoded_len,
                    });
                } else if let Some(path) = local_path {
                    classified.file_references.push(FileReference {
                        path: path.display().to_string(),
                        file_name: file_name
                            .clone()
                            .unwrap_or_else(|| file_name_from_path(path)),
                        media_type: Some(media_type.clone()),
                        byte_len: Some(decoded_len),
                    });
                } else {
                    classified.dropped.push(DroppedAttachment {
                        file_name: file_name.clone(),
                        media_type: media_type.clone(),
                        decoded_len,
                        reason: DropReason::OversizedWithoutPath,
                    });
                }
            }
            MessagePart::File {
                path,
                file_name,
                media_type,
                byte_len,
            } => {
                classified.file_references.push(FileReference {
                    path: path.display().to_string(),
                    file_name: file_name
                        .clone()
                        .unwrap_or_else(|| file_name_from_path(path)),
                    media_type: media_type.clone(),
                    byte_len: *byte_len,
                });
            }
            MessagePart::Text { .. } | MessagePart::FileContent { .. } => {}
        }
    }

    classified
}

fn file_name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
