use crate::config::MIB;
use std::fmt;
use std::path::Path;

pub const DOCUMENT_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/jpg", "image/png"];

/// Rejected even when the declared MIME type passes.
pub const DANGEROUS_EXTENSIONS: &[&str] = &[
    "exe", "sh", "bat", "cmd", "com", "scr", "vbs", "js", "jar",
];

pub const PROFILE_PHOTO_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp", "bmp", "ico"];

/// What the validator needs to know about a candidate file.
#[derive(Debug, Clone, Copy)]
pub struct FileCandidate<'a> {
    pub size_bytes: u64,
    pub mime_type: &'a str,
    pub original_name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    SizeLimit { max_bytes: u64 },
    TypeNotAllowed,
    DangerousExtension,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Empty => "EMPTY_FILE",
            Rejection::SizeLimit { .. } => "FILE_TOO_LARGE",
            Rejection::TypeNotAllowed => "INVALID_MIME_TYPE",
            Rejection::DangerousExtension => "BLOCKED_EXTENSION",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "File is empty"),
            Rejection::SizeLimit { max_bytes } => write!(
                f,
                "File size exceeds {}MB limit",
                max_bytes / MIB as u64
            ),
            Rejection::TypeNotAllowed => write!(f, "File type is not allowed"),
            Rejection::DangerousExtension => write!(f, "Executable files are not allowed"),
        }
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MimeRule {
    Exact(&'static [&'static str]),
    /// Any `image/*` type whose file extension is in the list.
    Images(&'static [&'static str]),
}

/// Size + type policy applied before any bytes are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    mime_rule: MimeRule,
}

impl UploadPolicy {
    /// PDF/JPG/PNG documents.
    pub fn documents(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes as u64,
            mime_rule: MimeRule::Exact(DOCUMENT_MIME_TYPES),
        }
    }

    /// Profile photos: common image formats only.
    pub fn profile_photos(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes as u64,
            mime_rule: MimeRule::Images(PROFILE_PHOTO_EXTENSIONS),
        }
    }

    /// Pure decision: size, then MIME allow-list, then the extension denylist.
    pub fn validate(&self, file: &FileCandidate<'_>) -> Result<(), Rejection> {
        if file.size_bytes == 0 {
            return Err(Rejection::Empty);
        }

        if file.size_bytes > self.max_bytes {
            return Err(Rejection::SizeLimit {
                max_bytes: self.max_bytes,
            });
        }

        let mime = normalize_mime(file.mime_type);
        let extension = extension_of(file.original_name);

        let type_ok = match self.mime_rule {
            MimeRule::Exact(allowed) => allowed.contains(&mime.as_str()),
            MimeRule::Images(extensions) => {
                mime.starts_with("image/")
                    && extension
                        .as_deref()
                        .is_some_and(|ext| extensions.contains(&ext))
            }
        };
        if !type_ok {
            return Err(Rejection::TypeNotAllowed);
        }

        if let Some(ext) = extension.as_deref() {
            if DANGEROUS_EXTENSIONS.contains(&ext) {
                tracing::warn!(
                    "Blocked dangerous extension '.{}' declared as {}",
                    ext,
                    file.mime_type
                );
                return Err(Rejection::DangerousExtension);
            }
        }

        Ok(())
    }
}

/// `"Image/PNG; charset=binary"` -> `"image/png"`
pub fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Lowercased final extension of a client-supplied name, ignoring any path.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE_MIB: u64 = 5 * 1024 * 1024;

    fn doc(size: u64, mime: &'static str, name: &'static str) -> FileCandidate<'static> {
        FileCandidate {
            size_bytes: size,
            mime_type: mime,
            original_name: name,
        }
    }

    #[test]
    fn test_size_boundary() {
        let policy = UploadPolicy::documents(5 * MIB);
        assert!(policy.validate(&doc(FIVE_MIB, "application/pdf", "a.pdf")).is_ok());
        assert_eq!(
            policy.validate(&doc(FIVE_MIB + 1, "application/pdf", "a.pdf")),
            Err(Rejection::SizeLimit { max_bytes: FIVE_MIB })
        );
    }

    #[test]
    fn test_mime_allow_list() {
        let policy = UploadPolicy::documents(5 * MIB);
        for mime in ["application/pdf", "image/jpeg", "image/jpg", "image/png", "IMAGE/PNG"] {
            assert!(policy.validate(&doc(10, mime, "scan.png")).is_ok(), "{mime}");
        }
        assert_eq!(
            policy.validate(&doc(10, "text/plain", "notes.txt")),
            Err(Rejection::TypeNotAllowed)
        );
        assert_eq!(
            policy.validate(&doc(10, "application/zip", "a.zip")),
            Err(Rejection::TypeNotAllowed)
        );
    }

    #[test]
    fn test_spoofed_dual_extension_rejected() {
        let policy = UploadPolicy::documents(5 * MIB);
        assert_eq!(
            policy.validate(&doc(1024, "application/pdf", "transcript.pdf.exe")),
            Err(Rejection::DangerousExtension)
        );
        assert_eq!(
            policy.validate(&doc(1024, "image/png", "payload.JS")),
            Err(Rejection::DangerousExtension)
        );
    }

    #[test]
    fn test_empty_file_rejected() {
        let policy = UploadPolicy::documents(5 * MIB);
        assert_eq!(
            policy.validate(&doc(0, "application/pdf", "a.pdf")),
            Err(Rejection::Empty)
        );
    }

    #[test]
    fn test_profile_photo_policy() {
        let policy = UploadPolicy::profile_photos(5 * MIB);
        assert!(policy.validate(&doc(10, "image/webp", "me.webp")).is_ok());
        assert_eq!(
            policy.validate(&doc(10, "application/pdf", "me.pdf")),
            Err(Rejection::TypeNotAllowed)
        );
        assert_eq!(
            policy.validate(&doc(10, "image/png", "me")),
            Err(Rejection::TypeNotAllowed)
        );
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a/b/c.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("C:\\docs\\x.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("README"), None);
    }
}
