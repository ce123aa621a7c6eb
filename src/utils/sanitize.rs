//! Safe on-disk names and blob keys derived from untrusted client input.

use chrono::Utc;
use rand::Rng;
use std::fmt;
use std::path::Path;

/// Namespace every blob key starts with.
pub const UPLOADS_ROOT: &str = "uploads";
/// Sub-namespace for profile photos.
pub const PROFILES_DIR: &str = "profiles";

pub const MAX_STORED_NAME_BYTES: usize = 255;
pub const MAX_CATEGORY_CHARS: usize = 100;
pub const MAX_EXTERNAL_ID_CHARS: usize = 64;
const TOKEN_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSegment(pub String);

impl fmt::Display for InvalidSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidSegment {}

/// Random base-36 token; 36^7 possible values per call.
pub fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Replaces every run of characters outside `[A-Za-z0-9.-]` with one `_`.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Splits the last path component of a client filename into (stem, extension).
fn split_name(original: &str) -> (String, String) {
    let name = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let path = Path::new(name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            e.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(16)
                .collect::<String>()
        })
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string();
    (stem, ext)
}

/// `<sanitized stem>_<unixMillis>_<token><ext>`, at most 255 bytes.
pub fn derive_stored_name(original_name: &str) -> String {
    derive_stored_name_at(original_name, Utc::now().timestamp_millis(), &random_token())
}

fn derive_stored_name_at(original_name: &str, millis: i64, token: &str) -> String {
    let (stem, ext) = split_name(original_name);
    let mut base = sanitize_component(&stem);
    let base_trimmed = base.trim_matches(|c| c == '.' || c == '_');
    base = if base_trimmed.is_empty() {
        "file".to_string()
    } else {
        base_trimmed.to_string()
    };

    let suffix = format!("_{}_{}{}", millis, token, ext);
    let budget = MAX_STORED_NAME_BYTES.saturating_sub(suffix.len());
    // ASCII only after sanitizing, so byte truncation is char-safe.
    base.truncate(budget);

    format!("{}{}", base, suffix)
}

/// Trims a user-chosen category and rejects anything that could escape its
/// directory: separators, `..`, a leading `.`, control characters.
pub fn sanitize_category(raw: &str) -> Result<String, InvalidSegment> {
    let category = raw.trim();
    if category.is_empty() {
        return Err(InvalidSegment("Category is required".to_string()));
    }
    if category.chars().count() > MAX_CATEGORY_CHARS {
        return Err(InvalidSegment(format!(
            "Category must be at most {} characters",
            MAX_CATEGORY_CHARS
        )));
    }
    if category.contains(['/', '\\'])
        || category.contains("..")
        || category.starts_with('.')
        || category.chars().any(|c| c.is_control())
    {
        tracing::warn!("Path traversal attempt in category: {:?}", raw);
        return Err(InvalidSegment("Category contains invalid characters".to_string()));
    }
    Ok(category.to_string())
}

/// External ids double as directory names, so they are restricted to
/// `[A-Za-z0-9._-]`.
pub fn validate_external_id(raw: &str) -> Result<String, InvalidSegment> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(InvalidSegment("Student ID is required".to_string()));
    }
    if id.len() > MAX_EXTERNAL_ID_CHARS {
        return Err(InvalidSegment(format!(
            "Student ID must be at most {} characters",
            MAX_EXTERNAL_ID_CHARS
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        || id.starts_with('.')
    {
        return Err(InvalidSegment(
            "Student ID may only contain letters, digits, '.', '-' and '_'".to_string(),
        ));
    }
    if id.eq_ignore_ascii_case(PROFILES_DIR) {
        return Err(InvalidSegment("Student ID is reserved".to_string()));
    }
    Ok(id.to_string())
}

/// `uploads/<owner>/<category>/<storedName>`. Inputs must already have passed
/// [`validate_external_id`], [`sanitize_category`] and [`derive_stored_name`].
pub fn derive_blob_path(owner_external_id: &str, category: &str, stored_name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        UPLOADS_ROOT, owner_external_id, category, stored_name
    )
}

/// `uploads/profiles/<owner>-<unixMillis>-<token><ext>`
pub fn derive_profile_photo_path(owner_external_id: &str, original_name: &str) -> String {
    let (_, ext) = split_name(original_name);
    format!(
        "{}/{}/{}-{}-{}{}",
        UPLOADS_ROOT,
        PROFILES_DIR,
        owner_external_id,
        Utc::now().timestamp_millis(),
        random_token(),
        ext.to_lowercase()
    )
}
