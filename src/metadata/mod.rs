//! Pure derivation of archive item metadata from a folder name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// archive.org rejects identifiers longer than this
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// Item-level metadata attached to the first transfer of a new item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub title: String,
    pub creator: String,
    pub description: String,
    pub subjects: Vec<String>,
    pub collection: String,
    pub language: Option<String>,
    pub mediatype: String,
}

impl ItemMetadata {
    /// Build the metadata for a lecture folder
    pub fn for_folder(
        folder_name: &str,
        creator: &str,
        base_tags: &str,
        collection: &str,
        language: Option<&str>,
    ) -> Self {
        Self {
            title: derive_title(folder_name),
            creator: creator.to_string(),
            description: generate_description(folder_name, creator),
            subjects: split_tags(&generate_tags(folder_name, base_tags)),
            collection: collection.to_string(),
            language: language.map(str::to_string),
            mediatype: "audio".to_string(),
        }
    }
}

/// Human readable title for a folder such as `21_Kitab ul Taharat`.
///
/// Underscores become spaces, whitespace is collapsed, and a leading
/// chapter number is separated from the rest with ` - `.
pub fn derive_title(folder_name: &str) -> String {
    let cleaned = folder_name
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let digits: String = cleaned.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return cleaned;
    }

    let rest = cleaned[digits.len()..].trim_start_matches([' ', '-', '.']).trim();
    if rest.is_empty() {
        digits
    } else {
        format!("{} - {}", digits, rest)
    }
}

/// Stable archive identifier for a folder name.
///
/// ASCII letters and digits are kept (lowercased); every other run of
/// characters collapses to a single `-`. When the name has non-ASCII
/// characters the slug alone would lose them, so a digest of the full name
/// is appended (or used on its own behind `lecture-` if nothing ASCII is
/// left). Distinct names therefore never share an identifier.
pub fn generate_identifier(folder_name: &str) -> String {
    let mut slug = String::with_capacity(folder_name.len());
    let mut pending_dash = false;

    for c in derive_title(folder_name).chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    let suffix = if folder_name.is_ascii() {
        None
    } else {
        Some(name_digest(folder_name))
    };

    if slug.is_empty() {
        let digest = suffix.unwrap_or_else(|| name_digest(folder_name));
        return format!("lecture-{}", digest);
    }

    let budget = match &suffix {
        Some(digest) => MAX_IDENTIFIER_LEN - digest.len() - 1,
        None => MAX_IDENTIFIER_LEN,
    };
    if slug.len() > budget {
        slug.truncate(budget);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    match suffix {
        Some(digest) => format!("{}-{}", slug, digest),
        None => slug,
    }
}

/// First 12 hex characters of the SHA-256 of `name`
fn name_digest(name: &str) -> String {
    Sha256::digest(name.as_bytes())
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Item description
pub fn generate_description(folder_name: &str, creator: &str) -> String {
    format!(
        "{}\n\nAudio lectures by {}.",
        derive_title(folder_name),
        creator
    )
}

/// Semicolon separated subject tags: the base tags followed by the title.
/// Duplicates (case-insensitive) are dropped.
pub fn generate_tags(folder_name: &str, base_tags: &str) -> String {
    let title = derive_title(folder_name);
    let mut tags: Vec<String> = Vec::new();

    for tag in split_tags(base_tags).into_iter().chain(std::iter::once(title)) {
        if tag.is_empty() {
            continue;
        }
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
    }

    tags.join("; ")
}

/// Split a `a; b; c` tag string into trimmed, non-empty tags
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Public page of an item
pub fn item_url(details_base: &str, identifier: &str) -> String {
    crate::utils::join_url(details_base, identifier)
}
