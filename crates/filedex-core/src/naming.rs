//! Entry name policy
//!
//! Validation of user-supplied names, the case-folded key used for
//! sibling uniqueness, and the `_copyN` suffix used when a copy or move
//! lands on an occupied name.
//!
//! Given "plan.txt" the candidates are "plan_copy1.txt", "plan_copy2.txt",
//! and so on; a folder "Drafts" yields "Drafts_copy1".

use std::collections::HashSet;

use crate::domain::{DomainError, EntryKind};

/// Longest accepted name, in bytes
pub const MAX_NAME_BYTES: usize = 255;

/// Upper bound on suffix attempts before giving up
pub const MAX_COPY_SUFFIX: u32 = 10_000;

/// Checks that `name` can be stored as a single path component
///
/// `reserved` is the trash-container name, which users may not claim.
pub fn validate_name(name: &str, reserved: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::invalid_name(name, "name is empty"));
    }
    if name == "." || name == ".." {
        return Err(DomainError::invalid_name(name, "name is a relative path component"));
    }
    if name.contains(['/', '\\']) {
        return Err(DomainError::invalid_name(name, "name contains a path separator"));
    }
    if name.contains('\0') {
        return Err(DomainError::invalid_name(name, "name contains a NUL byte"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(DomainError::invalid_name(
            name,
            format!("name is longer than {MAX_NAME_BYTES} bytes"),
        ));
    }
    if name_key(name) == name_key(reserved) {
        return Err(DomainError::invalid_name(name, "name is reserved"));
    }
    Ok(())
}

/// Case-folded form of `name` used for sibling comparisons
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Returns the `n`th copy candidate for `name`
pub fn copy_candidate(name: &str, kind: EntryKind, n: u32) -> String {
    match (kind, split_extension(name)) {
        (EntryKind::File, Some((stem, ext))) => format!("{stem}_copy{n}.{ext}"),
        _ => format!("{name}_copy{n}"),
    }
}

/// Returns `name` if its key is not in `taken`, else the first free copy
/// candidate
///
/// `taken` holds name keys (see [`name_key`]). Returns `None` only after
/// [`MAX_COPY_SUFFIX`] occupied candidates.
pub fn first_free(name: &str, kind: EntryKind, taken: &HashSet<String>) -> Option<String> {
    if !taken.contains(&name_key(name)) {
        return Some(name.to_string());
    }
    (1..=MAX_COPY_SUFFIX)
        .map(|n| copy_candidate(name, kind, n))
        .find(|candidate| !taken.contains(&name_key(candidate)))
}

fn split_extension(name: &str) -> Option<(&str, &str)> {
    let dot = name.rfind('.')?;
    let (stem, ext) = (&name[..dot], &name[dot + 1..]);
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some((stem, ext))
}
