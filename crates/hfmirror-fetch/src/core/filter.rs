use std::path::{Component, Path};

/// Returns `true` if a file at `path` is selected by the subfolder `filter`.
///
/// A file matches when there is no filter, when its path equals the filter,
/// or when it is nested under `filter + "/"`. Sibling names sharing a prefix
/// (`text_encoder_3x/...` for filter `text_encoder_3`) do not match.
///
/// # Examples
///
/// ```
/// use hfmirror_fetch::core::matches_subfolder;
///
/// assert!(matches_subfolder("text_encoder_3/config.json", Some("text_encoder_3")));
/// assert!(!matches_subfolder("other/file.bin", Some("text_encoder_3")));
/// assert!(matches_subfolder("anything", None));
/// ```
pub fn matches_subfolder(path: &str, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(filter) => {
            path == filter
                || path
                    .strip_prefix(filter)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
    }
}

/// Returns `true` if a listing path may safely become a local file name.
///
/// Rejects empty paths, absolute paths, and any `.`/`..` component.
pub fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }
    path.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
