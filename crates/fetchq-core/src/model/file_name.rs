//! Destination file naming: URL-derived names and `name (n).ext` increments.

use std::path::{Path, PathBuf};

const FALLBACK_NAME: &str = "download.bin";
const NAME_MAX: usize = 255;

/// Derive a filesystem-safe file name from the last path segment of `url`.
pub fn derive_file_name(url: &str) -> String {
    let segment = url::Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
    });
    let Some(raw) = segment else {
        return FALLBACK_NAME.to_string();
    };

    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c == '/' || c == '\\' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let mut name = out.trim_matches(|c| c == '.' || c == '_').to_string();
    if name.len() > NAME_MAX {
        let mut cut = NAME_MAX;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

/// First `stem (n).ext` next to `file` (n starting at 1) for which `taken` is false.
pub fn incremented_file_name(file: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let parent = file.parent().unwrap_or_else(|| Path::new(""));
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = parent.join(name);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
