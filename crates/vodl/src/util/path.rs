use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
};

/// Turns a video title into a file name that is valid on every major platform.
///
/// Returns `None` if nothing usable is left.
pub fn sanitize_filename(title: &str) -> Option<String> {
    let sanitized: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let sanitized = sanitized.trim().trim_matches('.').trim();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized.to_string())
    }
}

pub trait VodPathExt {
    /// Replace the extension, appending it if the file name contains dots already.
    ///
    /// `Episode 1.5` becomes `Episode 1.5.ts` instead of `Episode 1.ts`.
    fn with_output_extension<T: AsRef<OsStr>>(&self, extension: T) -> PathBuf;
}

impl VodPathExt for PathBuf {
    fn with_output_extension<T: AsRef<OsStr>>(&self, extension: T) -> PathBuf {
        let mut filename = OsString::new();
        if let Some(name) = self.file_name() {
            filename.push(name);
        }
        filename.push(".");
        filename.push(extension);
        self.with_file_name(filename)
    }
}
