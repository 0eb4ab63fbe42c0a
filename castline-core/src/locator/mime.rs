//! Audio content type detection from file names.

use std::path::Path;

/// Extensions remote receivers expect under a specific audio type.
///
/// Checked before `mime_guess`, whose answers for some of these (m4a, wav)
/// are not what cast receivers accept.
const AUDIO_EXTENSIONS: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("wav", "audio/wav"),
    ("wma", "audio/x-ms-wma"),
    ("opus", "audio/opus"),
];

/// Returns the audio content type for a path, if its extension names one.
///
/// Non-audio guesses (a `.txt` or `.jpg` registered as audio) yield `None`
/// so the caller's fallback applies.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use castline_core::locator::mime::audio_mime_for_path;
///
/// assert_eq!(audio_mime_for_path(Path::new("/music/Track.M4A")).as_deref(), Some("audio/mp4"));
/// assert_eq!(audio_mime_for_path(Path::new("/music/cover.jpg")), None);
/// ```
pub fn audio_mime_for_path(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();

    if let Some((_, mime)) = AUDIO_EXTENSIONS.iter().find(|(ext, _)| *ext == extension) {
        return Some((*mime).to_string());
    }

    mime_guess::from_ext(&extension)
        .iter()
        .find(|mime| mime.type_() == mime_guess::mime::AUDIO)
        .map(|mime| mime.essence_str().to_string())
}
