use wamedia_core::media::MediaKind;

pub(super) const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "heic"];
pub(super) const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "3gp", "m4v"];
pub(super) const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "ogg", "oga", "opus", "wav", "m4a", "aac", "amr", "flac",
];
pub(super) const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "csv", "zip", "rar",
];

/// Storage path segments, checked in this order.
pub(super) const PATH_SEGMENTS: &[(&str, MediaKind)] = &[
    ("/videos/", MediaKind::Video),
    ("/audios/", MediaKind::Audio),
    ("/stickers/", MediaKind::Sticker),
    ("/documents/", MediaKind::Document),
    ("/images/", MediaKind::Image),
];

/// Placeholders the CRM writes when it has no media URL yet.
pub(super) const PLACEHOLDERS: &[(&str, MediaKind)] = &[
    ("[Imagem]", MediaKind::Image),
    ("[Image]", MediaKind::Image),
    ("📷", MediaKind::Image),
    ("🖼", MediaKind::Image),
    ("[Vídeo]", MediaKind::Video),
    ("[Video]", MediaKind::Video),
    ("🎥", MediaKind::Video),
    ("🎬", MediaKind::Video),
    ("[Áudio]", MediaKind::Audio),
    ("[Audio]", MediaKind::Audio),
    ("🎵", MediaKind::Audio),
    ("🎤", MediaKind::Audio),
    ("[Documento]", MediaKind::Document),
    ("[Document]", MediaKind::Document),
    ("📄", MediaKind::Document),
    ("📎", MediaKind::Document),
    ("[Sticker]", MediaKind::Sticker),
    ("[Figurinha]", MediaKind::Sticker),
];

pub(super) fn kind_for_extension(ext: &str) -> Option<MediaKind> {
    let ext = ext.to_ascii_lowercase();
    let ext = ext.as_str();
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Audio)
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Document)
    } else {
        None
    }
}
