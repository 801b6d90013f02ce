pub(super) fn default_name() -> String {
    "wamedia".to_string()
}
pub(super) fn default_data_dir() -> String {
    "~/.wamedia".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
pub(super) fn default_api_port() -> u16 {
    3000
}
pub(super) fn default_body_limit() -> usize {
    16 * 1024 * 1024
}
pub(super) fn default_proxy_hosts() -> Vec<String> {
    vec![
        "firebasestorage.googleapis.com".into(),
        "storage.googleapis.com".into(),
        "whatsapp.net".into(),
    ]
}
pub(super) fn default_fetch_timeout() -> u64 {
    30
}
pub(super) fn default_fetch_max_bytes() -> u64 {
    64 * 1024 * 1024
}
pub(super) fn default_user_agent() -> String {
    concat!("wamedia/", env!("CARGO_PKG_VERSION")).to_string()
}
pub(super) fn default_db_path() -> String {
    "~/.wamedia/data/messages.db".to_string()
}
pub(super) fn default_evolution_url() -> String {
    "http://localhost:8080".to_string()
}
pub(super) fn default_local_root() -> String {
    "~/.wamedia/media".to_string()
}
pub(super) fn default_local_public_url() -> String {
    "http://127.0.0.1:3000/media".to_string()
}
pub(super) fn default_s3_region() -> String {
    "us-east-1".to_string()
}
