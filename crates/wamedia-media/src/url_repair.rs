//! Repair for Firebase Storage download URLs whose object path was
//! percent-encoded twice (`images%252Ffile.jpg` instead of `images%2Ffile.jpg`).

use url::Url;

const FIREBASE_STORAGE_HOST: &str = "firebasestorage.googleapis.com";
const DOUBLE_ENCODED_SLASH: &str = "%252F";
const ENCODED_SLASH: &str = "%2F";

/// Whether `input` is a Firebase Storage URL with a double-encoded path.
pub fn needs_repair(input: &str) -> bool {
    if !input.contains(FIREBASE_STORAGE_HOST) {
        return false;
    }
    Url::parse(input)
        .map(|url| url.path().contains(DOUBLE_ENCODED_SLASH))
        .unwrap_or(false)
}

/// Replace `%252F` with `%2F` in the path of a Firebase Storage URL.
///
/// Anything else, including input that does not parse, comes back unchanged.
/// Query and fragment are never touched, so the download token survives.
pub fn fix_malformed_url(input: &str) -> String {
    if !needs_repair(input) {
        return input.to_string();
    }
    let Ok(mut url) = Url::parse(input) else {
        return input.to_string();
    };
    let path = url.path().replace(DOUBLE_ENCODED_SLASH, ENCODED_SLASH);
    url.set_path(&path);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROKEN: &str = "https://firebasestorage.googleapis.com/v0/b/crm.appspot.com/o/images%252Finst%252F2024%252Fabc.jpg?alt=media&token=6f1c";
    const FIXED: &str = "https://firebasestorage.googleapis.com/v0/b/crm.appspot.com/o/images%2Finst%2F2024%2Fabc.jpg?alt=media&token=6f1c";

    #[test]
    fn test_repairs_double_encoded_path() {
        assert!(needs_repair(BROKEN));
        assert_eq!(fix_malformed_url(BROKEN), FIXED);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let once = fix_malformed_url(BROKEN);
        assert_eq!(fix_malformed_url(&once), once);
        assert_eq!(fix_malformed_url(FIXED), FIXED);
        assert!(!needs_repair(FIXED));
    }

    #[test]
    fn test_noop_on_other_hosts() {
        let inputs = [
            "https://minio.local/bucket/images%252Fabc.jpg",
            "https://mmg.whatsapp.net/v/t62/abc.enc?ccb=11-4",
            "https://example.com/?next=firebasestorage.googleapis.com",
            "[Imagem]",
            "",
        ];
        for input in inputs {
            assert_eq!(fix_malformed_url(input), input, "input: {input}");
        }
    }

    #[test]
    fn test_query_is_left_alone() {
        let url = "https://firebasestorage.googleapis.com/v0/b/x/o/a.jpg?alt=media&next=%252F";
        assert!(!needs_repair(url));
        assert_eq!(fix_malformed_url(url), url);
    }

    #[test]
    fn test_unparseable_input_is_returned() {
        let input = "firebasestorage.googleapis.com/v0/b/x/o/images%252Fa.jpg";
        assert_eq!(fix_malformed_url(input), input);
    }
}
