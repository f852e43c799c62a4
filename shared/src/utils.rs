use std::any::Any;

/// Longest payload prefix written to logs
const MAX_LOGGED_PAYLOAD_BYTES: usize = 256;

/// Best-effort text of a caught panic
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Lossy, truncated rendering of a raw payload for diagnostics
pub fn payload_preview(payload: &[u8]) -> String {
    let end = payload.len().min(MAX_LOGGED_PAYLOAD_BYTES);
    let mut preview = String::from_utf8_lossy(&payload[..end]).into_owned();
    if payload.len() > end {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let caught = std::panic::catch_unwind(|| panic!("static str")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static str");

        let caught = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "formatted 42");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_payload_preview_truncates() {
        assert_eq!(payload_preview(b"{\"id\":"), "{\"id\":");

        let long = vec![b'a'; 300];
        let preview = payload_preview(&long);
        assert_eq!(preview.len(), 256 + 3);
        assert!(preview.ends_with("..."));
    }
}
