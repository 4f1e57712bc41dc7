//! RFC 6376 canonicalization: relaxed for headers, simple for the body.

/// Normalizes bare LF line endings to CRLF. Existing CRLF pairs are kept.
/// Applied before any canonicalization or transmission.
pub(crate) fn normalize_line_endings(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] == b'\r' && input.get(i + 1) == Some(&b'\n') {
            out.extend_from_slice(b"\r\n");
            i += 2;
        } else if input[i] == b'\n' {
            out.extend_from_slice(b"\r\n");
            i += 1;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }

    out
}

/// Relaxed header canonicalization: lowercased name, unfolded value,
/// sequential whitespace collapsed to one space, no space around the colon.
pub(crate) fn relaxed_header(name: &str, value: &str) -> String {
    let mut canonical = String::with_capacity(name.len() + value.len() + 1);
    canonical.push_str(&name.to_ascii_lowercase());
    canonical.push(':');

    let mut in_whitespace = false;
    let mut pending_space = false;
    for ch in value.chars() {
        match ch {
            '\r' | '\n' => {} // unfold
            ' ' | '\t' => in_whitespace = true,
            _ => {
                if in_whitespace && pending_space {
                    canonical.push(' ');
                }
                in_whitespace = false;
                pending_space = true;
                canonical.push(ch);
            }
        }
    }

    canonical
}

/// Simple body canonicalization: trailing empty lines removed, exactly one
/// CRLF at the end. An empty body canonicalizes to a single CRLF.
pub(crate) fn simple_body(body: &[u8]) -> Vec<u8> {
    let mut end = body.len();
    while end >= 2 && &body[end - 2..end] == b"\r\n" {
        end -= 2;
    }

    if end == 0 {
        return b"\r\n".to_vec();
    }

    let mut out = body[..end].to_vec();
    out.extend_from_slice(b"\r\n");
    out
}
