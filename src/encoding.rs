use http::header::{self, HeaderMap, HeaderValue};

/// Content encodings this crate can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Gzip (RFC 1952) framing around a deflate stream.
    Gzip,
    /// Raw deflate stream.
    Deflate,
}

impl Encoding {
    /// Every encoding, in server preference order.
    pub const PREFERENCE: [Encoding; 2] = [Encoding::Gzip, Encoding::Deflate];

    /// Returns the Content-Encoding header value for this encoding.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }

    /// Selects an encoding from an Accept-Encoding header value.
    ///
    /// The value is split on commas and every entry is trimmed. Entries are
    /// compared byte for byte against `gzip` and `deflate`, so `GZIP` or
    /// `gzip;q=1` do not match. Gzip wins whenever it is listed, wherever it
    /// appears.
    pub fn from_accept_encoding(header: &str) -> Option<Encoding> {
        let mut offered = [false; 2];
        for token in header.split(',').map(str::trim) {
            for (slot, encoding) in Self::PREFERENCE.iter().enumerate() {
                if token == encoding.content_encoding() {
                    offered[slot] = true;
                }
            }
        }

        Self::PREFERENCE
            .into_iter()
            .zip(offered)
            .find_map(|(encoding, offered)| offered.then_some(encoding))
    }
}

/// Negotiates the response encoding from request headers.
///
/// Returns `None` when the header is absent, empty, not valid text, or lists
/// nothing supported.
pub fn negotiate(headers: &HeaderMap) -> Option<Encoding> {
    let encoding = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .and_then(Encoding::from_accept_encoding);
    tracing::trace!(encoding = ?encoding, "negotiated response encoding");
    encoding
}

/// Announces the chosen encoding on the response headers.
///
/// Sets Content-Encoding and adds Accept-Encoding to Vary. Returns whether a
/// Vary entry was added, so [`revert`] only removes what was put there.
pub fn announce(headers: &mut HeaderMap, encoding: Encoding) -> bool {
    headers.insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static(encoding.content_encoding()),
    );
    add_vary_accept_encoding(headers)
}

/// Withdraws a previous [`announce`].
pub fn revert(headers: &mut HeaderMap, vary_added: bool) {
    headers.remove(header::CONTENT_ENCODING);
    if vary_added {
        remove_vary_accept_encoding(headers);
    }
}

/// Adds Accept-Encoding to the Vary header if not already covered.
fn add_vary_accept_encoding(headers: &mut HeaderMap) -> bool {
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let covered = vary_str.split(',').any(|v| {
                let v = v.trim();
                v == "*" || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return false;
            }
        }
    }

    headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    true
}

/// Removes the last standalone Accept-Encoding entry from Vary.
fn remove_vary_accept_encoding(headers: &mut HeaderMap) {
    let values: Vec<HeaderValue> = headers.get_all(header::VARY).iter().cloned().collect();
    let Some(position) = values
        .iter()
        .rposition(|v| v.as_bytes().eq_ignore_ascii_case(b"accept-encoding"))
    else {
        return;
    };

    headers.remove(header::VARY);
    for (i, value) in values.into_iter().enumerate() {
        if i != position {
            headers.append(header::VARY, value);
        }
    }
}
