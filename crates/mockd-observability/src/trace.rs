//! W3C trace context handling
//!
//! Parses and propagates the `traceparent` header (version 00). Each traced
//! request gets a child span id under the caller's trace id, or a fresh trace
//! when the header is absent or malformed.

use rand::Rng;

/// Header name carrying W3C trace context
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// A parsed `traceparent` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParent {
    /// 16-byte trace id, lowercase hex
    pub trace_id: String,
    /// 8-byte span id, lowercase hex
    pub span_id: String,
    /// Trace flags byte
    pub flags: u8,
}

impl TraceParent {
    /// Parse a header value; rejects the all-zero ids the spec forbids
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() && version == "00" {
            return None;
        }
        if version.len() != 2 || version == "ff" || !is_lower_hex(version) {
            return None;
        }
        if trace_id.len() != 32 || !is_lower_hex(trace_id) || trace_id.bytes().all(|b| b == b'0') {
            return None;
        }
        if span_id.len() != 16 || !is_lower_hex(span_id) || span_id.bytes().all(|b| b == b'0') {
            return None;
        }
        if flags.len() != 2 || !is_lower_hex(flags) {
            return None;
        }
        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            flags: u8::from_str_radix(flags, 16).ok()?,
        })
    }

    /// Start a fresh trace with the sampled flag set
    pub fn new_root() -> Self {
        Self {
            trace_id: random_hex(16),
            span_id: random_hex(8),
            flags: 0x01,
        }
    }

    /// Derive a child context: same trace, new span id
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: random_hex(8),
            flags: self.flags,
        }
    }

    /// Render as a header value
    pub fn to_header_value(&self) -> String {
        format!("00-{}-{}-{:02x}", self.trace_id, self.span_id, self.flags)
    }
}

/// Parse the incoming header or start a new root, then derive the span
/// context this request runs under
pub fn context_for_request(incoming: Option<&str>) -> TraceParent {
    incoming
        .and_then(TraceParent::parse)
        .map(|parent| parent.child())
        .unwrap_or_else(TraceParent::new_root)
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::rng();
    (0..bytes)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn parses_valid_header() {
        let parsed = TraceParent::parse(SAMPLE).unwrap();
        assert_eq!(parsed.trace_id, "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(parsed.span_id, "b7ad6b7169203331");
        assert_eq!(parsed.flags, 1);
        assert_eq!(parsed.to_header_value(), SAMPLE);
    }

    #[test]
    fn rejects_malformed_headers() {
        for bad in [
            "",
            "00-short-b7ad6b7169203331-01",
            "00-00000000000000000000000000000000-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-0000000000000000-01",
            "ff-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            "00-0AF7651916CD43DD8448EB211C80319C-b7ad6b7169203331-01",
        ] {
            assert!(TraceParent::parse(bad).is_none(), "accepted: {bad}");
        }
    }

    #[test]
    fn child_keeps_trace_id_with_new_span() {
        let parent = TraceParent::parse(SAMPLE).unwrap();
        let child = parent.child();
        assert_eq!(child.trace_id, parent.trace_id);
        assert_ne!(child.span_id, parent.span_id);
        assert_eq!(child.span_id.len(), 16);
    }

    #[test]
    fn context_falls_back_to_new_root() {
        let ctx = context_for_request(None);
        assert_eq!(ctx.trace_id.len(), 32);
        assert_eq!(ctx.flags, 1);

        let propagated = context_for_request(Some(SAMPLE));
        assert_eq!(propagated.trace_id, "0af7651916cd43dd8448eb211c80319c");
    }
}
