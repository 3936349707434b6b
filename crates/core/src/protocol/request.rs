use crate::error::{ParseErrorKind, RtspError};

/// CSeq echoed when a request carries none.
pub const DEFAULT_CSEQ: &str = "1";

/// A parsed RTSP request (RFC 2326 §6).
///
/// RTSP requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. Header lines without
/// a colon are skipped. Bodies are read and discarded by the connection loop.
#[derive(Debug)]
pub struct RtspRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, PLAY, TEARDOWN, ...).
    pub method: String,
    /// Request-URI (e.g. `rtsp://host:8554/stream`).
    pub uri: String,
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Headers as ordered (name, value) pairs, names as received.
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    /// Parse an RTSP request head: request line, headers, trailing blank line.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines().skip_while(|l| l.trim().is_empty());

        let request_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyRequest,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();

        if parts.len() != 3 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = parts[0].to_string();
        let uri = parts[1].to_string();
        let version = parts[2].to_string();

        if version != "RTSP/1.0" {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let headers = parse_headers(lines);

        Ok(RtspRequest {
            method,
            uri,
            version,
            headers,
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The CSeq to echo on the response, `"1"` when absent (RFC 2326 §12.17).
    pub fn cseq(&self) -> &str {
        self.get_header("CSeq").unwrap_or(DEFAULT_CSEQ)
    }

    /// Declared body length, if any.
    pub fn content_length(&self) -> Option<usize> {
        self.get_header("Content-Length")?.parse().ok()
    }
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
            None => tracing::trace!(line, "skipping header line without colon"),
        }
    }
    headers
}

/// Recover the CSeq from a request head that failed to parse.
pub fn salvage_cseq(raw: &str) -> String {
    parse_headers(raw.lines().skip_while(|l| l.trim().is_empty()).skip(1))
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("CSeq"))
        .map(|(_, value)| value)
        .unwrap_or_else(|| DEFAULT_CSEQ.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_options_request() {
        let raw = "OPTIONS rtsp://localhost:8554/stream RTSP/1.0\r\nCSeq: 1\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "OPTIONS");
        assert_eq!(req.uri, "rtsp://localhost:8554/stream");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.cseq(), "1");
    }

    #[test]
    fn parse_setup_with_transport() {
        let raw = "SETUP rtsp://localhost:8554/stream/trackID=0 RTSP/1.0\r\n\
                   CSeq: 3\r\n\
                   Transport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "SETUP");
        assert_eq!(req.cseq(), "3");
        assert_eq!(
            req.get_header("Transport"),
            Some("RTP/AVP;unicast;client_port=8000-8001")
        );
    }

    #[test]
    fn missing_cseq_defaults_to_one() {
        let req = RtspRequest::parse("OPTIONS * RTSP/1.0\r\n\r\n").unwrap();
        assert_eq!(req.cseq(), "1");
    }

    #[test]
    fn leading_blank_lines_ignored() {
        let raw = "\r\n\r\nPLAY rtsp://h/s RTSP/1.0\r\nCSeq: 9\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.method, "PLAY");
        assert_eq!(req.cseq(), "9");
    }

    #[test]
    fn header_without_colon_skipped() {
        let raw = "OPTIONS * RTSP/1.0\r\nGarbage\r\nCSeq: 4\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.cseq(), "4");
    }

    #[test]
    fn parse_empty_request() {
        assert!(RtspRequest::parse("").is_err());
    }

    #[test]
    fn parse_invalid_request_line() {
        assert!(RtspRequest::parse("JUST_A_METHOD\r\n\r\n").is_err());
    }

    #[test]
    fn salvage_cseq_from_bad_request() {
        assert_eq!(salvage_cseq("BROKEN\r\nCSeq: 12\r\n\r\n"), "12");
        assert_eq!(salvage_cseq("BROKEN\r\n\r\n"), "1");
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let raw = "OPTIONS rtsp://localhost RTSP/1.0\r\ncseq: 42\r\ncontent-length: 7\r\n\r\n";
        let req = RtspRequest::parse(raw).unwrap();
        assert_eq!(req.get_header("CSeq"), Some("42"));
        assert_eq!(req.get_header("CSEQ"), Some("42"));
        assert_eq!(req.content_length(), Some(7));
    }
}
