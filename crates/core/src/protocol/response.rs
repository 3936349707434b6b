/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 2\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// The reason phrase is `OK` for every status code. Build with
/// [`add_header`](Self::add_header) and [`with_body`](Self::with_body), then
/// call [`serialize`](Self::serialize). `Content-Length` is computed from the
/// body's byte length.
#[must_use]
#[derive(Debug)]
pub struct RtspResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Server identification string included in every RTSP response
/// per RFC 2326 §12.36.
pub const SERVER_AGENT: &str = concat!("rtsp-live/", env!("CARGO_PKG_VERSION"));

impl RtspResponse {
    /// Response echoing `cseq`, which every RTSP response must carry.
    pub fn new(status_code: u16, cseq: &str) -> Self {
        RtspResponse {
            status_code,
            headers: vec![
                ("CSeq".to_string(), cseq.to_string()),
                ("Server".to_string(), SERVER_AGENT.to_string()),
            ],
            body: None,
        }
    }

    pub fn ok(cseq: &str) -> Self {
        Self::new(200, cseq)
    }

    /// 400, request line could not be parsed.
    pub fn bad_request(cseq: &str) -> Self {
        Self::new(400, cseq)
    }

    /// 454, no established session for this request.
    pub fn session_not_found(cseq: &str) -> Self {
        Self::new(454, cseq)
    }

    /// 455, method not allowed in the current session state.
    pub fn method_not_valid(cseq: &str) -> Self {
        Self::new(455, cseq)
    }

    /// 461, requested transport is not offered.
    pub fn unsupported_transport(cseq: &str) -> Self {
        Self::new(461, cseq)
    }

    /// 501, unknown method.
    pub fn not_implemented(cseq: &str) -> Self {
        Self::new(501, cseq)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} OK\r\n", self.status_code);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }
}
