use std::{
    fmt,
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::PathBuf,
    sync::Arc,
};

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};

use crate::TransferError;

/// Query parameter carrying the server-side timeout hint, in seconds.
pub const TIMEOUT_QUERY_PARAM: &str = "timeout";

/// A payload that can be produced again from its first byte.
pub trait BodySource: fmt::Debug + Send + Sync {
    /// Reads the whole payload from the start.
    fn replay(&self) -> io::Result<Bytes>;
}

/// Byte range of a local file, read again on every attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSection {
    pub path: PathBuf,
    pub offset: u64,
    pub len: u64,
}

impl FileSection {
    /// `len` bytes of the file at `path`, starting at `offset`.
    pub fn new(path: impl Into<PathBuf>, offset: u64, len: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            len,
        }
    }
}

impl BodySource for FileSection {
    fn replay(&self) -> io::Result<Bytes> {
        let len = usize::try_from(self.len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "section too large"))?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = vec![0; len];
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Request payload.
#[derive(Clone, Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// In-memory payload; only bytes from `position` onward would be sent.
    Buffered { data: Bytes, position: usize },
    /// Payload produced on demand.
    Replayable(Arc<dyn BodySource>),
}

impl RequestBody {
    /// Buffered body positioned at its first byte.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered {
            data: data.into(),
            position: 0,
        }
    }

    /// Body read from `source` on every attempt.
    pub fn replayable(source: impl BodySource + 'static) -> Self {
        Self::Replayable(Arc::new(source))
    }

    /// Moves the read position of a buffered body. Other bodies are unaffected.
    pub fn seek(&mut self, to: usize) {
        if let Self::Buffered { data, position } = self {
            *position = to.min(data.len());
        }
    }

    /// Current read position; always 0 for non-buffered bodies.
    pub fn position(&self) -> usize {
        match self {
            Self::Buffered { position, .. } => *position,
            Self::Empty | Self::Replayable(_) => 0,
        }
    }

    /// Resets the body to its first byte.
    ///
    /// Replayable sources are read here, so the attempt sends exactly what
    /// the source produced at rewind time.
    pub fn rewind(&mut self) -> io::Result<()> {
        match self {
            Self::Empty => {}
            Self::Buffered { position, .. } => *position = 0,
            Self::Replayable(source) => {
                let data = source.replay()?;
                *self = Self::Buffered { data, position: 0 };
            }
        }
        Ok(())
    }

    /// Bytes to send from the current position, or `None` for no body.
    pub fn into_bytes(self) -> io::Result<Option<Bytes>> {
        match self {
            Self::Empty => Ok(None),
            Self::Buffered { data, position } => {
                let start = position.min(data.len());
                Ok(Some(data.slice(start..)))
            }
            Self::Replayable(source) => source.replay().map(Some),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(data: Bytes) -> Self {
        Self::bytes(data)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        Self::bytes(data)
    }
}

impl From<String> for RequestBody {
    fn from(data: String) -> Self {
        Self::bytes(data)
    }
}

impl From<&'static str> for RequestBody {
    fn from(data: &'static str) -> Self {
        Self::bytes(data)
    }
}

/// Description of one HTTP request, cloned afresh for every attempt.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RequestBody,
}

impl TransferRequest {
    /// Request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// GET request for `url`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// HEAD request for `url`.
    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// PUT request for `url`; never sent to the secondary.
    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Adds or replaces a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL on the primary.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable access to the target URL.
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Headers sent with every attempt.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body.
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Mutable access to the body.
    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    /// GET and HEAD may be served by the read-only secondary.
    pub fn is_idempotent_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Resets the body to its first byte before an attempt.
    pub fn rewind_body(&mut self) -> Result<(), TransferError> {
        self.body.rewind().map_err(TransferError::Rewind)
    }

    /// Sets `timeout=<secs>` in the query string, keeping other parameters.
    pub(crate) fn set_timeout_hint(&mut self, secs: u64) {
        let retained: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(key, _)| key != TIMEOUT_QUERY_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        self.url
            .query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair(TIMEOUT_QUERY_PARAM, &secs.to_string());
    }

    /// Splits the request into method, URL, headers and body.
    pub fn into_parts(self) -> (Method, Url, HeaderMap, RequestBody) {
        (self.method, self.url, self.headers, self.body)
    }
}
