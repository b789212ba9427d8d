//! Document parsers keyed by file extension.
//!
//! Each parser turns raw uploaded bytes into plain text for chunking. The
//! registry resolves the parser from the file extension; extensions without
//! one are rejected as unsupported before any processing starts.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use platform::{PlatformError, Result};

/// Extracts plain text from one or more file formats.
pub trait DocumentParser: Send + Sync {
    /// Lowercase extensions this parser handles
    fn extensions(&self) -> &'static [&'static str];

    fn parse(&self, bytes: &[u8]) -> Result<String>;
}

/// Extension-keyed parser collection.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in formats: txt, md, json, csv, html
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainTextParser));
        registry.register(Arc::new(JsonParser));
        registry.register(Arc::new(CsvParser));
        registry.register(Arc::new(HtmlParser));
        registry
    }

    /// Register a parser under every extension it declares
    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        for ext in parser.extensions() {
            self.parsers.insert(ext.to_string(), Arc::clone(&parser));
        }
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.parsers.contains_key(&extension.to_lowercase())
    }

    /// Resolve the parser for an extension (case-insensitive)
    pub fn get(&self, extension: &str) -> Result<Arc<dyn DocumentParser>> {
        self.parsers
            .get(&extension.to_lowercase())
            .cloned()
            .ok_or_else(|| PlatformError::UnsupportedFormat(extension.to_string()))
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| PlatformError::validation("file content is not valid UTF-8"))
}

/// Pass-through parser for plain text and markdown.
///
/// Markdown is chunked raw; the syntax carries meaning worth retrieving.
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "md"]
    }

    fn parse(&self, bytes: &[u8]) -> Result<String> {
        decode_utf8(bytes)
    }
}

/// Validates JSON and re-renders it pretty-printed so keys and values stay
/// close together in chunks.
pub struct JsonParser;

impl DocumentParser for JsonParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn parse(&self, bytes: &[u8]) -> Result<String> {
        let text = decode_utf8(bytes)?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| PlatformError::validation(format!("invalid JSON document: {e}")))?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

/// Labels CSV rows with their header columns, one line per row.
///
/// Splits naively on commas; quoted commas are not handled.
pub struct CsvParser;

impl DocumentParser for CsvParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }

    fn parse(&self, bytes: &[u8]) -> Result<String> {
        let text = decode_utf8(bytes)?;
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let headers: Vec<&str> = match lines.next() {
            Some(header) => header.split(',').map(str::trim).collect(),
            None => return Ok(String::new()),
        };

        let mut rows = Vec::new();
        for line in lines {
            let fields = line.split(',').map(str::trim);
            let labeled: Vec<String> = headers
                .iter()
                .zip(fields)
                .map(|(header, field)| format!("{header}: {field}"))
                .collect();
            rows.push(labeled.join(", "));
        }

        Ok(rows.join("\n"))
    }
}

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BLOCK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:p|div|br|h[1-6]|li|tr)[^>]*>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Strips markup from HTML, keeping block boundaries as line breaks.
pub struct HtmlParser;

impl DocumentParser for HtmlParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["html"]
    }

    fn parse(&self, bytes: &[u8]) -> Result<String> {
        let html = decode_utf8(bytes)?;

        let text = SCRIPT_RE.replace_all(&html, "");
        let text = STYLE_RE.replace_all(&text, "");
        let text = COMMENT_RE.replace_all(&text, "");
        let text = BLOCK_TAG_RE.replace_all(&text, "\n");
        let text = TAG_RE.replace_all(&text, "");

        let text = decode_entities(&text);

        let text = SPACE_RE.replace_all(&text, " ");
        let text = BLANK_LINE_RE.replace_all(&text, "\n");

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Decode the entities that show up in ordinary prose. `&amp;` goes last so
/// already-escaped entities do not double-decode.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
