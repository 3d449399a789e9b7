//! Fixed-size page windows over raw book bytes.
//!
//! ## How It Works
//!
//! ```text
//! page_size = 1000
//!
//! bytes:  [0 ........ 999][1000 ...... 1999][2000 .. 2349]
//! page:         0                1               2   <- partial page counts
//! ```
//!
//! Page boundaries are byte offsets into the uploaded file, which makes the
//! page count a pure function of the file size. For UTF-8 books a boundary
//! that lands inside a multibyte character moves forward to the next
//! character boundary, so consecutive pages tile the text with no gaps and
//! no overlap.
//!
//! ## Encodings
//!
//! A byte order mark wins: UTF-16 books are paged on code-unit boundaries
//! (surrogate pairs are never split). Without one, UTF-8 is tried first.
//! Files that are not valid UTF-8 fall back to the single-byte code pages
//! common for uploaded plain-text books. Cyrillic-looking bytes try
//! windows-1251, KOI8-R and IBM866, keeping the decoding whose words read as
//! plausible Cyrillic; anything else tries windows-1252 first. Decoded text
//! containing control characters is rejected, so binary uploads fail with
//! [`Error::Decode`] instead of producing garbage pages.
//!
//! PDF books (files starting with `%PDF-`) have no byte-addressable text;
//! [`decode_text`] extracts their text with `pdf-extract` for summarization.

use std::borrow::Cow;
use std::sync::Arc;

use encoding_rs::{Encoding, IBM866, KOI8_R, UTF_16BE, UTF_16LE, WINDOWS_1251, WINDOWS_1252};

use crate::store::BookSource;
use crate::{Error, Result};

/// Number of pages for a file of `byte_len` bytes.
///
/// Zero bytes means zero pages; a partially filled final page counts as a
/// full page. A zero `page_size` yields zero pages.
///
/// ```rust
/// use precis::total_pages;
///
/// assert_eq!(total_pages(0, 1000), 0);
/// assert_eq!(total_pages(1000, 1000), 1);
/// assert_eq!(total_pages(1000, 999), 2);
/// ```
pub fn total_pages(byte_len: u64, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    byte_len.div_ceil(page_size as u64) as usize
}

/// Result of a page lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// Text of the requested page.
    Text(String),
    /// The index lies past the last page.
    EndOfBook,
}

impl Page {
    /// The page text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::EndOfBook => None,
        }
    }
}

/// Slice page `index` out of `bytes`.
///
/// `book` names the source in errors.
pub fn page_of(book: &str, bytes: &[u8], index: usize, page_size: usize) -> Result<Page> {
    let start = index.saturating_mul(page_size);
    if page_size == 0 || start >= bytes.len() {
        return Ok(Page::EndOfBook);
    }
    let end = start.saturating_add(page_size).min(bytes.len());

    if let Some((encoding, bom)) = utf16_bom(bytes) {
        let to = utf16_boundary(bytes, end, encoding);
        let from = utf16_boundary(bytes, start.max(bom), encoding).min(to);
        return decode_strict(encoding, &bytes[from..to])
            .map(|text| Page::Text(text.into_owned()))
            .ok_or_else(|| Error::Decode {
                book: book.to_string(),
            });
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        let page = &text[ceil_char_boundary(text, start)..ceil_char_boundary(text, end)];
        let page = if start == 0 {
            page.trim_start_matches('\u{feff}')
        } else {
            page
        };
        return Ok(Page::Text(page.to_string()));
    }

    let encoding = detect_legacy(book, bytes)?;
    tracing::debug!(book, encoding = encoding.name(), "paging non-UTF-8 book");
    decode_strict(encoding, &bytes[start..end])
        .map(|text| Page::Text(text.into_owned()))
        .ok_or_else(|| Error::Decode {
            book: book.to_string(),
        })
}

/// Decode a whole book to text.
///
/// PDF files are run through text extraction; everything else goes through
/// the same encoding detection as [`page_of`].
pub fn decode_text(book: &str, bytes: &[u8]) -> Result<String> {
    let decode_error = || Error::Decode {
        book: book.to_string(),
    };
    if is_pdf(bytes) {
        return extract_pdf(book, bytes);
    }
    if let Some((encoding, bom)) = utf16_bom(bytes) {
        return decode_strict(encoding, &bytes[bom..])
            .map(Cow::into_owned)
            .ok_or_else(decode_error);
    }
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => Ok(text.trim_start_matches('\u{feff}').to_string()),
        Err(_) => {
            let encoding = detect_legacy(book, bytes)?;
            decode_strict(encoding, bytes)
                .map(Cow::into_owned)
                .ok_or_else(decode_error)
        }
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Whether `bytes` look like a PDF document.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

fn extract_pdf(book: &str, bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|err| {
        tracing::warn!(book, error = %err, "PDF text extraction failed");
        Error::Decode {
            book: book.to_string(),
        }
    })?;
    if text.trim().is_empty() {
        tracing::warn!(book, "PDF has no extractable text");
        return Err(Error::Decode {
            book: book.to_string(),
        });
    }
    // pdf-extract separates pages with form feeds.
    Ok(text.replace('\u{c}', " "))
}

fn utf16_bom(bytes: &[u8]) -> Option<(&'static Encoding, usize)> {
    Encoding::for_bom(bytes).filter(|(encoding, _)| *encoding == UTF_16LE || *encoding == UTF_16BE)
}

// Round up to a code-unit boundary that does not split a surrogate pair.
fn utf16_boundary(bytes: &[u8], index: usize, encoding: &'static Encoding) -> usize {
    let mut index = index + index % 2;
    if let Some(unit) = bytes.get(index..index + 2) {
        let unit = if encoding == UTF_16BE {
            u16::from_be_bytes([unit[0], unit[1]])
        } else {
            u16::from_le_bytes([unit[0], unit[1]])
        };
        if (0xDC00..0xE000).contains(&unit) {
            index += 2;
        }
    }
    index.min(bytes.len())
}

// Replaces str::ceil_char_boundary for MSRV compatibility
fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}

fn detect_legacy(book: &str, bytes: &[u8]) -> Result<&'static Encoding> {
    tracing::warn!(book, "book is not valid UTF-8, detecting legacy encoding");
    let cyrillic = [WINDOWS_1251, KOI8_R, IBM866];
    let decoded = |encoding: &'static Encoding| {
        decode_strict(encoding, bytes).map(|text| (encoding, cyrillic_score(&text)))
    };

    let best_cyrillic = cyrillic
        .into_iter()
        .filter_map(decoded)
        .fold(None, |best: Option<(&'static Encoding, i64)>, candidate| match best {
            Some(best) if best.1 >= candidate.1 => Some(best),
            _ => Some(candidate),
        })
        .map(|(encoding, _)| encoding);
    let western = decoded(WINDOWS_1252).map(|(encoding, _)| encoding);

    let picked = if looks_cyrillic(bytes) {
        best_cyrillic.or(western)
    } else {
        western.or(best_cyrillic)
    };
    picked.ok_or_else(|| Error::Decode {
        book: book.to_string(),
    })
}

/// Decode without replacement characters, rejecting control characters.
fn decode_strict<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    let text = encoding.decode_without_bom_handling_and_without_replacement(bytes)?;
    let binary = text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\u{c}'));
    (!binary).then_some(text)
}

// Mis-decoded Cyrillic flips letter case mid-word ("рТЙЧЕФ") or turns letters
// into box drawing. Real words have capitals only up front or throughout.
fn cyrillic_score(text: &str) -> i64 {
    let mut score = 0i64;
    for word in text.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
        let rest_lower = word.chars().skip(1).all(char::is_lowercase);
        let all_upper = word.chars().all(char::is_uppercase);
        score += if rest_lower || all_upper { 1 } else { -1 };
    }
    let symbols = text
        .chars()
        .filter(|c| matches!(c, '\u{2500}'..='\u{25ff}'))
        .count();
    score.saturating_sub(i64::try_from(symbols).unwrap_or(i64::MAX))
}

// Cyrillic text in a single-byte code page is made of words written entirely
// in high bytes; Western text only sprinkles accented letters into ASCII words.
fn looks_cyrillic(bytes: &[u8]) -> bool {
    let mut pure = 0usize;
    let mut mixed = 0usize;
    for word in bytes.split(u8::is_ascii_whitespace) {
        if !word.iter().any(|b| *b >= 0x80) {
            continue;
        }
        if word.iter().any(u8::is_ascii_alphabetic) {
            mixed += 1;
        } else {
            pure += 1;
        }
    }
    pure > mixed
}

/// Page lookups against a [`BookSource`].
#[derive(Clone)]
pub struct PageIndexer {
    source: Arc<dyn BookSource>,
    page_size: usize,
}

impl PageIndexer {
    /// Index books from `source` in windows of `page_size` bytes.
    pub fn new(source: Arc<dyn BookSource>, page_size: usize) -> Self {
        Self { source, page_size }
    }

    /// Bytes per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Page count of a stored book.
    ///
    /// PDF books are paged over their extracted text.
    pub fn total_pages(&self, user: &str, book: &str) -> Result<usize> {
        let len = if is_pdf(&self.source.head(user, book, PDF_MAGIC.len())?) {
            let bytes = self.source.raw_bytes(user, book)?;
            extract_pdf(book, &bytes)?.len() as u64
        } else {
            self.source.byte_len(user, book)?
        };
        Ok(total_pages(len, self.page_size))
    }

    /// Text of page `index` of a stored book.
    pub fn page(&self, user: &str, book: &str, index: usize) -> Result<Page> {
        let bytes = self.source.raw_bytes(user, book)?;
        if is_pdf(&bytes) {
            let text = extract_pdf(book, &bytes)?;
            return page_of(book, text.as_bytes(), index, self.page_size);
        }
        page_of(book, &bytes, index, self.page_size)
    }

    /// The whole book as text.
    pub fn full_text(&self, user: &str, book: &str) -> Result<String> {
        let bytes = self.source.raw_bytes(user, book)?;
        decode_text(book, &bytes)
    }
}

impl std::fmt::Debug for PageIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageIndexer")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
