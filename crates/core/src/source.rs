use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding as RsEncoding, BIG5, GBK, SHIFT_JIS, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FILE_SCHEME: &str = "file://";

/// 來源文件的識別字串（`file://` URI 或一般路徑）。 / Identity of a source document (`file://` URI or plain path).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// 由檔案路徑建立 `file://` 識別。 / Builds a `file://` identity from a filesystem path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let display = path.as_ref().to_string_lossy().replace('\\', "/");
        if display.starts_with('/') {
            Self(format!("{FILE_SCHEME}{display}"))
        } else {
            Self(format!("{FILE_SCHEME}/{display}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 對應的檔案系統路徑。 / Filesystem path this identity points at.
    pub fn to_path(&self) -> PathBuf {
        match self.0.strip_prefix(FILE_SCHEME) {
            Some(rest) => {
                // `file:///C:/x` keeps the drive letter without the leading slash.
                let bytes = rest.as_bytes();
                if bytes.len() > 3 && bytes[0] == b'/' && bytes[2] == b':' {
                    PathBuf::from(&rest[1..])
                } else {
                    PathBuf::from(rest)
                }
            }
            None => PathBuf::from(&self.0),
        }
    }

    /// 最後一個路徑片段，例如 `app.log`。 / Last path segment, e.g. `app.log`.
    pub fn file_name(&self) -> &str {
        let trimmed = self.0.trim_end_matches(['/', '\\']);
        trimmed
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(trimmed)
    }

    /// 不含副檔名的檔名。 / File name without its extension.
    pub fn base_name(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// 含前導句點的副檔名；沒有則為空字串。 / Extension including the leading dot, or empty.
    pub fn extension(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[idx..],
            _ => "",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 讀取來源文件時可能發生的錯誤。 / Errors raised while loading a source document.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unable to open source {source_id}: {error}")]
    Unavailable {
        source_id: SourceId,
        #[source]
        error: io::Error,
    },
    #[error("source {0} is not valid text in any supported encoding")]
    InvalidEncoding(SourceId),
}

/// 主機提供的來源讀取介面。 / Host-provided access to source document text.
pub trait SourceLoader {
    fn load(&self, source: &SourceId) -> Result<String, SourceError>;
}

/// 從檔案系統讀取並解碼來源。 / Reads and decodes sources from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceLoader;

impl SourceLoader for FsSourceLoader {
    fn load(&self, source: &SourceId) -> Result<String, SourceError> {
        SourceText::open(source).map(|text| text.contents)
    }
}

/// 以記憶體內容充當來源，供已開啟的緩衝區使用。 / In-memory sources, for buffers the host already holds.
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
    texts: HashMap<SourceId, String>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: SourceId, text: impl Into<String>) {
        self.texts.insert(source, text.into());
    }

    pub fn remove(&mut self, source: &SourceId) -> Option<String> {
        self.texts.remove(source)
    }
}

impl SourceLoader for MemorySources {
    fn load(&self, source: &SourceId) -> Result<String, SourceError> {
        self.texts
            .get(source)
            .cloned()
            .ok_or_else(|| SourceError::Unavailable {
                source_id: source.clone(),
                error: io::Error::new(io::ErrorKind::NotFound, "no such buffer"),
            })
    }
}

/// 列舉偵測到的文字編碼。 / Encoding detected while decoding a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Windows1252,
    ShiftJis,
    Gbk,
    Big5,
}

/// 解碼後、行尾已正規化的來源內容。 / Decoded source text with newlines normalised to `\n`.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub contents: String,
    pub encoding: TextEncoding,
}

impl SourceText {
    /// 讀取並解碼來源檔案。 / Reads and decodes the source file.
    pub fn open(source: &SourceId) -> Result<Self, SourceError> {
        let unavailable = |error| SourceError::Unavailable {
            source_id: source.clone(),
            error,
        };
        let mut file = File::open(source.to_path()).map_err(unavailable)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(unavailable)?;

        let (text, encoding) =
            decode_bytes(&bytes).ok_or_else(|| SourceError::InvalidEncoding(source.clone()))?;
        Ok(Self {
            contents: normalize_newlines(&text),
            encoding,
        })
    }
}

/// 將文字切成行；結尾換行不產生空白行。 / Splits text into lines; a trailing newline adds no empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.strip_suffix('\n').unwrap_or(text).split('\n').collect()
}

fn decode_bytes(bytes: &[u8]) -> Option<(String, TextEncoding)> {
    if let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
        return String::from_utf8(rest.to_vec())
            .ok()
            .map(|text| (text, TextEncoding::Utf8));
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
        return decode_utf16(rest, false).map(|text| (text, TextEncoding::Utf16Le));
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
        return decode_utf16(rest, true).map(|text| (text, TextEncoding::Utf16Be));
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some((text.to_owned(), TextEncoding::Utf8));
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let (encoding, tag) = map_legacy(detector.guess(None, true))?;
    let (cow, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return None;
    }
    Some((
        match cow {
            Cow::Borrowed(slice) => slice.to_owned(),
            Cow::Owned(text) => text,
        },
        tag,
    ))
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| {
            let pair = [chunk[0], chunk[1]];
            if big_endian {
                u16::from_be_bytes(pair)
            } else {
                u16::from_le_bytes(pair)
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

fn map_legacy(encoding: &'static RsEncoding) -> Option<(&'static RsEncoding, TextEncoding)> {
    if encoding == WINDOWS_1252 {
        Some((encoding, TextEncoding::Windows1252))
    } else if encoding == SHIFT_JIS {
        Some((encoding, TextEncoding::ShiftJis))
    } else if encoding == GBK {
        Some((encoding, TextEncoding::Gbk))
    } else if encoding == BIG5 {
        Some((encoding, TextEncoding::Big5))
    } else {
        None
    }
}

fn normalize_newlines(input: &str) -> String {
    // CRLF 與 CR 轉成 LF。 / Convert CRLF and CR sequences to LF.
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                result.push('\n');
            }
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::GBK;
    use std::fs;

    #[test]
    fn source_id_name_parts() {
        let id = SourceId::new("file:///var/log/app.server.log");
        assert_eq!(id.file_name(), "app.server.log");
        assert_eq!(id.base_name(), "app.server");
        assert_eq!(id.extension(), ".log");
        assert_eq!(id.to_path(), PathBuf::from("/var/log/app.server.log"));

        let bare = SourceId::new("notes/README");
        assert_eq!(bare.base_name(), "README");
        assert_eq!(bare.extension(), "");

        let dotfile = SourceId::new("/home/u/.bashrc");
        assert_eq!(dotfile.base_name(), ".bashrc");
        assert_eq!(dotfile.extension(), "");
    }

    #[test]
    fn from_path_round_trips_to_path() {
        let id = SourceId::from_path("/tmp/data.csv");
        assert_eq!(id.as_str(), "file:///tmp/data.csv");
        assert_eq!(id.to_path(), PathBuf::from("/tmp/data.csv"));
    }

    #[test]
    fn open_normalises_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crlf.txt");
        fs::write(&path, b"one\r\ntwo\rthree\n").unwrap();

        let text = SourceText::open(&SourceId::from_path(&path)).unwrap();
        assert_eq!(text.contents, "one\ntwo\nthree\n");
        assert_eq!(text.encoding, TextEncoding::Utf8);
        assert_eq!(split_lines(&text.contents), vec!["one", "two", "three"]);
    }

    #[test]
    fn open_decodes_utf16_and_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let utf16 = dir.path().join("utf16.txt");
        fs::write(&utf16, b"\xFF\xFEh\x00i\x00").unwrap();
        let text = SourceText::open(&SourceId::from_path(&utf16)).unwrap();
        assert_eq!(text.contents, "hi");
        assert_eq!(text.encoding, TextEncoding::Utf16Le);

        let gbk = dir.path().join("gbk.txt");
        let (encoded, _, _) = GBK.encode("中文測試");
        fs::write(&gbk, encoded.as_ref()).unwrap();
        let text = SourceText::open(&SourceId::from_path(&gbk)).unwrap();
        assert_eq!(text.contents, "中文測試");
        assert_eq!(text.encoding, TextEncoding::Gbk);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let id = SourceId::from_path(dir.path().join("gone.log"));
        let err = FsSourceLoader.load(&id).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn split_lines_edge_cases() {
        assert!(split_lines("").is_empty());
        assert_eq!(split_lines("\n"), vec![""]);
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
    }
}
