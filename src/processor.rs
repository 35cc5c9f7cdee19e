//! Streaming file processing.
//!
//! Reads a candidate file and applies a compiled matcher. Small files are
//! matched in one call; larger ones stream through fixed-size chunks with
//! a trailing overlap sized to the widest span the predicate can observe,
//! so a chunk seam can never hide a match. At most `overlap + chunk_size`
//! bytes of haystack are alive per task.

use crate::cancel::CancelToken;
use crate::error::FileError;
use crate::matcher::ContentMatcher;
use crate::types::{BINARY_SNIFF_LEN, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE, MAX_FULL_CONTENT_SIZE};
use crate::walk::FileSystem;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    pub chunk_size: usize,
    pub max_file_size: u64,
    /// Stop at the first matching chunk. This is the contractual default;
    /// disabling it scans every chunk for the same verdict (no positions
    /// are collected either way at this level).
    pub early_termination: bool,
    /// Attach full content to the result for matched files small enough to
    /// materialize.
    pub collect_content: bool,
    /// Null-byte sniff on the first 8 KiB; binary files are reported
    /// unmatched without a content pass.
    pub skip_binary: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            early_termination: true,
            collect_content: false,
            skip_binary: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessResult {
    pub matched: bool,
    pub content: Option<String>,
    pub error: Option<FileError>,
}

impl ProcessResult {
    fn failed(error: FileError) -> Self {
        Self { matched: false, content: None, error: Some(error) }
    }
}

pub(crate) struct FileProcessor<'f> {
    fs: &'f dyn FileSystem,
}

impl<'f> FileProcessor<'f> {
    pub fn new(fs: &'f dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Evaluate `matcher` against the file at `path`.
    pub fn process(
        &self,
        path: &Path,
        matcher: &ContentMatcher,
        opts: &ProcessOptions,
        cancel: &CancelToken,
    ) -> ProcessResult {
        let size = match self.fs.stat(path) {
            Ok(meta) => meta.size,
            Err(e) => return ProcessResult::failed(e.into()),
        };
        if size > opts.max_file_size {
            return ProcessResult::failed(FileError::TooLarge {
                size,
                limit: opts.max_file_size,
            });
        }

        let mut stream = match self.fs.open(path) {
            Ok(s) => s,
            Err(e) => return ProcessResult::failed(e.into()),
        };

        // Sniff before any decode work; the sniffed bytes are carried into
        // the content pass so nothing is read twice. Capped at the chunk
        // size so the streaming windows keep their shape.
        let sniff_len = BINARY_SNIFF_LEN.min(size as usize).min(opts.chunk_size).max(1);
        let mut head = vec![0u8; sniff_len];
        let head_len = match read_full(&mut stream, &mut head) {
            Ok(n) => n,
            Err(e) => return ProcessResult::failed(e.into()),
        };
        head.truncate(head_len);
        if opts.skip_binary && head.contains(&0) {
            return ProcessResult::failed(FileError::Binary);
        }

        if size as usize <= opts.chunk_size {
            return self.process_full(stream, head, matcher, opts);
        }
        self.process_streaming(path, size, stream, head, matcher, opts, cancel)
    }

    fn process_full(
        &self,
        mut stream: Box<dyn Read + Send>,
        mut bytes: Vec<u8>,
        matcher: &ContentMatcher,
        opts: &ProcessOptions,
    ) -> ProcessResult {
        if let Err(e) = stream.read_to_end(&mut bytes) {
            return ProcessResult::failed(e.into());
        }
        let content = decode_lossy(bytes);
        let matched = matcher.is_match(&content);
        let keep = matched && opts.collect_content && content.len() <= MAX_FULL_CONTENT_SIZE;
        ProcessResult { matched, content: keep.then_some(content), error: None }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_streaming(
        &self,
        path: &Path,
        size: u64,
        mut stream: Box<dyn Read + Send>,
        head: Vec<u8>,
        matcher: &ContentMatcher,
        opts: &ProcessOptions,
        cancel: &CancelToken,
    ) -> ProcessResult {
        let overlap_len = matcher.required_overlap();
        let mut overlap = String::new();
        let mut carry: Vec<u8> = Vec::new();
        let mut pending = head;
        let mut buf = vec![0u8; opts.chunk_size];
        let mut matched = false;

        loop {
            if cancel.is_cancelled() {
                return ProcessResult { matched, content: None, error: None };
            }

            let mut bytes = std::mem::take(&mut carry);
            bytes.append(&mut pending);

            let want = opts.chunk_size.saturating_sub(bytes.len().min(opts.chunk_size));
            let at_eof = if want > 0 {
                let n = match read_full(&mut stream, &mut buf[..want]) {
                    Ok(n) => n,
                    Err(e) => return ProcessResult::failed(e.into()),
                };
                bytes.extend_from_slice(&buf[..n]);
                n < want
            } else {
                false
            };
            if bytes.is_empty() {
                break;
            }
            if !at_eof {
                carry = split_incomplete_suffix(&mut bytes);
            }

            let chunk = decode_lossy(bytes);
            let mut window = String::with_capacity(overlap.len() + chunk.len());
            window.push_str(&overlap);
            window.push_str(&chunk);

            if matcher.is_match(&window) {
                matched = true;
                if opts.early_termination {
                    break;
                }
            }

            if at_eof {
                break;
            }

            // Retain the trailing overlap for the next window.
            let cut = ceil_char(&window, window.len().saturating_sub(overlap_len));
            overlap = window.split_off(cut);
        }

        // Content is attached only as a complete blob; an early-terminated
        // stream re-reads the file rather than shipping a truncated copy.
        let content = if matched && opts.collect_content && size as usize <= MAX_FULL_CONTENT_SIZE
        {
            self.fs.read(path).ok().map(decode_lossy)
        } else {
            None
        };
        ProcessResult { matched, content, error: None }
    }
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
fn read_full(stream: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Split off a trailing incomplete UTF-8 sequence so it can be prepended
/// to the next chunk instead of decoding as replacement characters.
fn split_incomplete_suffix(bytes: &mut Vec<u8>) -> Vec<u8> {
    let len = bytes.len();
    let tail_start = len.saturating_sub(4);
    for i in (tail_start..len).rev() {
        let b = bytes[i];
        if b < 0x80 {
            return Vec::new(); // ascii tail, nothing split
        }
        if b >= 0xC0 {
            // Lead byte at i: complete iff its sequence fits before len.
            let need = if b >= 0xF0 {
                4
            } else if b >= 0xE0 {
                3
            } else {
                2
            };
            if i + need > len {
                return bytes.split_off(i);
            }
            return Vec::new();
        }
        // Continuation byte: keep walking back to the lead.
    }
    Vec::new()
}

fn decode_lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn ceil_char(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
