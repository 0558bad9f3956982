// Purpose: Read the binary header archive bundled next to the tool.
// Inputs/Outputs: Decodes version/include-dirs/files; callers overlay the contents
//                 at the synthetic root and prepend the dirs as system includes.
// Invariants: Little-endian, length-prefixed; version must be 1.
// Gotchas: Decode errors abort the whole invocation, not just one input.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const ARCHIVE_VERSION: u32 = 1;

/// Synthetic root the archive contents are overlaid at.
pub const PACKED_ROOT: &str = "/packed_header";

#[derive(Debug)]
pub struct HeaderArchive {
    pub include_dirs: Vec<String>,
    pub files: Vec<(String, Vec<u8>)>,
}

/// Rewrite an archived path relative to the synthetic root.
pub fn relocated(name: &str) -> PathBuf {
    let relative = name.trim_start_matches(['/', '\\']);
    Path::new(PACKED_ROOT).join(relative)
}

pub fn read_archive(path: &Path) -> Result<HeaderArchive> {
    let data = fs::read(path)
        .with_context(|| format!("header archive file '{}' does not exist", path.display()))?;
    let mut cursor = Cursor::new(&data);

    let version = cursor.read_u32()?;
    if version != ARCHIVE_VERSION {
        bail!("invalid header archive file version");
    }

    let n_dirs = cursor.read_u32()?;
    let mut include_dirs = Vec::with_capacity(n_dirs as usize);
    for _ in 0..n_dirs {
        include_dirs.push(cursor.read_string()?);
    }

    let n_files = cursor.read_u32()?;
    let mut files = Vec::with_capacity(n_files as usize);
    for _ in 0..n_files {
        let name = cursor.read_string()?;
        let content = cursor.read_bytes()?;
        files.push((name, content));
    }

    Ok(HeaderArchive {
        include_dirs,
        files,
    })
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn read_u32(&mut self) -> Result<u32> {
        let end = self.offset + 4;
        if end > self.data.len() {
            bail!("truncated header archive");
        }
        let value = u32::from_le_bytes(self.data[self.offset..end].try_into().unwrap_or([0; 4]));
        self.offset = end;
        Ok(value)
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        let end = self.offset + len;
        if end > self.data.len() {
            bail!("truncated header archive");
        }
        let bytes = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(bytes)
    }

    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).context("non-utf8 string in header archive")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(prefix: &str, bytes: &[u8]) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "fremgen-ar-{}-{}-{}",
            prefix,
            std::process::id(),
            nonce
        ));
        fs::write(&path, bytes).expect("write archive");
        path
    }

    fn put_u32(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_le_bytes());
    }

    fn put_str(out: &mut Vec<u8>, text: &str) {
        put_u32(out, text.len() as u32);
        out.extend_from_slice(text.as_bytes());
    }

    #[test]
    fn decodes_dirs_and_files() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, 1);
        put_u32(&mut bytes, 2);
        put_str(&mut bytes, "include");
        put_str(&mut bytes, "include/frem");
        put_u32(&mut bytes, 1);
        put_str(&mut bytes, "include/frem/rpc.hpp");
        put_str(&mut bytes, "#pragma once\n");

        let path = temp_file("ok", &bytes);
        let archive = read_archive(&path).unwrap();
        assert_eq!(archive.include_dirs, vec!["include", "include/frem"]);
        assert_eq!(archive.files.len(), 1);
        assert_eq!(archive.files[0].0, "include/frem/rpc.hpp");
        assert_eq!(archive.files[0].1, b"#pragma once\n");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, 2);
        let path = temp_file("ver", &bytes);
        let err = read_archive(&path).unwrap_err();
        assert!(err.to_string().contains("invalid header archive file version"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn truncated_archive_is_rejected() {
        let mut bytes = Vec::new();
        put_u32(&mut bytes, 1);
        put_u32(&mut bytes, 1);
        put_u32(&mut bytes, 100); // length runs past the end
        let path = temp_file("trunc", &bytes);
        let err = read_archive(&path).unwrap_err();
        assert!(err.to_string().contains("truncated"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_archive(Path::new("/nonexistent/headers.bin")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn relocation_lands_under_the_synthetic_root() {
        assert_eq!(
            relocated("/usr/include/frem/rpc.hpp"),
            PathBuf::from("/packed_header/usr/include/frem/rpc.hpp")
        );
        assert_eq!(
            relocated("include/frem"),
            PathBuf::from("/packed_header/include/frem")
        );
    }
}
