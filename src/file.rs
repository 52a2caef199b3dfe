// File loading
//
// Reads a whole file into memory. An empty buffer is the only failure signal,
// so a legitimately empty file is indistinguishable from a missing one.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Text,
    Binary,
}

/// Read the entire file at `path`, or return an empty buffer on failure
pub fn read_entire_file<P: AsRef<Path>>(path: P, mode: FileMode) -> Vec<u8> {
    let path = path.as_ref();

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Failed to read file {:?}: {}", path, e);
            return Vec::new();
        }
    };

    match mode {
        FileMode::Binary => bytes,
        FileMode::Text => {
            // Text reads normalise Windows line endings
            if bytes.contains(&b'\r') {
                String::from_utf8_lossy(&bytes).replace("\r\n", "\n").into_bytes()
            } else {
                bytes
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let data = read_entire_file(dir.path().join("nope.spv"), FileMode::Binary);
        assert!(data.is_empty());
    }

    #[test]
    fn binary_read_is_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x03, 0x02, 0x23, 0x07, b'\r', b'\n']).unwrap();

        let data = read_entire_file(file.path(), FileMode::Binary);
        assert_eq!(data, vec![0x03, 0x02, 0x23, 0x07, b'\r', b'\n']);
    }

    #[test]
    fn text_read_normalises_line_endings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"title = \"x\"\r\nwidth = 800\r\n").unwrap();

        let data = read_entire_file(file.path(), FileMode::Text);
        assert_eq!(data, b"title = \"x\"\nwidth = 800\n".to_vec());
    }
}
