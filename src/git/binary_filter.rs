//! Decides whether a path should be staged into an environment's worktree.

use std::io::Read;
use std::path::Path;

/// Files larger than this are treated as binary regardless of content.
const MAX_TEXT_SIZE: u64 = 10 * 1024 * 1024;

/// Only the first this-many bytes are sniffed for a NUL byte.
const SNIFF_WINDOW: usize = 8 * 1024;

const SKIPPED_EXTENSIONS: &[&str] = &[
    ".zip", ".tar", ".tar.gz", ".tgz", ".gz", ".bz2", ".xz", ".7z", ".rar",
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".webp", ".svg",
    ".mp3", ".mp4", ".mov", ".avi", ".mkv", ".wav", ".flac",
    ".exe", ".dll", ".so", ".dylib", ".bin", ".o", ".a", ".class",
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".woff", ".woff2", ".ttf", ".otf", ".eot",
    ".pyc", ".pyo",
];

const SKIPPED_PATH_FRAGMENTS: &[&str] = &[
    "node_modules/",
    ".git/",
    "__pycache__/",
    "venv/",
    "target/",
    "build/",
    "dist/",
    ".next/",
    ".DS_Store",
    "*.tmp",
    "*.temp",
    "*.cache",
    "*.log",
];

/// True when `name` should never be staged, based on its extension or a
/// fixed set of path fragments. The `*`-prefixed fragments are matched as
/// literal substrings, not globs — this mirrors the teacher's own
/// pattern-matching posture and must not be "upgraded" to real globbing,
/// since that would silently change which files get committed.
pub fn should_skip(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();

    if SKIPPED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return true;
    }

    SKIPPED_PATH_FRAGMENTS.iter().any(|frag| name.contains(frag))
}

/// True when `path` should be treated as binary: missing, over the size
/// cap, or containing a NUL byte in its first [`SNIFF_WINDOW`] bytes. Empty
/// files are text. UTF-16 text files will be misclassified as binary; this
/// heuristic is intentionally simple and fast, not a MIME sniffer.
pub fn is_binary(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return true;
    };

    if metadata.len() > MAX_TEXT_SIZE {
        return true;
    }

    if metadata.len() == 0 {
        return false;
    }

    let Ok(mut file) = std::fs::File::open(path) else {
        return true;
    };

    let mut buf = [0u8; SNIFF_WINDOW];
    let Ok(read) = file.read(&mut buf) else {
        return true;
    };

    buf[..read].contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn skips_fixed_extensions_case_insensitively() {
        assert!(should_skip("photo.PNG"));
        assert!(should_skip("archive.tar.gz"));
        assert!(!should_skip("main.py"));
    }

    #[test]
    fn skips_fixed_path_fragments() {
        assert!(should_skip("project/node_modules/left-pad/index.js"));
        assert!(should_skip("build/out.txt"));
        assert!(should_skip(".git/HEAD"));
    }

    #[test]
    fn star_prefixed_fragments_are_literal_substrings_not_globs() {
        // "*.tmp" must match only files literally containing the substring "*.tmp",
        // not be interpreted as a glob meaning "any .tmp file".
        assert!(!should_skip("scratch.tmp"));
        assert!(should_skip("weird*.tmpfile"));
    }

    #[test]
    fn is_binary_detects_nul_byte() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[b'a', b'b', 0, b'c']).unwrap();
        assert!(is_binary(file.path()));
    }

    #[test]
    fn is_binary_empty_file_is_text() {
        let file = NamedTempFile::new().unwrap();
        assert!(!is_binary(file.path()));
    }

    #[test]
    fn is_binary_oversized_ascii_file_is_binary() {
        let mut file = NamedTempFile::new().unwrap();
        let chunk = vec![b'a'; 1024 * 1024];
        for _ in 0..10 {
            file.write_all(&chunk).unwrap();
        }
        file.write_all(b"a").unwrap();
        file.flush().unwrap();
        assert!(is_binary(file.path()));
    }

    #[test]
    fn is_binary_missing_file_is_binary() {
        assert!(is_binary(Path::new("/nonexistent/path/does-not-exist")));
    }

    #[test]
    fn is_binary_plain_text_is_not_binary() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"print(1)\n").unwrap();
        assert!(!is_binary(file.path()));
    }
}
