//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use walkdir::WalkDir;

/// Deterministic pseudo-random bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Text with a skewed byte distribution, so Huffman actually shrinks it.
pub fn skewed_text(len: usize, seed: u64) -> Vec<u8> {
    const ALPHABET: &[u8] = b"eeeeeeeetttttaaaaoooiinnsshrdlu \n";
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

/// Writes `files` below `root`, creating parent directories.
///
/// A name ending in `/` creates an empty directory.
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    fs::create_dir_all(root).unwrap();
    for (name, data) in files {
        if let Some(dir) = name.strip_suffix('/') {
            fs::create_dir_all(root.join(dir)).unwrap();
            continue;
        }
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, data).unwrap();
    }
}

/// Creates `<parent>/docs` with a mix of text, binary, empty and nested
/// entries, and returns its path.
pub fn sample_tree(parent: &Path) -> PathBuf {
    let root = parent.join("docs");
    let large = random_bytes(200 * 1024, 7);
    let text = skewed_text(90 * 1024, 11);
    write_tree(
        &root,
        &[
            ("readme.txt", b"backups are a habit, not a project\n"),
            ("empty.txt", b""),
            ("notes/todo.md", b"- rotate keys\n- test restores\n"),
            ("notes/deep/deeper/leaf.bin", &[0u8, 1, 2, 3, 255, 254]),
            ("media/blob.bin", &large),
            ("media/words.txt", &text),
            ("cache/", b""),
        ],
    );
    root
}

/// Returns every entry below `root` as relative path to contents.
///
/// Directories map to `None`.
pub fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let contents = if entry.file_type().is_dir() {
                None
            } else {
                Some(fs::read(entry.path()).unwrap())
            };
            (rel, contents)
        })
        .collect()
}

/// Asserts that two directory trees hold the same entries and bytes.
pub fn assert_same_tree(expected: &Path, actual: &Path) {
    let want = snapshot(expected);
    let got = snapshot(actual);
    let want_names: Vec<_> = want.keys().collect();
    let got_names: Vec<_> = got.keys().collect();
    assert_eq!(want_names, got_names, "entry lists differ");
    for (name, data) in &want {
        assert!(got[name] == *data, "contents differ for {}", name);
    }
}

/// Returns the file names directly inside `dir`, sorted.
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
