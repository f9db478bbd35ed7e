//! Callbacks run on plaintext after a successful, verified decryption
//!
//! Hooks only ever see plaintext that passed authentication, and they cannot
//! influence what gets written.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait PostDecryptHook: Send + Sync {
    fn after_decrypt(&self, source: &Path, plaintext: &[u8]);
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl PostDecryptHook for NoopHook {
    fn after_decrypt(&self, _source: &Path, _plaintext: &[u8]) {}
}

/// Fires `action` once the plaintext contains `keyword` (ASCII case-insensitive)
/// at least `threshold` times.
///
/// With `once` set, the action fires for the first qualifying file only.
pub struct KeywordHook {
    keyword: Vec<u8>,
    threshold: usize,
    once: bool,
    fired: AtomicBool,
    action: Box<dyn Fn(&Path, usize) + Send + Sync>,
}

impl KeywordHook {
    pub fn new(
        keyword: impl AsRef<[u8]>,
        threshold: usize,
        action: impl Fn(&Path, usize) + Send + Sync + 'static,
    ) -> Self {
        Self {
            keyword: keyword.as_ref().to_ascii_lowercase(),
            threshold,
            once: false,
            fired: AtomicBool::new(false),
            action: Box::new(action),
        }
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

impl PostDecryptHook for KeywordHook {
    fn after_decrypt(&self, source: &Path, plaintext: &[u8]) {
        let count = count_keyword(plaintext, &self.keyword);
        if count < self.threshold {
            return;
        }
        if self.once && self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        (self.action)(source, count);
    }
}

/// Runs every hook in order.
impl PostDecryptHook for Vec<Box<dyn PostDecryptHook>> {
    fn after_decrypt(&self, source: &Path, plaintext: &[u8]) {
        for hook in self {
            hook.after_decrypt(source, plaintext);
        }
    }
}

/// Count non-overlapping, ASCII case-insensitive occurrences of a lowercase
/// `needle` in `haystack`.
fn count_keyword(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if haystack[i..i + needle.len()].eq_ignore_ascii_case(needle) {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}
