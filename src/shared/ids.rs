use getrandom::getrandom;
use std::sync::atomic::{AtomicU64, Ordering};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_WIDTH: usize = 8;
const SUFFIX_SPACE: u64 = 36_u64.pow(SUFFIX_WIDTH as u32);

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

fn base36_encode_u64(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    chars.into_iter().rev().collect()
}

fn base36_encode_fixed(mut value: u64, width: usize) -> String {
    let mut chars = vec!['0'; width];
    for idx in (0..width).rev() {
        chars[idx] = BASE36_ALPHABET[(value % 36) as usize] as char;
        value /= 36;
    }
    chars.into_iter().collect()
}

/// `job-<millis base36>-<8 random base36 chars>`; sorts by creation time.
pub fn new_job_id(now_millis: i64) -> String {
    let mut bytes = [0_u8; 8];
    let sample = match getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes),
        Err(_) => {
            let counter = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
            (u64::from(std::process::id()) << 32) ^ counter
        }
    } % SUFFIX_SPACE;
    let ts = base36_encode_u64(u64::try_from(now_millis).unwrap_or(0));
    format!("job-{ts}-{}", base36_encode_fixed(sample, SUFFIX_WIDTH))
}

/// Job ids end up in file names and Redis values.
pub fn is_valid_job_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}
