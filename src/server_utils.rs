use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::constants::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

/// Room codes are typed by hand, so lookups ignore surrounding whitespace and
/// case.
pub fn normalize_room_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.bytes().all(|byte| ROOM_CODE_ALPHABET.contains(&byte))
}
