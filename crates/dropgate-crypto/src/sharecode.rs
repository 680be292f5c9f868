use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;

/// Confusion-safe alphabet for share codes: A-Z minus I and O (24 letters).
const LETTERS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LETTER_COUNT: usize = 4;
const DIGIT_COUNT: usize = 4;

/// Generate one candidate share code in the form `XXXX-DDDD`.
///
/// Bytes are drawn from a CSPRNG and reduced modulo the alphabet size; the
/// caller is responsible for detecting collisions against the signalling
/// broker's namespace and re-invoking this on retry (spec: up to
/// `maxAttempts`, default 4).
pub fn generate_code() -> String {
    let mut raw = [0u8; LETTER_COUNT + DIGIT_COUNT];
    OsRng.fill_bytes(&mut raw);

    let mut code = String::with_capacity(9);
    for &b in &raw[..LETTER_COUNT] {
        code.push(LETTERS[b as usize % LETTERS.len()] as char);
    }
    code.push('-');
    for &b in &raw[LETTER_COUNT..] {
        code.push((b'0' + b % 10) as char);
    }
    code
}

/// Validate that `code` matches `^[A-Z]{4}-\d{4}$` using only the 24-letter
/// confusion-safe alphabet (no `I` or `O`).
pub fn is_valid_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    if bytes.len() != 9 || bytes[4] != b'-' {
        return false;
    }
    bytes[..4].iter().all(|b| LETTERS.contains(b)) && bytes[5..].iter().all(|b| b.is_ascii_digit())
}
