use rand::Rng;
use rand::rngs::OsRng;

/// Ten backup codes per enrollment, matching the stored backup-usage log's
/// per-user accounting.
pub const BACKUP_CODE_COUNT: usize = 10;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// 10 symbols over a 32-symbol alphabet gives 50 bits of entropy, comfortably
/// over the 32-bit floor.
const CODE_LEN: usize = 10;

/// Draw a fresh set of backup codes. Case is fixed upper-case at generation
/// time; validation still normalizes defensively.
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = OsRng;
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            (0..CODE_LEN)
                .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                .collect()
        })
        .collect()
}

/// Normalize a user-presented backup code for comparison: upper-case,
/// strip whitespace and hyphens a user might have typed for readability.
pub fn normalize(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}
