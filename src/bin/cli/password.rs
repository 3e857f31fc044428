//! Key handling for CLI operations.

use rpassword::prompt_password;

/// Prompts for a key with confirmation (for creating encrypted backups).
pub fn confirm_key() -> Option<String> {
    let key1 = prompt_password("Enter key: ").ok()?;
    if key1.is_empty() {
        eprintln!("Key cannot be empty");
        return None;
    }

    let key2 = prompt_password("Confirm key: ").ok()?;
    if key1 == key2 {
        Some(key1)
    } else {
        eprintln!("Keys do not match");
        None
    }
}

/// Returns the provided key, or prompts for one.
///
/// Without confirmation an empty answer is passed through; decryption then
/// uses the built-in default key.
pub fn get_or_prompt_key(provided: Option<String>, prompt: &str, confirm: bool) -> Option<String> {
    if let Some(key) = provided {
        return Some(key);
    }

    if confirm {
        confirm_key()
    } else {
        prompt_password(prompt).ok()
    }
}
