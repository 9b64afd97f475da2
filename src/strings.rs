//! String helpers: random tokens and slugs.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use crate::error::Error;

/// The 64 symbols [`random_string`] draws from.
pub const RANDOM_ALPHABET: &[u8; 64] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_+";

static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern compiles"));

/// Returns `len` characters picked uniformly, with replacement, from
/// [`RANDOM_ALPHABET`].
///
/// Backed by the thread-local CSPRNG, so the tokens are fit for unguessable
/// file names. The output contains `+`, which is not URL-safe unescaped.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())]))
        .collect()
}

/// Lowercases `s`, collapses every run of characters outside `[a-z0-9]` into
/// one hyphen and trims hyphens from both ends.
///
/// ```rust
/// assert_eq!(tsu_toolkit::slugify("Hello World 123").unwrap(), "hello-world-123");
/// assert!(tsu_toolkit::slugify("!!!").is_err());
/// ```
pub fn slugify(s: &str) -> Result<String, Error> {
    if s.is_empty() {
        return Err(Error::EmptyString);
    }

    let lowered = s.to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        return Err(Error::EmptySlug);
    }

    Ok(slug.to_owned())
}
