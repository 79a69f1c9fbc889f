//! Regex-driven string generation for the `regex` field rule.
//!
//! Grounded on `rand_regex`/`regex_syntax` (the same pair the upstream `rand.regex` SQL function
//! uses to turn a pattern into a sampleable distribution) plus a small shortcut table for the
//! handful of patterns the original system special-cased to avoid generating absurdly long
//! strings for unbounded quantifiers.

use log::warn;
use rand::Rng;

const MAX_REPEAT: u32 = 100;

/// Well-known patterns rewritten to direct generators, bypassing `rand_regex` entirely.
///
/// These mirror the exact string literals the original system checked for (11-digit phone
/// numbers, a Chinese mobile prefix pattern, and a canonical email pattern) since sampling them
/// through a general regex engine either produces implausible-looking phone numbers (any 11
/// digits) or, for the email pattern, strings with pathological length tails.
fn shortcut(pattern: &str, rng: &mut impl Rng) -> Option<String> {
    match pattern {
        r"\d{11}" | "[0-9]{11}" | r"1[3-9]\d{9}" | "1[3-9][0-9]{9}" => Some(generate_phone(rng)),
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}" => Some(generate_email(rng)),
        _ => None,
    }
}

fn generate_phone(rng: &mut impl Rng) -> String {
    let prefix: u32 = rng.gen_range(1..=9);
    let rest: u32 = rng.gen_range(0..100_000_000);
    format!("1{prefix}{rest:08}")
}

const EMAIL_DOMAINS: &[&str] = &["gmail.com", "yahoo.com", "hotmail.com", "outlook.com", "qq.com"];

fn generate_email(rng: &mut impl Rng) -> String {
    let username: String = (0..8).map(|_| random_alphanumeric_char(rng)).collect();
    let domain = EMAIL_DOMAINS[rng.gen_range(0..EMAIL_DOMAINS.len())];
    format!("{username}@{domain}")
}

/// Fallback alphanumeric generator used for `custom` rules and when a pattern fails to parse.
pub fn random_alphanumeric_string(rng: &mut impl Rng, length: usize) -> String {
    (0..length).map(|_| random_alphanumeric_char(rng)).collect()
}

fn random_alphanumeric_char(rng: &mut impl Rng) -> char {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    CHARSET[rng.gen_range(0..CHARSET.len())] as char
}

/// Generates a string matching `pattern`, preferring the shortcut table, then `rand_regex`, and
/// finally falling back to a random 10-character string (with a logged warning) if the pattern
/// fails to parse.
pub fn generate(pattern: &str, rng: &mut impl Rng) -> String {
    if let Some(shortcut) = shortcut(pattern, rng) {
        return shortcut;
    }
    match compile(pattern) {
        Ok(regex) => rng.sample(&regex),
        Err(err) => {
            warn!("could not parse regex pattern '{pattern}': {err}; falling back to a random string");
            random_alphanumeric_string(rng, 10)
        }
    }
}

fn compile(pattern: &str) -> Result<rand_regex::Regex, crate::error::Error> {
    // `\d`/`\w`/`\s` are valid in `regex_syntax` itself (unlike the Go `goregen` engine this
    // system was ported from), so no escape rewriting is needed before parsing.
    let hir = regex_syntax::ParserBuilder::new()
        .build()
        .parse(pattern)
        .map_err(|source| crate::error::Error::InvalidRegex { pattern: pattern.to_owned(), source })?;
    rand_regex::Regex::with_hir(hir, MAX_REPEAT)
        .map_err(|_| crate::error::Error::Generation {
            field: String::new(),
            reason: format!("regex '{pattern}' has no bounded sampling strategy"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn phone_shortcut_has_eleven_digits_and_valid_prefix() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let phone = generate(r"1[3-9]\d{9}", &mut rng);
            assert_eq!(phone.len(), 11);
            assert!(phone.chars().all(|c| c.is_ascii_digit()));
            assert_eq!(&phone[0..1], "1");
            assert!(('3'..='9').contains(&phone.chars().nth(1).unwrap()));
        }
    }

    #[test]
    fn email_shortcut_has_at_and_known_domain() {
        let mut rng = StdRng::seed_from_u64(2);
        let email = generate(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}", &mut rng);
        let (_, domain) = email.split_once('@').expect("email must contain @");
        assert!(EMAIL_DOMAINS.contains(&domain));
    }

    #[test]
    fn general_pattern_is_sampled_via_rand_regex() {
        let mut rng = StdRng::seed_from_u64(3);
        let s = generate("[A-Z]{3}-[0-9]{4}", &mut rng);
        assert_eq!(s.len(), 8);
        assert!(s.as_bytes()[3] == b'-');
    }

    #[test]
    fn invalid_pattern_falls_back_to_random_string() {
        let mut rng = StdRng::seed_from_u64(4);
        let s = generate("(unterminated", &mut rng);
        assert_eq!(s.len(), 10);
    }
}
