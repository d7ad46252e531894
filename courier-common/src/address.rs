//! Syntactic recipient address validation
//!
//! The gate at the producer boundary only checks shape, never deliverability:
//!
//! ```text
//! address  = local "@" domain "." tld
//! local    = 1*( ALPHA / DIGIT / "." / "_" / "%" / "+" / "-" )
//! domain   = 1*( ALPHA / DIGIT / "." / "-" )
//! tld      = 2*ALPHA
//! ```
//!
//! No DNS lookups are made, so malformed-but-matching addresses such as
//! `a..b@-x..com` are accepted.

const fn is_local_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'.' | b'_' | b'%' | b'+' | b'-')
}

const fn is_domain_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'.' | b'-')
}

/// Check whether `address` looks like `local@domain.tld`.
///
/// The top-level segment is everything after the last dot and must be at
/// least two ASCII letters of either case.
pub fn is_valid(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };

    if local.is_empty() || !local.bytes().all(is_local_char) {
        return false;
    }

    // The tld cannot contain a dot, so the split always lands on the last one
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };

    !host.is_empty()
        && host.bytes().all(is_domain_char)
        && tld.len() >= 2
        && tld.bytes().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::is_valid;

    #[test]
    fn accepts_common_addresses() {
        for address in [
            "a@b.co",
            "recipient120@gmail.com",
            "first.last+tag@mail.example.org",
            "under_score%relay@sub-domain.example.COM",
            "x@y.Museum",
        ] {
            assert!(is_valid(address), "{address} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for address in [
            "",
            "invalid-email",
            "x@y",
            "@example.com",
            "user@.com",
            "user@example.c",
            "user@example.c0m",
            "user@exa_mple.com",
            "us er@example.com",
            "user@@example.com",
            "user@example.com.",
            "user@example.com\n",
            "usér@example.com",
        ] {
            assert!(!is_valid(address), "{address:?} should be rejected");
        }
    }

    #[test]
    fn accepts_pattern_matching_oddities() {
        assert!(is_valid("a..b@-x..com"));
        assert!(is_valid(".@..io"));
    }
}
