//! Canonical sign-in challenge messages.
//!
//! Layout (EIP-4361 subset, `\n` separated, no trailing newline):
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! Expiration Time: {expiration_time}
//! ```
//!
//! The statement line and the blank line after it are omitted when there is no
//! statement, and `Expiration Time` is omitted when unset. Addresses are EIP-55
//! checksummed and timestamps are RFC 3339 UTC with milliseconds (`...T12:00:00.000Z`).
//! A message that parses but does not rebuild to the same bytes is not canonical.

use alloy_primitives::Address;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use std::time::Duration;

/// The only message version this service speaks.
pub const MESSAGE_VERSION: &str = "1";

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const URI_TAG: &str = "URI: ";
const VERSION_TAG: &str = "Version: ";
const CHAIN_ID_TAG: &str = "Chain ID: ";
const NONCE_TAG: &str = "Nonce: ";
const ISSUED_AT_TAG: &str = "Issued At: ";
const EXPIRATION_TIME_TAG: &str = "Expiration Time: ";

/// Fields of a sign-in challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    pub domain: String,
    /// Unknown when the server hands out a challenge, required when verifying.
    pub address: Option<Address>,
    pub statement: Option<String>,
    pub uri: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
}

/// What an inbound message must agree with. Comes from server state, never the request.
#[derive(Debug, Clone)]
pub struct ExpectedFields<'a> {
    pub domain: &'a str,
    pub chain_id: u64,
    pub nonce: &'a str,
    pub max_clock_skew: Duration,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Domain mismatch: expected {expected}, found {found}")]
    DomainMismatch { expected: String, found: String },

    #[error("Chain ID mismatch: expected {expected}, found {found}")]
    ChainIdMismatch { expected: u64, found: u64 },

    #[error("Nonce mismatch")]
    NonceMismatch,

    #[error("Message address does not match the claimed address")]
    AddressMismatch,

    #[error("Issued At {issued_at} is outside the allowed clock skew around {now}")]
    IssuedAtOutOfRange {
        issued_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Message expired at {expiration_time} (now {now})")]
    Expired {
        expiration_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Message is not in canonical form")]
    NotCanonical,
}

/// Render a timestamp the way it appears in messages.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drop precision a message cannot carry, so values survive a build/parse round trip.
pub fn canonical_timestamp(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(3)
}

/// Serialize the challenge into its canonical text.
pub fn build_challenge(message: &ChallengeMessage) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(12);

    lines.push(format!("{}{}", message.domain, HEADER_SUFFIX));
    lines.push(
        message
            .address
            .map(|a| a.to_checksum(None))
            .unwrap_or_default(),
    );
    lines.push(String::new());
    if let Some(statement) = &message.statement {
        lines.push(statement.clone());
    }
    lines.push(String::new());
    lines.push(format!("{}{}", URI_TAG, message.uri));
    lines.push(format!("{}{}", VERSION_TAG, MESSAGE_VERSION));
    lines.push(format!("{}{}", CHAIN_ID_TAG, message.chain_id));
    lines.push(format!("{}{}", NONCE_TAG, message.nonce));
    lines.push(format!(
        "{}{}",
        ISSUED_AT_TAG,
        format_timestamp(&message.issued_at)
    ));
    if let Some(expiration_time) = &message.expiration_time {
        lines.push(format!(
            "{}{}",
            EXPIRATION_TIME_TAG,
            format_timestamp(expiration_time)
        ));
    }

    lines.join("\n")
}

/// Pull the nonce out of a raw message without validating anything else.
///
/// The nonce is read by position, from the line right before `Issued At` at the
/// end of the message, so a statement line can never stand in for it.
pub fn extract_nonce(raw: &str) -> Option<&str> {
    let mut lines = raw.split('\n').rev();
    let mut line = lines.next()?;
    if line.starts_with(EXPIRATION_TIME_TAG) {
        line = lines.next()?;
    }
    if !line.starts_with(ISSUED_AT_TAG) {
        return None;
    }
    lines
        .next()?
        .strip_prefix(NONCE_TAG)
        .filter(|nonce| !nonce.is_empty())
}

/// Parse a raw message and check it against the expected fields.
///
/// Checks run in a fixed order (syntax, domain, chain id, nonce, issued-at, expiration)
/// and the first failure is returned. A returned message always carries an address.
pub fn parse_and_validate(
    raw: &str,
    expected: &ExpectedFields<'_>,
) -> Result<ChallengeMessage, MessageError> {
    let message = parse(raw)?;

    if message.domain != expected.domain {
        return Err(MessageError::DomainMismatch {
            expected: expected.domain.to_string(),
            found: message.domain,
        });
    }

    if message.chain_id != expected.chain_id {
        return Err(MessageError::ChainIdMismatch {
            expected: expected.chain_id,
            found: message.chain_id,
        });
    }

    if message.nonce != expected.nonce {
        return Err(MessageError::NonceMismatch);
    }

    let skew = chrono::Duration::from_std(expected.max_clock_skew)
        .unwrap_or(chrono::Duration::MAX);
    let drift = message.issued_at.signed_duration_since(expected.now);
    if drift > skew || drift < -skew {
        return Err(MessageError::IssuedAtOutOfRange {
            issued_at: message.issued_at,
            now: expected.now,
        });
    }

    if let Some(expiration_time) = message.expiration_time {
        if expected.now > expiration_time {
            return Err(MessageError::Expired {
                expiration_time,
                now: expected.now,
            });
        }
    }

    Ok(message)
}

fn parse(raw: &str) -> Result<ChallengeMessage, MessageError> {
    if raw.contains('\r') {
        return Err(malformed("carriage returns are not allowed"));
    }

    let mut lines = raw.split('\n');

    let header = lines.next().unwrap_or_default();
    let domain = header
        .strip_suffix(HEADER_SUFFIX)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| malformed("missing sign-in header"))?;

    let address = parse_address(lines.next().unwrap_or_default())?;

    expect_blank(lines.next(), "address")?;
    let statement = match lines.next() {
        Some("") => None,
        Some(statement) => {
            expect_blank(lines.next(), "statement")?;
            Some(statement.to_string())
        }
        None => return Err(malformed("message ends after address")),
    };

    let uri = tagged(lines.next(), URI_TAG)?;
    if uri.is_empty() {
        return Err(malformed("empty URI"));
    }

    let version = tagged(lines.next(), VERSION_TAG)?;
    if version != MESSAGE_VERSION {
        return Err(malformed(&format!("unsupported version {:?}", version)));
    }

    let chain_id = tagged(lines.next(), CHAIN_ID_TAG)?
        .parse::<u64>()
        .map_err(|e| malformed(&format!("invalid chain id: {}", e)))?;

    let nonce = tagged(lines.next(), NONCE_TAG)?;
    if nonce.len() < 8 || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed("nonce must be at least 8 alphanumeric characters"));
    }

    let issued_at = parse_timestamp(tagged(lines.next(), ISSUED_AT_TAG)?, "Issued At")?;

    let expiration_time = match lines.next() {
        None => None,
        Some(line) => Some(parse_timestamp(
            tagged(Some(line), EXPIRATION_TIME_TAG)?,
            "Expiration Time",
        )?),
    };

    if lines.next().is_some() {
        return Err(malformed("unexpected content after last field"));
    }

    Ok(ChallengeMessage {
        domain: domain.to_string(),
        address: Some(address),
        statement,
        uri: uri.to_string(),
        chain_id,
        nonce: nonce.to_string(),
        issued_at,
        expiration_time,
    })
}

fn parse_address(line: &str) -> Result<Address, MessageError> {
    let hex_part = line
        .strip_prefix("0x")
        .ok_or_else(|| malformed("address must start with 0x"))?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed("address must be 40 hex characters"));
    }
    line.parse::<Address>()
        .map_err(|e| malformed(&format!("invalid address: {}", e)))
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>, MessageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| malformed(&format!("invalid {}: {}", field, e)))
}

fn tagged<'a>(line: Option<&'a str>, tag: &str) -> Result<&'a str, MessageError> {
    line.and_then(|l| l.strip_prefix(tag))
        .ok_or_else(|| malformed(&format!("expected {:?} line", tag.trim_end())))
}

fn expect_blank(line: Option<&str>, after: &str) -> Result<(), MessageError> {
    match line {
        Some("") => Ok(()),
        _ => Err(malformed(&format!("expected blank line after {}", after))),
    }
}

fn malformed(reason: &str) -> MessageError {
    MessageError::Malformed(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sample() -> ChallengeMessage {
        ChallengeMessage {
            domain: "example.com".to_string(),
            address: Some(ADDRESS.parse().unwrap()),
            statement: Some("Sign in with Ethereum.".to_string()),
            uri: "https://example.com".to_string(),
            chain_id: 11_155_111,
            nonce: "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6".to_string(),
            issued_at: t0(),
            expiration_time: None,
        }
    }

    fn expected(now: DateTime<Utc>) -> ExpectedFields<'static> {
        ExpectedFields {
            domain: "example.com",
            chain_id: 11_155_111,
            nonce: "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6",
            max_clock_skew: Duration::from_secs(60),
            now,
        }
    }

    #[test]
    fn test_build_layout() {
        let text = build_challenge(&sample());
        assert_eq!(
            text,
            "example.com wants you to sign in with your Ethereum account:\n\
             0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266\n\
             \n\
             Sign in with Ethereum.\n\
             \n\
             URI: https://example.com\n\
             Version: 1\n\
             Chain ID: 11155111\n\
             Nonce: a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6\n\
             Issued At: 2024-05-01T12:00:00.000Z"
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(build_challenge(&sample()), build_challenge(&sample()));
    }

    #[test]
    fn test_build_checksums_address() {
        let mut message = sample();
        message.address = Some(ADDRESS.to_lowercase().parse().unwrap());
        assert!(build_challenge(&message).contains(ADDRESS));
    }

    #[test]
    fn test_round_trip_with_statement() {
        let message = sample();
        let parsed = parse_and_validate(&build_challenge(&message), &expected(t0())).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_round_trip_without_statement_with_expiration() {
        let mut message = sample();
        message.statement = None;
        message.expiration_time = Some(t0() + chrono::Duration::minutes(5));
        message.issued_at = canonical_timestamp(t0() + chrono::Duration::nanoseconds(1_234_567));

        let text = build_challenge(&message);
        assert!(text.contains(&format!("{}\n\n\nURI: ", ADDRESS)));
        assert!(text.ends_with("Expiration Time: 2024-05-01T12:05:00.000Z"));

        let parsed = parse_and_validate(&text, &expected(t0())).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_build_without_address_leaves_line_empty() {
        let mut message = sample();
        message.address = None;
        let text = build_challenge(&message);
        assert!(text.starts_with(
            "example.com wants you to sign in with your Ethereum account:\n\n\nSign in"
        ));
        assert!(matches!(
            parse_and_validate(&text, &expected(t0())),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn test_domain_mismatch() {
        let mut message = sample();
        message.domain = "evil.example".to_string();
        let err = parse_and_validate(&build_challenge(&message), &expected(t0())).unwrap_err();
        assert_eq!(
            err,
            MessageError::DomainMismatch {
                expected: "example.com".to_string(),
                found: "evil.example".to_string(),
            }
        );
    }

    #[test]
    fn test_chain_id_mismatch() {
        let mut message = sample();
        message.chain_id = 1;
        let err = parse_and_validate(&build_challenge(&message), &expected(t0())).unwrap_err();
        assert_eq!(
            err,
            MessageError::ChainIdMismatch {
                expected: 11_155_111,
                found: 1,
            }
        );
    }

    #[test]
    fn test_nonce_mismatch() {
        let mut message = sample();
        message.nonce = "ffffffffffffffffffffffffffffffff".to_string();
        let err = parse_and_validate(&build_challenge(&message), &expected(t0())).unwrap_err();
        assert_eq!(err, MessageError::NonceMismatch);
    }

    #[test]
    fn test_clock_skew_boundaries() {
        let now = t0();
        let skew = chrono::Duration::seconds(60);
        let one = chrono::Duration::seconds(1);

        let mut message = sample();

        message.issued_at = now - skew - one;
        let err = parse_and_validate(&build_challenge(&message), &expected(now)).unwrap_err();
        assert!(matches!(err, MessageError::IssuedAtOutOfRange { .. }));

        message.issued_at = now - skew + one;
        assert!(parse_and_validate(&build_challenge(&message), &expected(now)).is_ok());

        message.issued_at = now + skew;
        assert!(parse_and_validate(&build_challenge(&message), &expected(now)).is_ok());

        message.issued_at = now + skew + one;
        let err = parse_and_validate(&build_challenge(&message), &expected(now)).unwrap_err();
        assert!(matches!(err, MessageError::IssuedAtOutOfRange { .. }));
    }

    #[test]
    fn test_expiration() {
        let now = t0();
        let mut message = sample();

        message.expiration_time = Some(now);
        assert!(parse_and_validate(&build_challenge(&message), &expected(now)).is_ok());

        message.expiration_time = Some(now - chrono::Duration::milliseconds(1));
        let err = parse_and_validate(&build_challenge(&message), &expected(now)).unwrap_err();
        assert!(matches!(err, MessageError::Expired { .. }));
    }

    #[test]
    fn test_malformed_inputs() {
        let good = build_challenge(&sample());
        let cases = [
            String::new(),
            "hello".to_string(),
            good.replace("Version: 1", "Version: 2"),
            good.replace(ADDRESS, "0x1234"),
            good.replace(ADDRESS, &ADDRESS[2..]),
            good.replace("Chain ID: 11155111", "Chain ID: sepolia"),
            good.replace("Issued At: 2024-05-01T12:00:00.000Z", "Issued At: yesterday"),
            good.replace("Nonce: a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6", "Nonce: short"),
            good.replace('\n', "\r\n"),
            format!("{}\nRequest ID: 42", good),
            format!("{}\n", good),
        ];
        for raw in cases {
            assert!(
                matches!(
                    parse_and_validate(&raw, &expected(t0())),
                    Err(MessageError::Malformed(_))
                ),
                "expected Malformed for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_extract_nonce() {
        let text = build_challenge(&sample());
        assert_eq!(extract_nonce(&text), Some("a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6"));
        assert_eq!(extract_nonce("no nonce here"), None);
        assert_eq!(extract_nonce("Nonce: "), None);

        let mut expiring = sample();
        expiring.expiration_time = Some(t0() + chrono::Duration::seconds(300));
        let text = build_challenge(&expiring);
        assert_eq!(extract_nonce(&text), Some("a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6"));
    }

    #[test]
    fn test_extract_nonce_ignores_statement() {
        let mut spoofed = sample();
        spoofed.statement = Some("Nonce: ffffffffffffffffffffffffffffffff".to_string());
        let text = build_challenge(&spoofed);
        assert_eq!(extract_nonce(&text), Some("a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6"));

        // Trailing junk after the fields means there is no nonce to read
        let trailing = format!("{}\nNonce: ffffffffffffffffffffffffffffffff", text);
        assert_eq!(extract_nonce(&trailing), None);
    }

    #[test]
    fn test_non_canonical_timestamp_parses_but_does_not_rebuild() {
        let good = build_challenge(&sample());
        let loose = good.replace("2024-05-01T12:00:00.000Z", "2024-05-01T14:00:00+02:00");

        let parsed = parse_and_validate(&loose, &expected(t0())).unwrap();
        assert_eq!(parsed.issued_at, t0());
        assert_ne!(build_challenge(&parsed), loose);
        assert_eq!(build_challenge(&parsed), good);
    }
}
