//! Helpers for `address::module::NAME` asset identifiers.

/// The contract address part, used when a source only indexes by address.
pub fn contract_address(identifier: &str) -> &str {
    identifier.split("::").next().unwrap_or(identifier)
}

/// The trailing type name, which is usually the ticker symbol.
pub fn symbol(identifier: &str) -> Option<&str> {
    let mut parts = identifier.split("::");
    let first = parts.next()?;
    let last = parts.last().unwrap_or(first);
    if last.is_empty() {
        None
    } else {
        Some(last)
    }
}

/// Lowercase hex address without leading zeros, so short and long forms of
/// the same address compare equal.
fn normalize_address(address: &str) -> String {
    let lower = address.trim().to_ascii_lowercase();
    match lower.strip_prefix("0x") {
        Some(hex) => {
            let trimmed = hex.trim_start_matches('0');
            format!("0x{}", if trimmed.is_empty() { "0" } else { trimmed })
        }
        None => lower,
    }
}

pub fn canonical(identifier: &str) -> String {
    let identifier = identifier.trim();
    let mut parts = identifier.splitn(2, "::");
    let address = parts.next().unwrap_or_default();
    match parts.next() {
        Some(rest) => format!("{}::{}", normalize_address(address), rest),
        None => normalize_address(address),
    }
}

pub fn same_asset(a: &str, b: &str) -> bool {
    canonical(a) == canonical(b)
}
