// iamrestore/src/utils/host.rs
use std::net::Ipv4Addr;

use tracing::{debug, info};

use crate::errors::{AppError, Result};
use crate::utils::command::capture_stdout;

/// Host introspection command listing the machine's addresses.
pub const ADDRESS_LISTING: (&str, &[&str]) = ("hostname", &["-I"]);

/// The configured host, or the first usable address reported by `listing`.
pub async fn resolve_host(configured: Option<&str>, listing: (&str, &[&str])) -> Result<String> {
    match configured {
        Some(host) => Ok(host.to_string()),
        None => discover_local_address(listing).await,
    }
}

/// Runs the address listing command and picks the first usable address.
pub async fn discover_local_address((program, args): (&str, &[&str])) -> Result<String> {
    debug!("No database host configured, running `{} {}`", program, args.join(" "));
    let listing = capture_stdout(program, args).await?;
    let address = pick_address(&listing).ok_or_else(|| {
        AppError::Config(format!(
            "could not find a non-loopback IPv4 address in `{}` output '{}'; set --host",
            program, listing
        ))
    })?;
    info!("Discovered local address {}", address);
    Ok(address.to_string())
}

/// First IPv4 address in a whitespace separated listing that is neither
/// loopback nor unspecified.
pub fn pick_address(listing: &str) -> Option<Ipv4Addr> {
    listing
        .split_whitespace()
        .filter_map(|token| token.parse::<Ipv4Addr>().ok())
        .find(|addr| !addr.is_loopback() && !addr.is_unspecified())
}
