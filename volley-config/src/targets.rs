//! Expansion of operator target arguments into individual hosts.

use std::{
    collections::HashSet,
    fs,
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};

use ipnetwork::IpNetwork;
use thiserror::Error;
use volley_model::Target;

/// Largest number of hosts a single entry may expand to (one /16).
pub const MAX_EXPANSION: u64 = 1 << 16;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target '{entry}': {reason}")]
    Invalid { entry: String, reason: String },
    #[error("target '{entry}' expands to more than {MAX_EXPANSION} hosts")]
    TooLarge { entry: String },
    #[error("failed to read target file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Expands one entry: an IP, a CIDR block, `a.b.c.d-N`, `a.b.c.d-e.f.g.h`, or a hostname.
pub fn expand(entry: &str) -> Result<Vec<Target>, TargetError> {
    let entry = entry.trim();
    let invalid = |reason: &str| TargetError::Invalid {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    if entry.is_empty() {
        return Err(invalid("empty entry"));
    }

    if entry.contains('/') {
        let network: IpNetwork = entry
            .parse()
            .map_err(|err: ipnetwork::IpNetworkError| invalid(&err.to_string()))?;
        return expand_network(entry, network);
    }

    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Ok(vec![Target::from(ip.to_string())]);
    }

    if let Some((start, end)) = entry.split_once('-')
        && let Ok(start) = start.parse::<Ipv4Addr>()
    {
        let end = parse_range_end(start, end).ok_or_else(|| invalid("bad range end"))?;
        return expand_range(entry, start, end);
    }

    if is_hostname(entry) {
        Ok(vec![Target::from(entry)])
    } else {
        Err(invalid("not an address, range, network or hostname"))
    }
}

/// Expands every argument, reading arguments that name a file as one entry per line.
///
/// Duplicates are dropped, keeping the first occurrence.
pub fn resolve<I, S>(args: I) -> Result<Vec<Target>, TargetError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut push_all = |expanded: Vec<Target>| {
        for target in expanded {
            if seen.insert(target.clone()) {
                targets.push(target);
            }
        }
    };

    for arg in args {
        let arg = arg.as_ref();
        let path = Path::new(arg);
        if path.is_file() {
            for entry in read_target_file(path)? {
                push_all(expand(&entry)?);
            }
        } else {
            push_all(expand(arg)?);
        }
    }

    Ok(targets)
}

fn read_target_file(path: &Path) -> Result<Vec<String>, TargetError> {
    let contents = fs::read_to_string(path).map_err(|source| TargetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn expand_network(entry: &str, network: IpNetwork) -> Result<Vec<Target>, TargetError> {
    let host_bits = match network {
        IpNetwork::V4(net) => 32 - u32::from(net.prefix()),
        IpNetwork::V6(net) => 128 - u32::from(net.prefix()),
    };
    if host_bits > MAX_EXPANSION.trailing_zeros() {
        return Err(TargetError::TooLarge {
            entry: entry.to_string(),
        });
    }

    let targets = match network {
        // Network and broadcast addresses are not hosts, except on /31 and /32.
        IpNetwork::V4(net) if net.prefix() < 31 => net
            .iter()
            .filter(|ip| *ip != net.network() && *ip != net.broadcast())
            .map(|ip| Target::from(ip.to_string()))
            .collect(),
        IpNetwork::V4(net) => net.iter().map(|ip| Target::from(ip.to_string())).collect(),
        IpNetwork::V6(net) => net.iter().map(|ip| Target::from(ip.to_string())).collect(),
    };
    Ok(targets)
}

fn parse_range_end(start: Ipv4Addr, end: &str) -> Option<Ipv4Addr> {
    if let Ok(end) = end.parse::<Ipv4Addr>() {
        return Some(end);
    }
    let last: u8 = end.parse().ok()?;
    let [a, b, c, _] = start.octets();
    Some(Ipv4Addr::new(a, b, c, last))
}

fn expand_range(entry: &str, start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<Target>, TargetError> {
    let (first, last) = (u32::from(start), u32::from(end));
    if first > last {
        return Err(TargetError::Invalid {
            entry: entry.to_string(),
            reason: "range end precedes its start".to_string(),
        });
    }
    if u64::from(last - first) + 1 > MAX_EXPANSION {
        return Err(TargetError::TooLarge {
            entry: entry.to_string(),
        });
    }
    Ok((first..=last)
        .map(|raw| Target::from(Ipv4Addr::from(raw).to_string()))
        .collect())
}

fn is_hostname(entry: &str) -> bool {
    entry.len() <= 253
        && entry
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}
