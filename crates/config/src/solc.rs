//! Solidity compiler versions and `pragma solidity` constraints
//!
//! Used to check that configured compilers are real solc releases and to pick
//! the compiler a source file will be built with.

use std::cmp::Ordering;
use std::fmt;

/// Latest patch release for every solc minor line, indexed by minor version
const RELEASES: &[(u32, u32)] = &[(4, 26), (5, 17), (6, 12), (7, 6), (8, 30)];

/// A `major.minor.patch` solc version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolcVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SolcVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a full three-component version such as `0.8.9`
    pub fn parse(s: &str) -> Option<Self> {
        match parse_partial(s)? {
            (v, 3) => Some(v),
            _ => None,
        }
    }

    /// Whether this version names a published solc release
    pub fn is_known_release(&self) -> bool {
        self.major == 0
            && RELEASES
                .iter()
                .any(|&(minor, last_patch)| minor == self.minor && self.patch <= last_patch)
    }
}

impl Ord for SolcVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for SolcVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SolcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse one to three dot-separated numeric components.
///
/// Missing components are zero; the second value is how many were given.
fn parse_partial(s: &str) -> Option<(SolcVersion, usize)> {
    let parts: Vec<&str> = s.trim().split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut nums = [0u32; 3];
    for (slot, part) in nums.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }

    Some((SolcVersion::new(nums[0], nums[1], nums[2]), parts.len()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bound {
    op: Op,
    version: SolcVersion,
}

impl Bound {
    fn matches(&self, v: &SolcVersion) -> bool {
        match self.op {
            Op::Eq => v == &self.version,
            Op::Gt => v > &self.version,
            Op::Ge => v >= &self.version,
            Op::Lt => v < &self.version,
            Op::Le => v <= &self.version,
        }
    }
}

/// A parsed `pragma solidity` constraint
///
/// Alternatives joined by `||`, each a conjunction of bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReq {
    alternatives: Vec<Vec<Bound>>,
}

impl VersionReq {
    /// Parse a constraint such as `^0.8.0`, `>=0.5.0 <0.7.0` or a full
    /// `pragma solidity ...;` line.
    pub fn parse(input: &str) -> Result<Self, String> {
        let body = input
            .trim()
            .trim_end_matches(';')
            .trim_start_matches("pragma")
            .trim_start()
            .trim_start_matches("solidity")
            .trim();

        if body.is_empty() {
            return Err("empty version constraint".to_string());
        }

        let alternatives = body
            .split("||")
            .map(parse_conjunction)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { alternatives })
    }

    pub fn matches(&self, v: &SolcVersion) -> bool {
        self.alternatives
            .iter()
            .any(|bounds| bounds.iter().all(|b| b.matches(v)))
    }
}

fn parse_conjunction(part: &str) -> Result<Vec<Bound>, String> {
    // Glue detached operators onto their version: ">= 0.8.0" -> ">=0.8.0"
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for tok in part.split_whitespace() {
        if matches!(tok, "=" | ">" | ">=" | "<" | "<=" | "^" | "~") {
            pending_op = Some(tok);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{}{}", op, tok)),
            None => tokens.push(tok.to_string()),
        }
    }
    if let Some(op) = pending_op {
        return Err(format!("operator '{}' without a version", op));
    }
    if tokens.is_empty() {
        return Err("empty alternative in version constraint".to_string());
    }

    // Hyphen range: "a - b"
    if tokens.len() == 3 && tokens[1] == "-" {
        let (low, _) = parse_partial(&tokens[0])
            .ok_or_else(|| format!("invalid version '{}'", tokens[0]))?;
        let (high, _) = parse_partial(&tokens[2])
            .ok_or_else(|| format!("invalid version '{}'", tokens[2]))?;
        return Ok(vec![
            Bound {
                op: Op::Ge,
                version: low,
            },
            Bound {
                op: Op::Le,
                version: high,
            },
        ]);
    }

    let mut bounds = Vec::new();
    for tok in &tokens {
        bounds.extend(parse_comparator(tok)?);
    }
    Ok(bounds)
}

fn parse_comparator(tok: &str) -> Result<Vec<Bound>, String> {
    let (op, rest) = [">=", "<=", ">", "<", "=", "^", "~"]
        .iter()
        .find_map(|op| tok.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", tok));

    let (v, given) = parse_partial(rest).ok_or_else(|| format!("invalid version '{}'", rest))?;
    let bound = |op, version| Bound { op, version };

    let bounds = match op {
        ">=" => vec![bound(Op::Ge, v)],
        "<=" => vec![bound(Op::Le, v)],
        ">" => vec![bound(Op::Gt, v)],
        "<" => vec![bound(Op::Lt, v)],
        "^" => vec![bound(Op::Ge, v), bound(Op::Lt, caret_upper(v, given)?)],
        "~" => vec![bound(Op::Ge, v), bound(Op::Lt, tilde_upper(v, given)?)],
        _ if given == 3 => vec![bound(Op::Eq, v)],
        // Partial bare or `=` version: any release on that line
        _ => vec![bound(Op::Ge, v), bound(Op::Lt, tilde_upper(v, given)?)],
    };
    Ok(bounds)
}

fn bump(component: u32, v: SolcVersion) -> Result<u32, String> {
    component
        .checked_add(1)
        .ok_or_else(|| format!("version component too large in '{}'", v))
}

fn caret_upper(v: SolcVersion, given: usize) -> Result<SolcVersion, String> {
    if v.major > 0 || given == 1 {
        Ok(SolcVersion::new(bump(v.major, v)?, 0, 0))
    } else if v.minor > 0 || given == 2 {
        Ok(SolcVersion::new(0, bump(v.minor, v)?, 0))
    } else {
        Ok(SolcVersion::new(0, 0, bump(v.patch, v)?))
    }
}

fn tilde_upper(v: SolcVersion, given: usize) -> Result<SolcVersion, String> {
    if given == 1 {
        Ok(SolcVersion::new(bump(v.major, v)?, 0, 0))
    } else {
        Ok(SolcVersion::new(v.major, bump(v.minor, v)?, 0))
    }
}
