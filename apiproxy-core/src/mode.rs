//! # Operating Mode
//!
//! The proxy serves exactly one entity scope per process: creditors,
//! debtors, or account pairs. The scope is chosen once at startup from the
//! environment and never changes afterwards; it determines which paths are
//! sharded, which are load balanced globally, which carry paginated
//! enumerations, and where reservation requests go.

use std::sync::LazyLock;

use regex::Regex;

static CREDITORS_SHARDED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/creditors/(\d{1,20})/").unwrap());
static CREDITORS_GLOBAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/creditors/\.(wallet|list)$").unwrap());
static CREDITORS_ENUMERATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/creditors/\d{1,20}/enumerate$").unwrap());

static DEBTORS_SHARDED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/debtors/(\d{1,20})/").unwrap());
static DEBTORS_GLOBAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/debtors/\.(debtor|list)$").unwrap());
static DEBTORS_ENUMERATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/debtors/\d{1,20}/enumerate$").unwrap());

static ACCOUNTS_SHARDED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/accounts/(\d{1,20})/(\d{1,20})/").unwrap());

/// Inclusive id interval from which random reservations are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdInterval {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Creditors(IdInterval),
    Debtors(IdInterval),
    Accounts,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Creditors(_) => "creditors",
            Mode::Debtors(_) => "debtors",
            Mode::Accounts => "accounts",
        }
    }

    /// Matches paths that carry entity ids and are routed by sharding key.
    pub fn sharded_re(&self) -> &'static Regex {
        match self {
            Mode::Creditors(_) => &CREDITORS_SHARDED_RE,
            Mode::Debtors(_) => &DEBTORS_SHARDED_RE,
            Mode::Accounts => &ACCOUNTS_SHARDED_RE,
        }
    }

    /// Matches paths that any server can answer; routed to a random shard.
    pub fn global_re(&self) -> Option<&'static Regex> {
        match self {
            Mode::Creditors(_) => Some(&CREDITORS_GLOBAL_RE),
            Mode::Debtors(_) => Some(&DEBTORS_GLOBAL_RE),
            Mode::Accounts => None,
        }
    }

    /// Matches paginated enumeration paths, which the proxy handles itself.
    pub fn enumerate_re(&self) -> Option<&'static Regex> {
        match self {
            Mode::Creditors(_) => Some(&CREDITORS_ENUMERATE_RE),
            Mode::Debtors(_) => Some(&DEBTORS_ENUMERATE_RE),
            Mode::Accounts => None,
        }
    }

    /// Builds the enumeration path for the given unsigned id segment and
    /// configuration-version parameter.
    pub fn enumerate_path(&self, id: u64, v: &str) -> Option<String> {
        match self {
            Mode::Creditors(_) => Some(format!("/creditors/{id}/enumerate?v={v}")),
            Mode::Debtors(_) => Some(format!("/debtors/{id}/enumerate?v={v}")),
            Mode::Accounts => None,
        }
    }

    /// A path guaranteed to match no route, used to break stale
    /// enumeration chains.
    pub fn invalid_path(&self) -> Option<&'static str> {
        match self {
            Mode::Creditors(_) => Some("/creditors/.invalid-path"),
            Mode::Debtors(_) => Some("/debtors/.invalid-path"),
            Mode::Accounts => None,
        }
    }

    /// The proxy-local endpoint accepting random-reservation requests.
    pub fn reserve_path(&self) -> Option<&'static str> {
        match self {
            Mode::Creditors(_) => Some("/creditors/.creditor-reserve"),
            Mode::Debtors(_) => Some("/debtors/.debtor-reserve"),
            Mode::Accounts => None,
        }
    }

    /// The backend path on which a single id is reserved.
    pub fn reserve_target(&self, id: u64) -> Option<String> {
        match self {
            Mode::Creditors(_) => Some(format!("/creditors/{id}/reserve")),
            Mode::Debtors(_) => Some(format!("/debtors/{id}/reserve")),
            Mode::Accounts => None,
        }
    }

    pub fn reservation_type(&self) -> Option<&'static str> {
        match self {
            Mode::Creditors(_) => Some("CreditorReservationRequest"),
            Mode::Debtors(_) => Some("DebtorReservationRequest"),
            Mode::Accounts => None,
        }
    }

    pub fn id_interval(&self) -> Option<IdInterval> {
        match self {
            Mode::Creditors(interval) | Mode::Debtors(interval) => Some(*interval),
            Mode::Accounts => None,
        }
    }
}
