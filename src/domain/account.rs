use serde::{Deserialize, Serialize};

/// Starting balance for an account created lazily on its first
/// balance-affecting operation.
pub const STARTING_BALANCE: i64 = 0;

/// Stable user identifier, owned by the external identity provider.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plan label carried on the account. Informational only to this subsystem;
/// pricing semantics live elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// One row per user. `balance` is the number of credits remaining and is
/// never allowed to go negative; every mutation goes through the ledger
/// store's serialized apply path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub balance: i64,
    pub tier: Tier,
}

impl Account {
    /// Fresh account as created on first use.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: STARTING_BALANCE,
            tier: Tier::Free,
        }
    }
}
