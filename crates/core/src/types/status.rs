//! Status and mode enums.

use serde::{Deserialize, Serialize};

/// Which half of the portal the user is working in.
///
/// Persisted locally so the mode survives restarts. Absence means `Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortalMode {
    /// Dashboard, products, inventory, and forecasting screens.
    #[default]
    Admin,
    /// Catalog, cart, and order history screens.
    Customer,
}

impl PortalMode {
    /// The other mode.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Admin => Self::Customer,
            Self::Customer => Self::Admin,
        }
    }
}

impl std::fmt::Display for PortalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for PortalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "customer" => Ok(Self::Customer),
            _ => Err(format!("invalid portal mode: {s}")),
        }
    }
}

/// Stock-out risk bucket assigned by the demand forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No recent sales, so no stock-out date can be projected.
    #[default]
    None,
    /// More than 30 days of stock left.
    Low,
    /// Between 7 and 30 days of stock left.
    Medium,
    /// 7 days of stock or fewer.
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}
