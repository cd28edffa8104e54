//! Application ids and the address map built from proxy-creation events.

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The six applications a hatch deployment installs, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    DandelionVoting,
    Hatch,
    ImpactHours,
    Redemptions,
    Tollgate,
    MigrationTools,
}

impl AppKind {
    pub const ALL: [AppKind; 6] = [
        AppKind::DandelionVoting,
        AppKind::Hatch,
        AppKind::ImpactHours,
        AppKind::Redemptions,
        AppKind::Tollgate,
        AppKind::MigrationTools,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppKind::DandelionVoting => "dandelion_voting",
            AppKind::Hatch => "hatch",
            AppKind::ImpactHours => "impact_hours",
            AppKind::Redemptions => "redemptions",
            AppKind::Tollgate => "tollgate",
            AppKind::MigrationTools => "migration_tools",
        }
    }

    /// Name of the template accessor returning this app's id.
    pub fn accessor(self) -> &'static str {
        match self {
            AppKind::DandelionVoting => "dandelionVotingAppId",
            AppKind::Hatch => "hatchAppId",
            AppKind::ImpactHours => "impactHoursAppId",
            AppKind::Redemptions => "redemptionsAppId",
            AppKind::Tollgate => "tollgateAppId",
            AppKind::MigrationTools => "migrationToolsAppId",
        }
    }
}

impl std::fmt::Display for AppKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque 32-byte app id as registered in the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub H256);

impl From<[u8; 32]> for AppId {
    fn from(bytes: [u8; 32]) -> Self {
        AppId(H256::from(bytes))
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// The six known app ids, read once from the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIds {
    pub dandelion_voting: AppId,
    pub hatch: AppId,
    pub impact_hours: AppId,
    pub redemptions: AppId,
    pub tollgate: AppId,
    pub migration_tools: AppId,
}

impl AppIds {
    pub fn get(&self, kind: AppKind) -> AppId {
        match kind {
            AppKind::DandelionVoting => self.dandelion_voting,
            AppKind::Hatch => self.hatch,
            AppKind::ImpactHours => self.impact_hours,
            AppKind::Redemptions => self.redemptions,
            AppKind::Tollgate => self.tollgate,
            AppKind::MigrationTools => self.migration_tools,
        }
    }

    /// `(kind, id)` pairs in declared order.
    pub fn ordered(&self) -> [(AppKind, AppId); 6] {
        AppKind::ALL.map(|kind| (kind, self.get(kind)))
    }

    pub fn contains(&self, id: &AppId) -> bool {
        AppKind::ALL.iter().any(|kind| self.get(*kind) == *id)
    }
}

/// Proxy address(es) created for one app id.
///
/// A single proxy stays scalar; a second proxy for the same id promotes the entry to a list
/// in event-log order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppAddress {
    Single(Address),
    Many(Vec<Address>),
}

impl AppAddress {
    pub fn push(&mut self, address: Address) {
        match self {
            AppAddress::Single(first) => *self = AppAddress::Many(vec![*first, address]),
            AppAddress::Many(list) => list.push(address),
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        match self {
            AppAddress::Single(address) => vec![*address],
            AppAddress::Many(list) => list.clone(),
        }
    }
}

impl std::fmt::Display for AppAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppAddress::Single(address) => write!(f, "{:?}", address),
            AppAddress::Many(list) => {
                let parts: Vec<String> = list.iter().map(|a| format!("{:?}", a)).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// App id → created proxies, built once by the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppAddressMap {
    entries: HashMap<AppId, AppAddress>,
}

impl AppAddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one proxy for `id`, keeping first-seen-scalar semantics.
    pub fn record(&mut self, id: AppId, proxy: Address) {
        match self.entries.get_mut(&id) {
            Some(entry) => entry.push(proxy),
            None => {
                self.entries.insert(id, AppAddress::Single(proxy));
            }
        }
    }

    pub fn get(&self, id: &AppId) -> Option<&AppAddress> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Final output of a deployment: the organization plus its six apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatchAddresses {
    pub dao: Address,
    pub dandelion_voting: AppAddress,
    pub hatch: AppAddress,
    pub impact_hours: AppAddress,
    pub redemptions: AppAddress,
    pub tollgate: AppAddress,
    pub migration_tools: AppAddress,
}

impl HatchAddresses {
    pub fn get(&self, kind: AppKind) -> &AppAddress {
        match kind {
            AppKind::DandelionVoting => &self.dandelion_voting,
            AppKind::Hatch => &self.hatch,
            AppKind::ImpactHours => &self.impact_hours,
            AppKind::Redemptions => &self.redemptions,
            AppKind::Tollgate => &self.tollgate,
            AppKind::MigrationTools => &self.migration_tools,
        }
    }

    /// Every address in the record, organization first.
    pub fn all_addresses(&self) -> Vec<Address> {
        let mut all = vec![self.dao];
        for kind in AppKind::ALL {
            all.extend(self.get(kind).addresses());
        }
        all
    }
}
