//! Recover app proxy addresses from the organization's `NewAppProxy` history.

use ethers::types::Address;
use tracing::{debug, info};

use crate::chain::{EventArgs, EventName, EventRecord, HatchChain};
use crate::errors::DeployError;

use super::{AppAddressMap, AppIds, DeployStep, HatchAddresses};

/// Group proxy-creation records by app id, keeping only the known ids.
///
/// Records are taken in log order; the first proxy for an id is scalar, later ones promote
/// the entry to a list.
pub fn group_app_proxies(records: &[EventRecord], ids: &AppIds) -> AppAddressMap {
    let mut ordered: Vec<&EventRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.position());

    let mut map = AppAddressMap::new();
    for record in ordered {
        if let EventArgs::NewAppProxy { proxy, app_id, .. } = &record.args
            && ids.contains(app_id)
        {
            map.record(*app_id, *proxy);
        }
    }
    map
}

/// Project the map onto the six named fields. An id without any proxy is an error.
pub fn project_addresses(
    dao: Address,
    map: &AppAddressMap,
    ids: &AppIds,
) -> Result<HatchAddresses, DeployError> {
    let field = |kind| {
        map.get(&ids.get(kind))
            .cloned()
            .ok_or(DeployError::MissingApp { app: kind, dao })
    };

    use super::AppKind::*;
    Ok(HatchAddresses {
        dao,
        dandelion_voting: field(DandelionVoting)?,
        hatch: field(Hatch)?,
        impact_hours: field(ImpactHours)?,
        redemptions: field(Redemptions)?,
        tollgate: field(Tollgate)?,
        migration_tools: field(MigrationTools)?,
    })
}

/// Query the organization's full proxy history once and build its address record.
pub async fn collect_app_addresses<C>(
    chain: &C,
    dao: Address,
    ids: &AppIds,
) -> Result<HatchAddresses, DeployError>
where
    C: HatchChain + ?Sized,
{
    let records = chain
        .query_events(dao, EventName::NewAppProxy)
        .await
        .map_err(|e| DeployError::chain(DeployStep::Done, e))?;
    debug!(?dao, count = records.len(), "proxy events loaded");

    let map = group_app_proxies(&records, ids);
    let addresses = project_addresses(dao, &map, ids)?;
    info!(?dao, apps = map.len(), "app addresses collected");
    Ok(addresses)
}
