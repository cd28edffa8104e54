//! Address discovery from creation events.

use ethers::types::Address;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chain::{EventName, EventSubscription, HatchChain, Receipt, TxHash};
use crate::errors::{ChainError, DeployError};

use super::DeployStep;

/// Wait for the `event` emitted by the confirmed transaction on `contract` and return its
/// first address field.
///
/// The subscription is always unsubscribed before returning, whatever the outcome. Expiry of
/// `timeout` yields [`DeployError::EventTimeout`]; two matching records in one batch yield
/// [`DeployError::AmbiguousEvent`].
pub async fn resolve_event_address<C>(
    chain: &C,
    contract: Address,
    event: EventName,
    receipt: &Receipt,
    timeout: Duration,
    step: DeployStep,
) -> Result<Address, DeployError>
where
    C: HatchChain + ?Sized,
{
    let tx_hash = receipt.tx_hash;
    let mut subscription = chain
        .subscribe(contract, event, receipt.block_number)
        .await
        .map_err(|e| DeployError::chain(step, e))?;
    debug!(%event, ?contract, ?tx_hash, "subscribed");

    let outcome =
        tokio::time::timeout(timeout, wait_for_match(subscription.as_mut(), tx_hash)).await;

    if let Err(e) = subscription.unsubscribe().await {
        warn!(%event, error = %e, "failed to remove event filter");
    }

    match outcome {
        Err(_) => Err(DeployError::EventTimeout {
            event,
            tx_hash,
            timeout,
        }),
        Ok(Err(MatchError::Chain(e))) => Err(DeployError::chain(step, e)),
        Ok(Err(MatchError::Ambiguous(count))) => Err(DeployError::AmbiguousEvent {
            event,
            tx_hash,
            count,
        }),
        Ok(Ok(address)) => {
            debug!(%event, ?address, "resolved");
            Ok(address)
        }
    }
}

enum MatchError {
    Chain(ChainError),
    Ambiguous(usize),
}

async fn wait_for_match(
    subscription: &mut dyn EventSubscription,
    tx_hash: TxHash,
) -> Result<Address, MatchError> {
    loop {
        let batch = subscription.next_batch().await.map_err(MatchError::Chain)?;
        let matches: Vec<_> = batch
            .iter()
            .filter(|record| record.tx_hash == tx_hash)
            .collect();
        match matches.as_slice() {
            [] => continue,
            [record] => return Ok(record.args.first_address()),
            many => return Err(MatchError::Ambiguous(many.len())),
        }
    }
}
