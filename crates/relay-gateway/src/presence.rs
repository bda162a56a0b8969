use tracing::debug;

use relay_types::ServerEvent;

use crate::error::GatewayError;
use crate::registry::Registry;
use crate::router;
use crate::store::Store;

/// Current roster frame: every registered user, online or not.
pub async fn roster(store: &Store) -> Result<ServerEvent, GatewayError> {
    let users = store.list_users().await?;
    Ok(ServerEvent::UserList { users })
}

/// Send the roster to every registered connection. Best effort: a closed
/// connection is skipped and nothing is retried.
pub async fn broadcast_roster(store: &Store, registry: &Registry) -> Result<usize, GatewayError> {
    let event = roster(store).await?;
    let targets: Vec<_> = registry
        .snapshot()
        .await
        .into_iter()
        .map(|s| s.handle)
        .collect();

    let delivered = router::fan_out(&targets, &event);
    debug!("Roster broadcast to {}/{} connections", delivered, targets.len());
    Ok(delivered)
}
