//! Warehouse state snapshot taken before building

use crate::error::DbResult;
use crate::traits::Warehouse;
use futures::future::try_join_all;
use tw_core::{CachedState, Target, WarehouseState};

/// Fetch metadata for every target concurrently.
///
/// Targets that do not exist in the warehouse are left out of the snapshot.
pub async fn fetch_warehouse_state(
    warehouse: &dyn Warehouse,
    targets: &[Target],
    cached_states: Vec<CachedState>,
) -> DbResult<WarehouseState> {
    let tables = try_join_all(targets.iter().map(|target| warehouse.table(target)))
        .await?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    log::debug!(
        "Fetched warehouse state: {} of {} relations exist",
        tables.len(),
        targets.len()
    );

    Ok(WarehouseState {
        tables,
        cached_states,
    })
}
