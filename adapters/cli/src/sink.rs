use log::{debug, info};
use territory_defense_core::{Notification, NotificationSink, NotifyError};

/// Sink that reports notifications through the logger.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::MapStateChanged { map, snapshot } => {
                let destroyed = snapshot.tiles.iter().filter(|tile| tile.destroyed).count();
                debug!(
                    "map {map} changed: {} tiles, {destroyed} destroyed",
                    snapshot.tiles.len()
                );
            }
            Notification::TileDestroyed { map, tile, coord } => {
                info!("map {map}: tile {tile} at {coord} destroyed");
            }
            Notification::GroupEliminated { map, group, name } => {
                info!("map {map}: group {group} ({name}) eliminated");
            }
            Notification::MapLockChanged { map, locked } => {
                let state = if locked { "locked" } else { "unlocked" };
                info!("map {map} {state}");
            }
        }
        Ok(())
    }
}
