use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use territory_defense_core::{Direction, GroupId, MapId, TileCoord, Timestamp, WallId};
use territory_defense_world::{query, NewAmmunitionType, World};

/// Map layout, fortifications and attack plan replayed by the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    pub(crate) side: u32,
    #[serde(default = "default_price")]
    pub(crate) tile_price: u32,
    #[serde(default)]
    pub(crate) groups: Vec<GroupPlan>,
    #[serde(default)]
    pub(crate) ammunition: Vec<AmmunitionPlan>,
    #[serde(default)]
    pub(crate) upgrades: Vec<UpgradePlan>,
    #[serde(default)]
    pub(crate) deployments: Vec<DeploymentPlan>,
    #[serde(default)]
    pub(crate) waves: Vec<WavePlan>,
}

/// Group and the tiles it buys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GroupPlan {
    pub(crate) name: String,
    pub(crate) tiles: Vec<TileCoord>,
}

/// Ammunition type added to the catalogue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AmmunitionPlan {
    pub(crate) name: String,
    pub(crate) defense_line: u32,
    pub(crate) max_health: u32,
    pub(crate) cap_per_wall: u32,
}

/// Tier upgrades applied to one wall.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UpgradePlan {
    pub(crate) tile: TileCoord,
    pub(crate) direction: Direction,
    #[serde(default = "one")]
    pub(crate) times: u32,
}

/// Ammunition instances placed on one wall.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DeploymentPlan {
    pub(crate) tile: TileCoord,
    pub(crate) direction: Direction,
    pub(crate) ammunition: String,
    #[serde(default = "one")]
    pub(crate) count: u32,
}

/// Wave fired `at_secs` after the scenario starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WavePlan {
    pub(crate) power: u32,
    pub(crate) at_secs: u64,
    #[serde(default = "visible")]
    pub(crate) visible: bool,
}

fn default_price() -> u32 {
    10
}

fn one() -> u32 {
    1
}

fn visible() -> bool {
    true
}

impl Scenario {
    /// Reads a scenario from a TOML file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Builds the scenario inside `world` with waves timed from `start`, and
    /// returns the new active map.
    pub(crate) fn seed(&self, world: &World, start: Timestamp) -> Result<MapId> {
        let map = world.create_map(self.side).context("creating the map")?;
        let _ = world
            .fill_tiles(map, self.tile_price)
            .context("creating tiles")?;
        world.activate_map(map).context("activating the map")?;

        for plan in &self.groups {
            let group = world
                .create_group(&plan.name)
                .with_context(|| format!("creating group {}", plan.name))?;
            for &coord in &plan.tiles {
                let _ = world
                    .purchase_tile(map, coord, group)
                    .with_context(|| format!("group {} buying tile {coord}", plan.name))?;
            }
        }

        let mut catalogue = HashMap::new();
        for plan in &self.ammunition {
            let kind = world
                .register_ammunition_type(NewAmmunitionType::new(
                    &plan.name,
                    plan.defense_line,
                    plan.max_health,
                    plan.cap_per_wall,
                ))
                .with_context(|| format!("registering ammunition {}", plan.name))?;
            let _ = catalogue.insert(plan.name.as_str(), kind);
        }

        for plan in &self.upgrades {
            let (wall, owner) = owned_wall(world, map, plan.tile, plan.direction)?;
            for _ in 0..plan.times {
                let _ = world.upgrade_wall(wall, owner).with_context(|| {
                    format!("upgrading the {} wall of {}", plan.direction, plan.tile)
                })?;
            }
        }

        for plan in &self.deployments {
            let kind = *catalogue
                .get(plan.ammunition.as_str())
                .ok_or_else(|| anyhow!("unknown ammunition {:?}", plan.ammunition))?;
            let (wall, owner) = owned_wall(world, map, plan.tile, plan.direction)?;
            for _ in 0..plan.count {
                let _ = world.deploy_ammunition(wall, kind, owner).with_context(|| {
                    format!(
                        "deploying {} on the {} wall of {}",
                        plan.ammunition, plan.direction, plan.tile
                    )
                })?;
            }
        }

        for plan in &self.waves {
            let attack_time = start.saturating_add(Duration::from_secs(plan.at_secs));
            let _ = world
                .schedule_wave(map, plan.power, attack_time, plan.visible)
                .with_context(|| format!("scheduling a wave of power {}", plan.power))?;
        }

        info!(
            "seeded map {map}: {} groups, {} waves",
            self.groups.len(),
            self.waves.len()
        );
        Ok(map)
    }
}

fn owned_wall(
    world: &World,
    map: MapId,
    coord: TileCoord,
    direction: Direction,
) -> Result<(WallId, GroupId)> {
    let tile = query::tile_at(world, map, coord)?;
    let owner = tile
        .owner
        .ok_or_else(|| anyhow!("tile {coord} has no owner to fortify it"))?;
    let wall = query::wall_facing(world, tile.id, direction)?
        .ok_or_else(|| anyhow!("tile {coord} has no {direction} wall"))?;
    Ok((wall.id, owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use territory_defense_core::{CombatStore, WallTier};

    const SAMPLE: &str = r#"
side = 3

[[groups]]
name = "keepers"
tiles = [{ x = 0, y = 0 }, { x = 1, y = 0 }]

[[ammunition]]
name = "sandbags"
defense_line = 2
max_health = 40
cap_per_wall = 2

[[upgrades]]
tile = { x = 1, y = 0 }
direction = "north"

[[deployments]]
tile = { x = 0, y = 0 }
direction = "west"
ammunition = "sandbags"
count = 2

[[waves]]
power = 50
at_secs = 5

[[waves]]
power = 120
at_secs = 15
visible = false
"#;

    #[test]
    fn sample_scenario_seeds_the_world() {
        let scenario: Scenario = toml::from_str(SAMPLE).expect("parse");
        let world = World::new();

        let map = scenario
            .seed(&world, Timestamp::from_millis(1_000))
            .expect("seed");

        assert!(world.load_map(map).expect("map").active);
        let corner = query::tile_at(&world, map, TileCoord::new(0, 0)).expect("tile");
        assert!(corner.owner.is_some());
        let west = query::wall_facing(&world, corner.id, Direction::West)
            .expect("walls")
            .expect("west wall");
        assert_eq!(query::ammunition_on(&world, west.id).expect("ammo").len(), 2);
        let edge = query::tile_at(&world, map, TileCoord::new(1, 0)).expect("tile");
        let north = query::wall_facing(&world, edge.id, Direction::North)
            .expect("walls")
            .expect("north wall");
        assert_eq!(north.tier, WallTier::Tier2);
        let waves = query::waves(&world, map).expect("waves");
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].attack_time, Timestamp::from_millis(6_000));
        assert!(!waves[1].power_visible);
    }

    #[test]
    fn fortifying_an_unowned_tile_is_rejected() {
        let mut scenario: Scenario = toml::from_str(SAMPLE).expect("parse");
        scenario.deployments[0].tile = TileCoord::new(2, 2);

        let error = scenario
            .seed(&World::new(), Timestamp::from_millis(0))
            .expect_err("unowned tile");

        assert!(error.to_string().contains("no owner"), "{error:#}");
    }

    #[test]
    fn deployments_beyond_the_cap_are_rejected() {
        let mut scenario: Scenario = toml::from_str(SAMPLE).expect("parse");
        scenario.deployments[0].count = 3;

        let error = scenario
            .seed(&World::new(), Timestamp::from_millis(0))
            .expect_err("cap");

        assert!(format!("{error:#}").contains("already carries 2"), "{error:#}");
    }
}
