use anyhow::{ensure, Result};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use territory_defense_core::{Direction, TileCoord};

use crate::scenario::{
    AmmunitionPlan, DeploymentPlan, GroupPlan, Scenario, UpgradePlan, WavePlan,
};

const GROUP_NAMES: [&str; 4] = ["amber", "basalt", "cobalt", "dune"];

/// Generates a reproducible scenario on a `side` x `side` map from `seed`.
pub(crate) fn generate(seed: u64, side: u32) -> Result<Scenario> {
    ensure!(
        (2..=16).contains(&side),
        "demo maps need between 2 and 16 tiles per side"
    );
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut coords: Vec<TileCoord> = (0..side)
        .flat_map(|y| (0..side).map(move |x| TileCoord::new(x, y)))
        .collect();
    coords.shuffle(&mut rng);
    let per_group = (coords.len() / 3).clamp(1, 4);
    let group_count = rng.gen_range(2..=GROUP_NAMES.len());
    let groups: Vec<GroupPlan> = GROUP_NAMES
        .iter()
        .take(group_count)
        .zip(coords.chunks(per_group))
        .map(|(name, chunk)| GroupPlan {
            name: (*name).to_owned(),
            tiles: chunk[..rng.gen_range(1..=chunk.len())].to_vec(),
        })
        .collect();

    let ammunition = vec![
        AmmunitionPlan {
            name: "sandbags".to_owned(),
            defense_line: 1,
            max_health: 40,
            cap_per_wall: 3,
        },
        AmmunitionPlan {
            name: "barricade".to_owned(),
            defense_line: 3,
            max_health: 80,
            cap_per_wall: 2,
        },
        AmmunitionPlan {
            name: "shield".to_owned(),
            defense_line: 5,
            max_health: 120,
            cap_per_wall: 1,
        },
    ];

    let mut upgrades = Vec::new();
    let mut deployments = Vec::new();
    for &tile in groups.iter().flat_map(|group| &group.tiles) {
        for direction in Direction::ALL {
            if rng.gen_bool(0.25) {
                upgrades.push(UpgradePlan {
                    tile,
                    direction,
                    times: rng.gen_range(1..=2),
                });
            }
            if let Some(kind) = ammunition.choose(&mut rng).filter(|_| rng.gen_bool(0.4)) {
                deployments.push(DeploymentPlan {
                    tile,
                    direction,
                    ammunition: kind.name.clone(),
                    count: rng.gen_range(1..=kind.cap_per_wall),
                });
            }
        }
    }

    let waves = (0..rng.gen_range(3..=5u64))
        .map(|index| WavePlan {
            power: rng.gen_range(60..=260),
            at_secs: index * 10,
            visible: rng.gen_bool(0.5),
        })
        .collect();

    Ok(Scenario {
        side,
        tile_price: 10,
        groups,
        ammunition,
        upgrades,
        deployments,
        waves,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use territory_defense_core::Timestamp;
    use territory_defense_world::World;

    #[test]
    fn same_seed_same_scenario() {
        let first = generate(42, 5).expect("scenario");
        let second = generate(42, 5).expect("scenario");
        assert_eq!(first, second);
    }

    #[test]
    fn generated_scenarios_seed_cleanly() {
        for seed in 0..20 {
            let scenario = generate(seed, 4).expect("scenario");
            assert!(scenario.groups.len() >= 2);
            assert!(!scenario.waves.is_empty());
            let _ = scenario
                .seed(&World::new(), Timestamp::from_millis(0))
                .unwrap_or_else(|error| panic!("seed {seed}: {error:#}"));
        }
    }

    #[test]
    fn tiny_maps_are_rejected() {
        assert!(generate(1, 1).is_err());
    }
}
