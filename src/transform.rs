//! Material transformation under blast.
//!
//! ## Lookup precedence
//!
//! | Step | Rule                                   | Example                          |
//! |------|----------------------------------------|----------------------------------|
//! | 0    | blacklisted / air pass through         | `BEDROCK` → `BEDROCK`            |
//! | 1    | high-power override (non-exempt)       | `DIRT` @ 0.9 → `OBSIDIAN`        |
//! | 2    | exact table                            | `GRASS_BLOCK` → `COARSE_DIRT`    |
//! | 3    | category                               | `POPPY` @ 0.3 → `DEAD_BUSH`      |
//! | 4    | shape pattern                          | `OAK_SLAB` → `COBBLED_DEEPSLATE_SLAB` |
//! | 5    | fallback                               | anything else → `AIR`            |
//!
//! Shape-preserving and light-weight materials are exempt from the override,
//! so a slab stays a slab at any power.

use crate::hash::position_rng;
use crate::material::Material;
use crate::types::BlockPos;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Static categories
// ---------------------------------------------------------------------------

const BLACKLIST: &[&str] = &[
    "BEDROCK",
    "BARRIER",
    "COMMAND_BLOCK",
    "CHAIN_COMMAND_BLOCK",
    "REPEATING_COMMAND_BLOCK",
    "COMMAND_BLOCK_MINECART",
    "STRUCTURE_BLOCK",
    "JIGSAW",
    "END_PORTAL_FRAME",
    "END_PORTAL",
    "END_GATEWAY",
];

const LIQUIDS: &[&str] = &["WATER", "LAVA", "BUBBLE_COLUMN"];

const LIGHT_WEIGHT: &[&str] = &[
    "ICE",
    "PACKED_ICE",
    "BLUE_ICE",
    "FROSTED_ICE",
    "SNOW",
    "SNOW_BLOCK",
    "POWDER_SNOW",
];

const PLANTS: &[&str] = &[
    "SHORT_GRASS",
    "GRASS",
    "TALL_GRASS",
    "FERN",
    "LARGE_FERN",
    "POPPY",
    "DANDELION",
    "BLUE_ORCHID",
    "ALLIUM",
    "AZURE_BLUET",
    "OXEYE_DAISY",
    "CORNFLOWER",
    "LILY_OF_THE_VALLEY",
    "PINK_PETALS",
    "LILAC",
    "PEONY",
    "SUNFLOWER",
    "ROSE_BUSH",
    "RED_TULIP",
    "ORANGE_TULIP",
    "WHITE_TULIP",
    "PINK_TULIP",
];

const ATTACHED: &[&str] = &[
    "VINE",
    "WEEPING_VINES",
    "TWISTING_VINES",
    "TORCH",
    "WALL_TORCH",
    "SOUL_TORCH",
    "SOUL_WALL_TORCH",
    "REDSTONE_TORCH",
    "REDSTONE_WALL_TORCH",
    "LANTERN",
    "LADDER",
    "LEVER",
    "REDSTONE_WIRE",
    "REPEATER",
    "COMPARATOR",
    "TRIPWIRE_HOOK",
    "TRIPWIRE",
    "RAIL",
    "POWERED_RAIL",
    "DETECTOR_RAIL",
    "ACTIVATOR_RAIL",
];

const DEAD_PLANTS: &[Material] = &[Material::DEAD_BUSH, Material::WITHER_ROSE];

const BURNT: &[Material] = &[
    Material::COBBLED_DEEPSLATE,
    Material::BLACK_CONCRETE_POWDER,
    Material::OBSIDIAN,
];

fn listed(list: &[&str], m: Material) -> bool {
    let name = m.name();
    list.iter().any(|n| *n == name)
}

/// Never touched by any destructive pass.
pub fn is_blacklisted(m: Material) -> bool {
    listed(BLACKLIST, m)
}

pub fn is_liquid(m: Material) -> bool {
    listed(LIQUIDS, m)
}

pub fn is_light_weight(m: Material) -> bool {
    listed(LIGHT_WEIGHT, m)
}

pub fn is_plant(m: Material) -> bool {
    listed(PLANTS, m) || m.name_contains("SAPLING")
}

/// Decorations that hang off a neighbouring block (torches, signs, rails…).
pub fn is_attached(m: Material) -> bool {
    listed(ATTACHED, m) || m.name_contains("BUTTON") || m.name_contains("SIGN")
}

pub fn is_glass(m: Material) -> bool {
    m.name_contains("GLASS")
}

/// Slabs, walls and stairs: results of these keep their orientation.
pub fn is_shaped(m: Material) -> bool {
    m.name_ends_with("_SLAB") || m.name_ends_with("_WALL") || m.name_ends_with("_STAIRS")
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Outcome {
    Fixed(Material),
    OneOf(Vec<Material>),
}

#[derive(Debug, Clone)]
pub struct TransformationRule {
    /// Power above which non-exempt blocks turn into burnt material.
    pub high_power_threshold: f64,
    /// Power above which plants vanish instead of dying.
    pub plant_vaporize_threshold: f64,
    exact: HashMap<Material, Outcome>,
}

impl Default for TransformationRule {
    fn default() -> Self {
        use Material as M;
        let mut exact = HashMap::new();
        exact.insert(M::GRASS_BLOCK, Outcome::OneOf(vec![M::DIRT, M::COARSE_DIRT]));
        exact.insert(M::DIRT, Outcome::OneOf(vec![M::COARSE_DIRT, M::COBBLED_DEEPSLATE]));
        exact.insert(M::PODZOL, Outcome::Fixed(M::COARSE_DIRT));
        exact.insert(M::MYCELIUM, Outcome::Fixed(M::COARSE_DIRT));
        exact.insert(M::ROOTED_DIRT, Outcome::Fixed(M::COARSE_DIRT));
        exact.insert(M::MUD, Outcome::Fixed(M::COARSE_DIRT));
        exact.insert(M::CLAY, Outcome::Fixed(M::TUFF));
        exact.insert(M::STONE, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::COBBLESTONE, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::DEEPSLATE, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::GRANITE, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::DIORITE, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::ANDESITE, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::STONE_BRICKS, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::BRICKS, Outcome::Fixed(M::COBBLED_DEEPSLATE));
        exact.insert(M::SAND, Outcome::Fixed(M::SANDSTONE));
        exact.insert(M::RED_SAND, Outcome::Fixed(M::SANDSTONE));
        exact.insert(M::GRAVEL, Outcome::Fixed(M::TUFF));
        exact.insert(M::OAK_PLANKS, Outcome::Fixed(M::BLACKSTONE));
        exact.insert(M::NETHERRACK, Outcome::Fixed(M::MAGMA_BLOCK));
        Self {
            high_power_threshold: 0.8,
            plant_vaporize_threshold: 0.5,
            exact,
        }
    }
}

impl TransformationRule {
    /// Add or replace an exact-table entry.
    pub fn with_exact(mut self, from: Material, to: &[Material]) -> Self {
        let outcome = match to {
            [single] => Outcome::Fixed(*single),
            many => Outcome::OneOf(many.to_vec()),
        };
        self.exact.insert(from, outcome);
        self
    }

    /// Transform with randomness derived from the block position.
    pub fn transform_at(&self, material: Material, power: f64, pos: BlockPos) -> Material {
        let mut rng = position_rng(pos);
        self.transform(material, power, &mut rng)
    }

    pub fn transform<R: Rng + ?Sized>(&self, material: Material, power: f64, rng: &mut R) -> Material {
        if material.is_air() || is_blacklisted(material) {
            return material;
        }

        let exempt = is_light_weight(material) || is_shaped(material);
        if power > self.high_power_threshold && !exempt {
            return pick(BURNT, rng).unwrap_or(Material::COBBLED_DEEPSLATE);
        }

        if let Some(outcome) = self.exact.get(&material) {
            return match outcome {
                Outcome::Fixed(m) => *m,
                Outcome::OneOf(options) => pick(options, rng).unwrap_or(Material::AIR),
            };
        }

        if is_light_weight(material) {
            return Material::AIR;
        }
        if is_plant(material) {
            return if power > self.plant_vaporize_threshold {
                Material::AIR
            } else {
                pick(DEAD_PLANTS, rng).unwrap_or(Material::DEAD_BUSH)
            };
        }
        if is_glass(material) {
            return Material::AIR;
        }

        if material.name_ends_with("_SLAB") {
            return Material::COBBLED_DEEPSLATE_SLAB;
        }
        if material.name_ends_with("_WALL") {
            return Material::COBBLED_DEEPSLATE_WALL;
        }
        if material.name_ends_with("_STAIRS") {
            return Material::COBBLED_DEEPSLATE_STAIRS;
        }

        Material::AIR
    }
}

fn pick<R: Rng + ?Sized>(options: &[Material], rng: &mut R) -> Option<Material> {
    options.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn slab_keeps_shape_at_any_power() {
        let rule = TransformationRule::default();
        let slab = Material::named("OAK_SLAB");
        for step in 0..=10 {
            let power = step as f64 / 10.0;
            assert_eq!(
                rule.transform(slab, power, &mut rng()),
                Material::COBBLED_DEEPSLATE_SLAB,
                "power {}",
                power
            );
        }
    }

    #[test]
    fn walls_and_stairs_follow_pattern_rule() {
        let rule = TransformationRule::default();
        assert_eq!(
            rule.transform(Material::named("MOSSY_STONE_BRICK_WALL"), 0.95, &mut rng()),
            Material::COBBLED_DEEPSLATE_WALL
        );
        assert_eq!(
            rule.transform(Material::OAK_STAIRS, 0.1, &mut rng()),
            Material::COBBLED_DEEPSLATE_STAIRS
        );
    }

    #[test]
    fn blacklisted_materials_pass_through() {
        let rule = TransformationRule::default();
        assert_eq!(rule.transform(Material::BEDROCK, 1.0, &mut rng()), Material::BEDROCK);
        assert_eq!(rule.transform(Material::AIR, 1.0, &mut rng()), Material::AIR);
    }

    #[test]
    fn high_power_burns_non_exempt_blocks() {
        let rule = TransformationRule::default();
        let out = rule.transform(Material::GRASS_BLOCK, 0.95, &mut rng());
        assert!(BURNT.contains(&out), "got {}", out);
    }

    #[test]
    fn light_weight_blocks_vanish_even_at_high_power() {
        let rule = TransformationRule::default();
        assert_eq!(rule.transform(Material::PACKED_ICE, 0.95, &mut rng()), Material::AIR);
        assert_eq!(rule.transform(Material::SNOW_BLOCK, 0.2, &mut rng()), Material::AIR);
    }

    #[test]
    fn exact_table_wins_over_fallback() {
        let rule = TransformationRule::default();
        assert_eq!(rule.transform(Material::STONE, 0.5, &mut rng()), Material::COBBLED_DEEPSLATE);
        let grass = rule.transform(Material::GRASS_BLOCK, 0.5, &mut rng());
        assert!(grass == Material::DIRT || grass == Material::COARSE_DIRT);
    }

    #[test]
    fn plants_die_or_vaporize_by_power() {
        let rule = TransformationRule::default();
        let low = rule.transform(Material::POPPY, 0.3, &mut rng());
        assert!(DEAD_PLANTS.contains(&low), "got {}", low);
        assert_eq!(rule.transform(Material::POPPY, 0.6, &mut rng()), Material::AIR);
        assert_eq!(rule.transform(Material::named("OAK_SAPLING"), 0.7, &mut rng()), Material::AIR);
    }

    #[test]
    fn unknown_materials_fall_back_to_air() {
        let rule = TransformationRule::default();
        assert_eq!(rule.transform(Material::named("CRAFTING_TABLE"), 0.3, &mut rng()), Material::AIR);
        assert_eq!(rule.transform(Material::GLASS_PANE, 0.3, &mut rng()), Material::AIR);
    }

    #[test]
    fn positional_transform_is_repeatable() {
        let rule = TransformationRule::default();
        let pos = BlockPos::new(4, 64, 9);
        let a = rule.transform_at(Material::GRASS_BLOCK, 0.5, pos);
        let b = rule.transform_at(Material::GRASS_BLOCK, 0.5, pos);
        assert_eq!(a, b);
    }

    #[test]
    fn categories_cover_decorations_and_liquids() {
        assert!(is_attached(Material::named("OAK_WALL_SIGN")));
        assert!(is_attached(Material::named("STONE_BUTTON")));
        assert!(is_attached(Material::TORCH));
        assert!(is_liquid(Material::WATER));
        assert!(!is_liquid(Material::STONE));
        assert!(is_blacklisted(Material::END_PORTAL_FRAME));
    }
}
