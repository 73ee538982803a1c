//! Block materials, biomes and orientation state.
//!
//! A [`Material`] is a `Copy` handle into a process-wide name table.  The
//! well-known vanilla names used by the engine have fixed handles (the
//! associated constants below); any other name is interned on first use, so
//! hosts can hand the engine modded or future block kinds without a code
//! change.

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Material(u32);

macro_rules! well_known_materials {
    ($($name:ident),* $(,)?) => {
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[repr(u32)]
        enum WellKnown {
            $($name),*
        }

        impl Material {
            $(pub const $name: Material = Material(WellKnown::$name as u32);)*
        }

        const WELL_KNOWN_NAMES: &[&str] = &[$(stringify!($name)),*];
    };
}

well_known_materials! {
    AIR,
    CAVE_AIR,
    VOID_AIR,
    // terrain
    STONE,
    COBBLESTONE,
    DEEPSLATE,
    COBBLED_DEEPSLATE,
    COBBLED_DEEPSLATE_SLAB,
    COBBLED_DEEPSLATE_WALL,
    COBBLED_DEEPSLATE_STAIRS,
    GRANITE,
    DIORITE,
    ANDESITE,
    DIRT,
    COARSE_DIRT,
    ROOTED_DIRT,
    GRASS_BLOCK,
    PODZOL,
    MYCELIUM,
    MUD,
    CLAY,
    SAND,
    RED_SAND,
    SANDSTONE,
    GRAVEL,
    TUFF,
    NETHERRACK,
    // scorch
    BASALT,
    POLISHED_BASALT,
    SMOOTH_BASALT,
    BLACKSTONE,
    MAGMA_BLOCK,
    OBSIDIAN,
    BLACK_CONCRETE_POWDER,
    GRAY_CONCRETE_POWDER,
    // indestructible
    BEDROCK,
    BARRIER,
    COMMAND_BLOCK,
    CHAIN_COMMAND_BLOCK,
    REPEATING_COMMAND_BLOCK,
    STRUCTURE_BLOCK,
    END_PORTAL_FRAME,
    END_PORTAL,
    END_GATEWAY,
    // liquids
    WATER,
    LAVA,
    // light-weight
    ICE,
    PACKED_ICE,
    BLUE_ICE,
    FROSTED_ICE,
    SNOW,
    SNOW_BLOCK,
    POWDER_SNOW,
    // plants
    SHORT_GRASS,
    TALL_GRASS,
    FERN,
    LARGE_FERN,
    DEAD_BUSH,
    WITHER_ROSE,
    POPPY,
    DANDELION,
    // building
    GLASS,
    GLASS_PANE,
    OAK_LOG,
    OAK_WOOD,
    OAK_LEAVES,
    OAK_PLANKS,
    OAK_SLAB,
    OAK_STAIRS,
    STONE_BRICKS,
    STONE_BRICK_WALL,
    BRICKS,
    // attached decorations
    TORCH,
    WALL_TORCH,
    LANTERN,
    LADDER,
    VINE,
}

struct Interner {
    names: Vec<&'static str>,
    ids: HashMap<&'static str, u32>,
}

impl Interner {
    fn seeded() -> Self {
        let names: Vec<&'static str> = WELL_KNOWN_NAMES.to_vec();
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, i as u32))
            .collect();
        Self { names, ids }
    }
}

fn interner() -> &'static RwLock<Interner> {
    static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| RwLock::new(Interner::seeded()))
}

/// Canonical form: upper case, namespace stripped (`minecraft:oak_log` →
/// `OAK_LOG`).
fn canonical(name: &str) -> String {
    let trimmed = name.trim();
    let bare = trimmed.rsplit_once(':').map_or(trimmed, |(_, n)| n);
    bare.to_ascii_uppercase()
}

impl Material {
    /// Look up (or intern) a material by name.
    pub fn named(name: &str) -> Material {
        let key = canonical(name);
        if let Some(&id) = interner().read().ids.get(key.as_str()) {
            return Material(id);
        }
        let mut table = interner().write();
        if let Some(&id) = table.ids.get(key.as_str()) {
            return Material(id);
        }
        let id = table.names.len() as u32;
        let leaked: &'static str = Box::leak(key.into_boxed_str());
        table.names.push(leaked);
        table.ids.insert(leaked, id);
        Material(id)
    }

    pub fn name(self) -> &'static str {
        interner()
            .read()
            .names
            .get(self.0 as usize)
            .copied()
            .unwrap_or("AIR")
    }

    pub fn id(self) -> u32 {
        self.0
    }

    pub fn is_air(self) -> bool {
        self == Material::AIR || self == Material::CAVE_AIR || self == Material::VOID_AIR
    }

    pub fn name_ends_with(self, suffix: &str) -> bool {
        self.name().ends_with(suffix)
    }

    pub fn name_contains(self, fragment: &str) -> bool {
        self.name().contains(fragment)
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::AIR
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::fmt::Display for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Material {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Material {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Material::named(&name))
    }
}

// ---------------------------------------------------------------------------
// Biome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Biome(pub String);

impl Biome {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for Biome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RailShape {
    NorthSouth,
    EastWest,
    AscendingEast,
    AscendingWest,
    AscendingNorth,
    AscendingSouth,
    SouthEast,
    SouthWest,
    NorthWest,
    NorthEast,
}

/// The orientation-like sub-properties of a block state.
///
/// `None` means the block kind does not have that property at all; hosts
/// report `Some` for every property the kind supports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orientation {
    pub facing: Option<Facing>,
    pub half: Option<Half>,
    pub axis: Option<Axis>,
    pub rotation: Option<u8>,
    pub waterlogged: Option<bool>,
    pub snowy: Option<bool>,
    pub open: Option<bool>,
    pub powered: Option<bool>,
    pub rail_shape: Option<RailShape>,
    pub age: Option<u8>,
    /// Highest age the kind accepts; only meaningful when `age` is present.
    pub max_age: Option<u8>,
}

macro_rules! carry {
    ($dst:ident, $src:ident, $copied:ident, $($field:ident),*) => {
        $(
            if $dst.$field.is_some() {
                if let Some(value) = $src.$field {
                    $dst.$field = Some(value);
                    $copied += 1;
                }
            }
        )*
    };
}

impl Orientation {
    /// Copy every property present on both `previous` and `self` into
    /// `self`.  Properties the new kind lacks are dropped; age is clamped to
    /// the new kind's maximum.  Returns how many properties were carried.
    pub fn merge_from(&mut self, previous: &Orientation) -> usize {
        let mut copied = 0;
        carry!(
            self,
            previous,
            copied,
            facing,
            half,
            axis,
            rotation,
            waterlogged,
            snowy,
            open,
            powered,
            rail_shape
        );
        if self.age.is_some() {
            if let Some(age) = previous.age {
                let cap = self.max_age.unwrap_or(age);
                self.age = Some(age.min(cap));
                copied += 1;
            }
        }
        copied
    }

    pub fn is_empty(&self) -> bool {
        *self == Orientation::default()
    }
}

/// Live state of a single block as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockState {
    pub material: Material,
    #[serde(default)]
    pub orientation: Orientation,
}

impl BlockState {
    pub fn new(material: Material) -> Self {
        Self {
            material,
            orientation: Orientation::default(),
        }
    }

    pub fn with_orientation(material: Material, orientation: Orientation) -> Self {
        Self {
            material,
            orientation,
        }
    }
}
