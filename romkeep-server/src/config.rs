//! Static platform configuration table.
//!
//! One row per supported system directory: display metadata, the
//! libretro core used by front-ends, the firmware archive merged into
//! composed packages, and the lookup-service system id. Compiled-in
//! defaults cover the common systems; `[platforms.<system>]` entries in
//! the TOML config override or extend them. Loaded once at startup and
//! shared read-only.

use romkeep_common::config::TomlConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Cores whose content is delivered as merge-composed archives
/// (arcade ROM sets with parent/clone and firmware dependencies).
pub const ARCADE_CORES: &[&str] = &[
    "mame2003_plus",
    "mame2010",
    "fbneo",
    "fbalpha2012",
    "fbalpha2012_neogeo",
];

/// Lookup-service system ids classified as arcade platforms
pub const ARCADE_LOOKUP_IDS: &[u32] = &[75, 142, 227];

/// Per-system platform metadata
#[derive(Debug, Clone, Serialize)]
pub struct Platform {
    pub system: String,
    pub display_name: String,
    pub maker: String,
    pub year: String,
    pub core: String,
    pub firmware: Option<String>,
    pub lookup_id: Option<u32>,
}

/// Read-only platform table keyed by system directory name
#[derive(Debug)]
pub struct PlatformTable {
    platforms: HashMap<String, Platform>,
}

impl PlatformTable {
    /// Build the table from compiled defaults plus TOML overrides
    pub fn load(config: &TomlConfig) -> Arc<Self> {
        let mut platforms = builtin_platforms();

        for (system, over) in &config.platforms {
            let entry = platforms
                .entry(system.clone())
                .or_insert_with(|| Platform {
                    system: system.clone(),
                    display_name: system.clone(),
                    maker: String::new(),
                    year: String::new(),
                    core: String::new(),
                    firmware: None,
                    lookup_id: None,
                });
            if let Some(v) = &over.display_name {
                entry.display_name = v.clone();
            }
            if let Some(v) = &over.maker {
                entry.maker = v.clone();
            }
            if let Some(v) = &over.year {
                entry.year = v.clone();
            }
            if let Some(v) = &over.core {
                entry.core = v.clone();
            }
            if let Some(v) = &over.firmware {
                entry.firmware = Some(v.clone());
            }
            if let Some(v) = over.lookup_id {
                entry.lookup_id = Some(v);
            }
        }

        Arc::new(Self { platforms })
    }

    pub fn get(&self, system: &str) -> Option<&Platform> {
        self.platforms.get(system)
    }

    pub fn lookup_id(&self, system: &str) -> Option<u32> {
        self.platforms.get(system).and_then(|p| p.lookup_id)
    }

    pub fn firmware(&self, system: &str) -> Option<&str> {
        self.platforms
            .get(system)
            .and_then(|p| p.firmware.as_deref())
    }

    /// Arcade classification for the metadata resolver: lookup-id
    /// allow-list or system-name heuristic. Free-text search on arcade
    /// set names is too noisy to be useful.
    pub fn is_arcade(&self, system: &str) -> bool {
        if let Some(id) = self.lookup_id(system) {
            if ARCADE_LOOKUP_IDS.contains(&id) {
                return true;
            }
        }
        let name = system.to_ascii_lowercase();
        name.contains("mame")
            || name.contains("arcade")
            || name.contains("fbneo")
            || name.contains("neogeo")
    }

    /// Whether downloads for this system go through the archive
    /// composer. Gated strictly on the configured core, not the name
    /// heuristic: only cores in the allow-list expect merged sets.
    pub fn uses_merged_archives(&self, system: &str) -> bool {
        self.platforms
            .get(system)
            .map(|p| ARCADE_CORES.contains(&p.core.as_str()))
            .unwrap_or(false)
    }

    pub fn systems(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.values()
    }
}

fn platform(
    system: &str,
    display_name: &str,
    maker: &str,
    year: &str,
    core: &str,
    firmware: Option<&str>,
    lookup_id: u32,
) -> (String, Platform) {
    (
        system.to_string(),
        Platform {
            system: system.to_string(),
            display_name: display_name.to_string(),
            maker: maker.to_string(),
            year: year.to_string(),
            core: core.to_string(),
            firmware: firmware.map(str::to_string),
            lookup_id: Some(lookup_id),
        },
    )
}

fn builtin_platforms() -> HashMap<String, Platform> {
    [
        platform("nes", "Nintendo Entertainment System", "Nintendo", "1983", "fceumm", None, 3),
        platform("snes", "Super Nintendo", "Nintendo", "1990", "snes9x", None, 4),
        platform("n64", "Nintendo 64", "Nintendo", "1996", "mupen64plus_next", None, 14),
        platform("gb", "Game Boy", "Nintendo", "1989", "gambatte", None, 9),
        platform("gbc", "Game Boy Color", "Nintendo", "1998", "gambatte", None, 10),
        platform("gba", "Game Boy Advance", "Nintendo", "2001", "mgba", None, 12),
        platform("mastersystem", "Master System", "Sega", "1985", "genesis_plus_gx", None, 2),
        platform("megadrive", "Mega Drive", "Sega", "1988", "genesis_plus_gx", None, 1),
        platform("pcengine", "PC Engine", "NEC", "1987", "mednafen_pce", None, 31),
        platform("psx", "PlayStation", "Sony", "1994", "pcsx_rearmed", None, 57),
        platform("atari2600", "Atari 2600", "Atari", "1977", "stella", None, 26),
        platform("mame", "Arcade (MAME)", "Various", "1980", "mame2003_plus", None, 75),
        platform("neogeo", "Neo Geo", "SNK", "1990", "fbalpha2012_neogeo", Some("neogeo.zip"), 142),
    ]
    .into_iter()
    .collect()
}
