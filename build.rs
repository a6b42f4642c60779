use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct ConfigSection {
    num_super_blocks: Option<usize>,
    mem_blocks_per_super_block: Option<usize>,
    max_alloc_windows: Option<usize>,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
}

struct ResolvedConfig {
    num_super_blocks: usize,
    mem_blocks_per_super_block: usize,
    max_alloc_windows: usize,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let num_super_blocks = cfg.num_super_blocks.unwrap_or(32);
    let mem_blocks_per_super_block = cfg.mem_blocks_per_super_block.unwrap_or(64);
    let max_alloc_windows = cfg.max_alloc_windows.unwrap_or(0);

    assert!(num_super_blocks > 0, "num_super_blocks must be > 0");
    assert!(
        mem_blocks_per_super_block > 0,
        "mem_blocks_per_super_block must be > 0"
    );
    assert!(
        mem_blocks_per_super_block.is_multiple_of(32),
        "mem_blocks_per_super_block ({}) must be a multiple of 32 so a warp \
         can scan one bitmap per lane",
        mem_blocks_per_super_block
    );

    // 32 slabs per memory block; slab indices must stay clear of the
    // reserved 0xFFFF_FFFE / 0xFFFF_FFFF sentinel values.
    let total_slabs = num_super_blocks
        .checked_mul(mem_blocks_per_super_block)
        .and_then(|n| n.checked_mul(32))
        .expect("slab pool size overflows usize");
    assert!(
        total_slabs < 0xFFFF_FFFE,
        "slab pool ({} slabs) collides with reserved slab indices",
        total_slabs
    );

    ResolvedConfig {
        num_super_blocks,
        mem_blocks_per_super_block,
        max_alloc_windows,
    }
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{}/slabhash.toml", manifest_dir)
}

fn generate_config(cfg: &ResolvedConfig, out_path: &Path) {
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         pub const NUM_SUPER_BLOCKS: usize = {};\n\
         pub const MEM_BLOCKS_PER_SUPER_BLOCK: usize = {};\n\
         pub const MAX_ALLOC_WINDOWS: usize = {};\n",
        cfg.num_super_blocks, cfg.mem_blocks_per_super_block, cfg.max_alloc_windows,
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn main() {
    println!("cargo:rerun-if-env-changed=SLABHASH_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = env::var("SLABHASH_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={}", config_path);
    let content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", config_path, e));

    let config: Config = toml::from_str(&content).expect("failed to parse TOML config");

    let resolved = resolve_config(&config.config);
    generate_config(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
