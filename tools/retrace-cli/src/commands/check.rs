//! Report disk space for the storage root.

use std::path::PathBuf;
use std::sync::Arc;

use retrace_common::AppConfig;
use retrace_store::{PlatformSpaceGuard, SpaceGuard, DISK_RESERVE_BYTES};

pub async fn run(root: PathBuf, config: &AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&root)?;

    let reserve = config.disk_reserve_bytes.unwrap_or(DISK_RESERVE_BYTES);
    let guard = Arc::new(PlatformSpaceGuard::with_reserve(reserve));
    let info = guard.space_info(&root)?;

    println!("Storage root:    {}", root.display());
    println!("Total space:     {}", format_bytes(info.total_bytes));
    println!("Available:       {}", format_bytes(info.available_bytes));
    println!("Safety reserve:  {}", format_bytes(reserve));

    match guard.check(&root, 0) {
        Ok(()) => {
            let headroom = info.available_bytes.saturating_sub(reserve);
            println!("Writable:        yes ({} headroom)", format_bytes(headroom));
        }
        Err(e) => {
            println!("Writable:        NO");
            println!("  {e}");
        }
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
