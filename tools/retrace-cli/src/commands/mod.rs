pub mod check;
pub mod delete;
pub mod info;
pub mod list;
pub mod rebuild;
pub mod search;

use std::path::PathBuf;
use std::sync::Arc;

use retrace_store::{ChunkStore, PlatformSpaceGuard};

/// Open the store at `root` with the platform disk guard.
pub fn open_store(root: PathBuf) -> anyhow::Result<Arc<ChunkStore>> {
    Ok(Arc::new(ChunkStore::open(
        root,
        Arc::new(PlatformSpaceGuard::new()),
    )?))
}
