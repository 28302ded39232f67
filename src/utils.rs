use tracing::{info, warn};

/// Pin the calling thread to the core with id `core`.
///
/// Returns false when the core does not exist or the OS refused.
pub fn pin_current_thread(core: usize) -> bool {
    let Some(cores) = core_affinity::get_core_ids() else {
        warn!("Unable to enumerate CPU cores; thread left unpinned");
        return false;
    };

    match cores.into_iter().find(|c| c.id == core) {
        Some(core_id) => {
            let pinned = core_affinity::set_for_current(core_id);
            if pinned {
                info!("Pinned thread to core {}", core);
            } else {
                warn!("Failed to pin thread to core {}", core);
            }
            pinned
        }
        None => {
            warn!("Core {} not available; thread left unpinned", core);
            false
        }
    }
}
