//! Small shared helpers

use std::time::Instant;

use tracing::info;

/// Run `f`, logging how long it took under `label`
pub fn timed<T>(label: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    info!("Time for {}: {:?}", label, start.elapsed());
    result
}
