// default_generator.rs -- Process-wide default content-idea generator (Layer 4).
//
// Uses arc-swap for lock-free reads with atomic updates.

use std::sync::{Arc, LazyLock, Mutex};

use arc_swap::ArcSwap;

use festive_spark_types::Error;

use crate::api::{ContentIdea, ContentIdeaGenerator};

static DEFAULT_GENERATOR: LazyLock<ArcSwap<Option<Arc<ContentIdeaGenerator>>>> =
    LazyLock::new(|| ArcSwap::from_pointee(None));

/// Serializes the lazy-init path so the environment is read at most once.
static INIT_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Replace the default generator.
pub fn set_default_generator(generator: ContentIdeaGenerator) {
    DEFAULT_GENERATOR.store(Arc::new(Some(Arc::new(generator))));
}

/// The default generator, built from environment variables on first use.
///
/// Returns `Err(Configuration)` if none has been set and no backend is
/// configured in the environment.
pub fn get_default_generator() -> Result<Arc<ContentIdeaGenerator>, Error> {
    let guard = DEFAULT_GENERATOR.load();
    if let Some(ref generator) = **guard {
        return Ok(Arc::clone(generator));
    }

    let _lock = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let guard = DEFAULT_GENERATOR.load();
    if let Some(ref generator) = **guard {
        return Ok(Arc::clone(generator));
    }

    let generator = Arc::new(ContentIdeaGenerator::from_env()?);
    DEFAULT_GENERATOR.store(Arc::new(Some(Arc::clone(&generator))));
    Ok(generator)
}

#[cfg(any(test, feature = "testing"))]
pub fn reset_default_generator() {
    DEFAULT_GENERATOR.store(Arc::new(None));
}

/// Generate one content idea with the default generator.
///
/// Inputs are validated before any backend call: `festival` 3-50, `brand`
/// 2-50 and `insight` 10-200 characters after trimming.
pub async fn generate_content_idea(
    festival: &str,
    brand: &str,
    insight: &str,
) -> Result<ContentIdea, Error> {
    get_default_generator()?
        .generate_content_idea(festival, brand, insight)
        .await
}
